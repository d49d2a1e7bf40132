use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::script::{self, compile_resolver};
use super::PageDriver;
use crate::errors::AutomationError;
use crate::selector::Selector;

// Reduce type complexity for Clippy
type CdpResult = Result<Value, String>;
type PendingMap = HashMap<u64, oneshot::Sender<CdpResult>>;
type Pending = Arc<Mutex<PendingMap>>;

const EVENT_BUFFER: usize = 256;
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);
const NETWORK_SETTLE: Duration = Duration::from_millis(500);

/// HTTP side of the DevTools endpoint, used for tab management
#[derive(Debug, Clone)]
pub struct CdpClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TabInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub websocket_url: Option<String>,
}

impl CdpClient {
    pub fn new(debug_port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{debug_port}"),
            client: reqwest::Client::new(),
        }
    }

    /// Open a new tab on `url`.
    pub async fn new_tab(&self, url: &str) -> Result<TabInfo, AutomationError> {
        let response = self
            .client
            .put(format!("{}/json/new?{url}", self.base_url))
            .send()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to open tab: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to parse new tab: {e}")))
    }

    pub async fn close_tab(&self, id: &str) -> Result<(), AutomationError> {
        self.client
            .get(format!("{}/json/close/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to close tab: {e}")))?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CdpRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CdpIncoming {
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<CdpErrorBody>,
    },
    Event(CdpEvent),
}

/// An unsolicited DevTools notification such as `Page.fileChooserOpened`.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// One DevTools WebSocket session
///
/// Commands are matched to their responses by id; events fan out on a
/// broadcast channel.
pub struct CdpConnection {
    sender: mpsc::UnboundedSender<Message>,
    pending: Pending,
    events: broadcast::Sender<CdpEvent>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self, AutomationError> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| AutomationError::PlatformError(format!("DevTools connect: {e}")))?;
        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        // writer task
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("DevTools send error: {}", e);
                    break;
                }
            }
        });

        // reader task
        let reader_pending = pending.clone();
        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                if !msg.is_text() {
                    continue;
                }
                let txt = msg.into_text().unwrap_or_default();
                match serde_json::from_str::<CdpIncoming>(&txt) {
                    Ok(CdpIncoming::Response { id, result, error }) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&id) {
                            let _ = tx.send(match error {
                                Some(err) => Err(format!("{} ({})", err.message, err.code)),
                                None => Ok(result.unwrap_or(Value::Null)),
                            });
                        }
                    }
                    Ok(CdpIncoming::Event(event)) => {
                        // no subscribers is the common case
                        let _ = reader_events.send(event);
                    }
                    Err(e) => warn!("Invalid DevTools message: {}", e),
                }
            }
            // Dropping the senders wakes every waiter with a closed-session error.
            reader_pending.lock().await.clear();
            debug!("DevTools connection closed");
        });

        Ok(Self {
            sender: tx,
            pending,
            events,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub async fn send(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AutomationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<CdpResult>();
        self.pending.lock().await.insert(id, tx);

        let payload = serde_json::to_string(&CdpRequest { id, method, params })
            .map_err(|e| AutomationError::Internal(format!("DevTools serialize: {e}")))?;
        if self.sender.send(Message::Text(payload)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AutomationError::SessionClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(AutomationError::Protocol(format!("{method}: {err}"))),
            Ok(Err(_canceled)) => Err(AutomationError::SessionClosed),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                Err(AutomationError::Timeout(format!(
                    "no response to {method} within {timeout:?}"
                )))
            }
        }
    }
}

/// [`PageDriver`] over a DevTools page session
pub struct CdpPage {
    conn: CdpConnection,
    command_timeout: Duration,
    slow_motion: Duration,
}

impl CdpPage {
    /// Enable the domains the driver depends on.
    pub async fn attach(
        conn: CdpConnection,
        command_timeout: Duration,
        slow_motion: Duration,
    ) -> Result<Self, AutomationError> {
        let page = Self {
            conn,
            command_timeout,
            slow_motion,
        };
        page.command("Page.enable", json!({})).await?;
        page.command("DOM.enable", json!({})).await?;
        page.command("Runtime.enable", json!({})).await?;
        Ok(page)
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value, AutomationError> {
        self.conn.send(method, params, self.command_timeout).await
    }

    async fn evaluate(&self, expression: String) -> Result<Value, AutomationError> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script threw");
            return Err(AutomationError::Protocol(format!("evaluate: {text}")));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn run_on(&self, selector: &Selector, body: &str) -> Result<Value, AutomationError> {
        self.evaluate(compile_resolver(selector, body)?).await
    }

    async fn slow_down(&self) {
        if !self.slow_motion.is_zero() {
            tokio::time::sleep(self.slow_motion).await;
        }
    }

    async fn mouse(&self, kind: &str, x: f64, y: f64) -> Result<(), AutomationError> {
        self.command(
            "Input.dispatchMouseEvent",
            json!({ "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1 }),
        )
        .await
        .map(|_| ())
    }
}

/// Receive events until one named `method` arrives.
async fn next_event(
    events: &mut broadcast::Receiver<CdpEvent>,
    method: &str,
    timeout: Duration,
) -> Result<CdpEvent, AutomationError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) if event.method == method => return Ok(event),
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return Err(AutomationError::SessionClosed),
            Err(_) => {
                return Err(AutomationError::Timeout(format!(
                    "no {method} within {timeout:?}"
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError> {
        info!("Navigating to {}", url);
        // Subscribed before navigating so the load event cannot be missed
        let mut events = self.conn.subscribe();
        let result = self.command("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(AutomationError::PlatformError(format!(
                "navigation to {url} failed: {error}"
            )));
        }
        // No loaderId means a same-document navigation: the old readyState is
        // still the right one to watch
        if result.get("loaderId").is_none() {
            return self.wait_for_load(timeout).await;
        }
        next_event(&mut events, "Page.loadEventFired", timeout)
            .await
            .map_err(|e| match e {
                AutomationError::Timeout(_) => AutomationError::Timeout(format!(
                    "{url} did not finish loading within {timeout:?}"
                )),
                other => other,
            })?;
        tokio::time::sleep(NETWORK_SETTLE).await;
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), AutomationError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.evaluate("document.readyState".to_string()).await {
                Ok(Value::String(state)) if state == "complete" => break,
                Ok(_) => {}
                // Context is torn down mid-navigation; keep polling.
                Err(AutomationError::Protocol(e)) => debug!("readyState probe: {e}"),
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "page did not finish loading within {timeout:?}"
                )));
            }
            tokio::time::sleep(LOAD_POLL_INTERVAL).await;
        }
        tokio::time::sleep(NETWORK_SETTLE).await;
        Ok(())
    }

    async fn count(&self, selector: &Selector) -> Result<usize, AutomationError> {
        let value = self.run_on(selector, script::COUNT).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError> {
        let value = self.run_on(selector, script::IS_VISIBLE).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, selector: &Selector) -> Result<bool, AutomationError> {
        let value = self.run_on(selector, script::IS_ENABLED).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text_content(&self, selector: &Selector) -> Result<Option<String>, AutomationError> {
        let value = self.run_on(selector, script::TEXT_CONTENT).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.slow_down().await;
        let point = self.run_on(selector, script::CLICK_POINT).await?;
        let (Some(x), Some(y)) = (
            point.get("x").and_then(Value::as_f64),
            point.get("y").and_then(Value::as_f64),
        ) else {
            return Err(AutomationError::ElementNotFound(selector.to_string()));
        };
        debug!(%selector, x, y, "click");
        self.mouse("mouseMoved", x, y).await?;
        self.mouse("mousePressed", x, y).await?;
        self.mouse("mouseReleased", x, y).await
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        self.slow_down().await;
        let filled = self.run_on(selector, &script::fill_body(value)?).await?;
        if filled.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound(format!(
                "{selector} is not a fillable field"
            )))
        }
    }

    async fn scroll_into_view(&self, selector: &Selector) -> Result<(), AutomationError> {
        let scrolled = self.run_on(selector, script::SCROLL_INTO_VIEW).await?;
        if scrolled.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound(selector.to_string()))
        }
    }

    async fn attach_files(
        &self,
        trigger: &Selector,
        files: &[PathBuf],
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let files: Vec<String> = files
            .iter()
            .map(|f| {
                std::path::absolute(f)
                    .map(|p| p.to_string_lossy().into_owned())
                    .map_err(|e| AutomationError::InvalidArgument(format!("{}: {e}", f.display())))
            })
            .collect::<Result<_, _>>()?;

        let mut events = self.conn.subscribe();
        self.command("Page.setInterceptFileChooserDialog", json!({ "enabled": true }))
            .await?;

        let outcome: Result<(), AutomationError> = async {
            self.click(trigger).await?;
            let opened = next_event(&mut events, "Page.fileChooserOpened", timeout)
                .await
                .map_err(|e| match e {
                    AutomationError::Timeout(_) => AutomationError::Timeout(format!(
                        "no file chooser opened by {trigger} within {timeout:?}"
                    )),
                    other => other,
                })?;
            let backend_node_id = opened.params.get("backendNodeId").cloned().ok_or_else(|| {
                AutomationError::Protocol("file chooser without an input element".into())
            })?;
            self.command(
                "DOM.setFileInputFiles",
                json!({ "files": files, "backendNodeId": backend_node_id }),
            )
            .await
            .map(|_| ())
        }
        .await;

        if let Err(e) = self
            .command("Page.setInterceptFileChooserDialog", json!({ "enabled": false }))
            .await
        {
            warn!("Failed to release file chooser interception: {}", e);
        }
        outcome
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        let result = self
            .command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| AutomationError::Protocol("screenshot without data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| AutomationError::Protocol(format!("screenshot decode: {e}")))
    }

    async fn close(&self) -> Result<(), AutomationError> {
        self.command("Page.close", json!({})).await.map(|_| ())
    }
}
