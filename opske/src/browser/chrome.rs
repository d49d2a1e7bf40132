use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cdp::{CdpClient, CdpConnection, CdpPage};
use super::{Browser, BrowserLauncher};
use crate::config::BrowserConfig;
use crate::errors::AutomationError;
use crate::page::Page;

const PORT_FILE: &str = "DevToolsActivePort";
const PORT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const CHROME_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

const CHROME_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Locate a Chrome-family binary on PATH or in the usual install locations.
pub fn find_chrome() -> Option<PathBuf> {
    let exe_suffix = std::env::consts::EXE_SUFFIX;
    if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            for name in CHROME_NAMES {
                let candidate = dir.join(format!("{name}{exe_suffix}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    CHROME_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Starts a private Chrome instance per run with a throwaway profile
pub struct ChromeLauncher {
    config: BrowserConfig,
    default_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig, default_timeout: Duration) -> Self {
        Self {
            config,
            default_timeout,
        }
    }

    fn args(&self, profile: &Path) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", profile.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-popup-blocking".to_string(),
            format!(
                "--window-size={},{}",
                self.config.window_width, self.config.window_height
            ),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }

    async fn wait_for_port(&self, profile: &Path, child: &mut Child) -> Result<u16, AutomationError> {
        let port_file = profile.join(PORT_FILE);
        let timeout = self.config.launch_timeout.duration();
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(text) = tokio::fs::read_to_string(&port_file).await {
                if let Some(port) = text.lines().next().and_then(|l| l.trim().parse().ok()) {
                    return Ok(port);
                }
            }
            if let Ok(Some(status)) = child.try_wait() {
                return Err(AutomationError::PlatformError(format!(
                    "browser exited during startup with {status}"
                )));
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "browser did not open a DevTools port within {timeout:?}"
                )));
            }
            tokio::time::sleep(PORT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>, AutomationError> {
        let executable = self
            .config
            .executable
            .clone()
            .or_else(find_chrome)
            .ok_or_else(|| {
                AutomationError::PlatformError(
                    "no Chrome or Chromium found; set browser.executable or OPSKE_CHROME".into(),
                )
            })?;
        let profile = TempDir::new()
            .map_err(|e| AutomationError::PlatformError(format!("browser profile: {e}")))?;

        info!("Launching {}", executable.display());
        let mut child = Command::new(&executable)
            .args(self.args(profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AutomationError::PlatformError(format!("failed to start {}: {e}", executable.display()))
            })?;

        let port = self.wait_for_port(profile.path(), &mut child).await?;
        debug!(port, "DevTools endpoint is up");

        let client = CdpClient::new(port);
        let tab = client.new_tab("about:blank").await?;
        let ws_url = tab.websocket_url.clone().ok_or_else(|| {
            AutomationError::PlatformError("new tab has no DevTools WebSocket".into())
        })?;
        let conn = CdpConnection::connect(&ws_url).await?;
        let driver = CdpPage::attach(
            conn,
            self.config.command_timeout.duration(),
            self.config.slow_motion.duration(),
        )
        .await?;
        let page = Page::new(Arc::new(driver)).with_default_timeout(self.default_timeout);

        Ok(Box::new(ChromeBrowser {
            client,
            tab_id: tab.id,
            page,
            child: Mutex::new(Some(child)),
            profile: Mutex::new(Some(profile)),
        }))
    }
}

pub struct ChromeBrowser {
    client: CdpClient,
    tab_id: String,
    page: Page,
    child: Mutex<Option<Child>>,
    profile: Mutex<Option<TempDir>>,
}

#[async_trait::async_trait]
impl Browser for ChromeBrowser {
    fn page(&self) -> Page {
        self.page.clone()
    }

    async fn close(&self) -> Result<(), AutomationError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = self.client.close_tab(&self.tab_id).await {
            debug!("closing tab failed: {e}");
        }
        if let Err(e) = child.kill().await {
            warn!("Failed to stop browser: {}", e);
        }
        if let Some(profile) = self.profile.lock().await.take() {
            if let Err(e) = profile.close() {
                debug!("profile cleanup: {e}");
            }
        }
        info!("Browser closed");
        Ok(())
    }
}
