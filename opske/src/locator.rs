use tracing::{debug, instrument};

use crate::browser::PageDriver;
use crate::errors::AutomationError;
use crate::selector::Selector;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Default timeout if none is specified on the locator itself
pub(crate) const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What [`Locator::wait_for`] waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// At least one element matches.
    Attached,
    /// The first match is rendered with a non-empty box.
    Visible,
}

/// A lazy handle to the elements a selector matches on a page
///
/// Nothing is resolved until an action or query runs, so a locator built
/// before navigation still works afterwards. Actions apply to the first match
/// and auto-wait for it to be visible.
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn PageDriver>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("selector", &self.selector_string())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Locator {
    pub(crate) fn new(driver: Arc<dyn PageDriver>, selector: Selector) -> Self {
        Self {
            driver,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    /// This timeout is used if no specific timeout is passed to action/wait methods.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn selector_string(&self) -> String {
        self.selector.to_string()
    }

    fn append_selector(&self, selector_to_append: Selector) -> Locator {
        Locator {
            driver: self.driver.clone(),
            selector: self.selector.then(selector_to_append),
            timeout: self.timeout,
        }
    }

    /// Get a nested locator
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        self.append_selector(selector.into())
    }

    /// Keeps only the matches that are currently visible.
    pub fn visible(&self) -> Locator {
        self.append_selector(Selector::Visible(true))
    }

    pub fn first(&self) -> Locator {
        self.nth(0)
    }

    pub fn last(&self) -> Locator {
        self.nth(-1)
    }

    pub fn nth(&self, index: i32) -> Locator {
        self.append_selector(Selector::Nth(index))
    }

    fn checked_selector(&self) -> Result<&Selector, AutomationError> {
        match self.selector.invalid_reason() {
            Some(reason) => Err(AutomationError::InvalidSelector(format!(
                "{}: {reason}",
                self.selector_string()
            ))),
            None => Ok(&self.selector),
        }
    }

    /// Number of elements matching right now. Does not wait.
    pub async fn count(&self) -> Result<usize, AutomationError> {
        let selector = self.checked_selector()?;
        self.driver.count(selector).await
    }

    /// One locator per element matching right now, in document order.
    pub async fn all(&self) -> Result<Vec<Locator>, AutomationError> {
        let count = self.count().await?;
        Ok((0..count).map(|i| self.nth(i as i32)).collect())
    }

    /// Poll until the locator reaches `state` or the timeout elapses.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_for(
        &self,
        state: WaitState,
        timeout: Option<Duration>,
    ) -> Result<(), AutomationError> {
        let selector = self.checked_selector()?;
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;
        loop {
            let reached = match state {
                WaitState::Attached => self.driver.count(selector).await.map(|n| n > 0),
                WaitState::Visible => self.driver.is_visible(selector).await,
            };
            match reached {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(AutomationError::SessionClosed) => return Err(AutomationError::SessionClosed),
                Err(e) => debug!("probe failed while waiting: {e}"),
            }
            let now = Instant::now();
            if now >= deadline {
                if state == WaitState::Visible
                    && self.driver.count(selector).await.is_ok_and(|n| n > 0)
                {
                    return Err(AutomationError::ElementNotVisible(format!(
                        "{:?} is attached but stayed hidden for {effective_timeout:?}",
                        self.selector_string()
                    )));
                }
                return Err(AutomationError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for {state:?} element {:?}",
                    self.selector_string()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Wait for the first match to become visible.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait_for(WaitState::Visible, timeout).await
    }

    pub async fn click(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.wait(timeout).await?;
        self.driver.click(&self.selector).await
    }

    /// Replace the value of the first matching input. Disabled inputs are
    /// refused.
    pub async fn fill(&self, value: &str) -> Result<(), AutomationError> {
        self.wait(None).await?;
        if !self.driver.is_enabled(&self.selector).await? {
            return Err(AutomationError::ElementNotEnabled(self.selector_string()));
        }
        self.driver.fill(&self.selector, value).await
    }

    /// Text of the first match, or `None` when nothing matches. Does not wait.
    pub async fn text_content(&self) -> Result<Option<String>, AutomationError> {
        let selector = self.checked_selector()?;
        self.driver.text_content(selector).await
    }

    pub async fn is_visible(&self) -> Result<bool, AutomationError> {
        let selector = self.checked_selector()?;
        self.driver.is_visible(selector).await
    }

    pub async fn is_enabled(&self) -> Result<bool, AutomationError> {
        let selector = self.checked_selector()?;
        self.driver.is_enabled(selector).await
    }

    /// Scroll the first match into the viewport, waiting for it to attach.
    pub async fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.wait_for(WaitState::Attached, None).await?;
        self.driver.scroll_into_view(&self.selector).await
    }

    /// Click this locator as a file-chooser trigger and answer the chooser
    /// with `files`.
    pub async fn set_input_files(
        &self,
        files: &[PathBuf],
        timeout: Option<Duration>,
    ) -> Result<(), AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        self.wait(Some(effective_timeout)).await?;
        self.driver
            .attach_files(&self.selector, files, effective_timeout)
            .await
    }
}
