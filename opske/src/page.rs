use crate::browser::PageDriver;
use crate::errors::AutomationError;
use crate::locator::{Locator, DEFAULT_LOCATOR_TIMEOUT};
use crate::selector::Selector;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// The page a session works on
///
/// Cheap to clone; all clones drive the same browser tab.
#[derive(Clone)]
pub struct Page {
    driver: Arc<dyn PageDriver>,
    default_timeout: Duration,
}

impl Page {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            driver,
            default_timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Timeout used by locators created from this page and by navigation.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.driver.clone(), selector.into()).set_default_timeout(self.default_timeout)
    }

    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn goto(&self, url: &str, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.driver
            .goto(url, timeout.unwrap_or(self.default_timeout))
            .await
    }

    pub async fn wait_for_load(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        self.driver
            .wait_for_load(timeout.unwrap_or(self.default_timeout))
            .await
    }

    /// Capture the viewport as PNG into `path`, creating parent directories.
    pub async fn screenshot_to(&self, path: &Path) -> Result<PathBuf, AutomationError> {
        let png = self.driver.screenshot().await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AutomationError::PlatformError(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(path, &png)
            .await
            .map_err(|e| AutomationError::PlatformError(format!("{}: {e}", path.display())))?;
        debug!(bytes = png.len(), "screenshot saved to {}", path.display());
        Ok(path.to_path_buf())
    }

    pub async fn close(&self) -> Result<(), AutomationError> {
        self.driver.close().await
    }
}
