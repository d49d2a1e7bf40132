//! Browser abstraction used by the portal session
//!
//! [`PageDriver`] is the seam between the Playwright-style [`Page`] API and a
//! concrete browser. Every element operation receives the full selector chain
//! and acts on its first match.

mod cdp;
mod chrome;
mod script;

pub use cdp::{CdpClient, CdpConnection, CdpEvent, CdpPage, TabInfo};
pub use chrome::{find_chrome, ChromeBrowser, ChromeLauncher};
pub use script::compile_resolver;

use crate::errors::AutomationError;
use crate::page::Page;
use crate::selector::Selector;
use std::path::PathBuf;
use std::time::Duration;

/// The common trait every browser backend must implement
#[async_trait::async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the document to finish loading.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError>;

    /// Wait until the current document and its network activity settle.
    async fn wait_for_load(&self, timeout: Duration) -> Result<(), AutomationError>;

    async fn count(&self, selector: &Selector) -> Result<usize, AutomationError>;

    /// Visibility of the first match; `false` when nothing matches.
    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError>;

    /// Enabled state of the first match; `false` when nothing matches.
    async fn is_enabled(&self, selector: &Selector) -> Result<bool, AutomationError>;

    async fn text_content(&self, selector: &Selector) -> Result<Option<String>, AutomationError>;

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError>;

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError>;

    async fn scroll_into_view(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// Click `trigger`, intercept the file chooser it opens and answer it
    /// with `files`.
    async fn attach_files(
        &self,
        trigger: &Selector,
        files: &[PathBuf],
        timeout: Duration,
    ) -> Result<(), AutomationError>;

    /// PNG capture of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError>;

    async fn close(&self) -> Result<(), AutomationError>;
}

/// A running browser owning one page
#[async_trait::async_trait]
pub trait Browser: Send + Sync {
    fn page(&self) -> Page;

    /// Tear the browser down. Safe to call more than once.
    async fn close(&self) -> Result<(), AutomationError>;
}

/// Starts browsers for a run
#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>, AutomationError>;
}
