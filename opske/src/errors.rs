use thiserror::Error;

/// Failures raised by the browser layer (page driver, locators, CDP transport).
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("DevTools protocol error: {0}")]
    Protocol(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Browser session is closed")]
    SessionClosed,
}

/// Domain failures of a submission run.
///
/// Fatal variants stop the run; everything else is recorded against the
/// current item and the run moves on. See [`AgentError::is_fatal`].
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Spreadsheet is missing required columns: {}", .0.join(", "))]
    Schema(Vec<String>),

    #[error("Spreadsheet could not be read: {0}")]
    SpreadsheetRead(String),

    #[error("Spreadsheet could not be written: {0}")]
    SpreadsheetWrite(String),

    #[error("Date {0} is outside the calendar's selectable range")]
    OutOfRange(String),

    #[error("No selectable day {0} in the calendar")]
    DayNotFound(String),

    #[error("Browser could not be started: {0}")]
    BrowserLaunch(String),

    #[error("Login did not complete: {0}")]
    AuthenticationTimeout(String),

    #[error("{0}")]
    ItemInteraction(#[from] AutomationError),

    #[error("The spreadsheet and file check has not passed")]
    PrecheckRequired,

    #[error("No credentials were provided")]
    CredentialsCancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether this error must abort the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Schema(_)
                | AgentError::SpreadsheetRead(_)
                | AgentError::SpreadsheetWrite(_)
                | AgentError::BrowserLaunch(_)
                | AgentError::AuthenticationTimeout(_)
                | AgentError::PrecheckRequired
                | AgentError::CredentialsCancelled
                | AgentError::Config(_)
        )
    }
}
