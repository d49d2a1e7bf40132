//! Spreadsheet-driven submission of supporting documents to the OPSKE portal
//!
//! A run reads document metadata from a spreadsheet, resolves each row's file in
//! a local folder, logs into the portal through a real browser, fills the
//! upload form for every pending row and records the outcome back into the
//! spreadsheet. The browser is driven through a Playwright-style
//! [`Page`]/[`Locator`] API on top of the [`PageDriver`] trait; the bundled
//! backend speaks the Chrome DevTools Protocol.

pub mod afm;
pub mod browser;
pub mod calendar;
pub mod config;
pub mod credentials;
pub mod dates;
pub mod errors;
pub mod gate;
pub mod ledger;
pub mod locator;
pub mod page;
pub mod portal;
pub mod progress;
pub mod run;
pub mod selector;
pub mod types;
pub mod validator;

pub use browser::{Browser, BrowserLauncher, PageDriver};
pub use calendar::{CalendarPicker, CalendarReport, CalendarState};
pub use config::{AgentConfig, FilePolicy, Millis, PortalConfig, Timings};
pub use credentials::{CredentialSource, Credentials};
pub use errors::{AgentError, AutomationError};
pub use gate::PauseGate;
pub use ledger::{DocumentRow, Ledger, SheetTable, WorkSet};
pub use locator::{Locator, WaitState};
pub use page::Page;
pub use portal::{RecoveryProcedure, SessionState, UploadDisposition, UploadSession, WorkItem};
pub use progress::{ChannelProgress, ProgressEvent, ProgressSink, TracingProgress};
pub use run::{Orchestrator, RunContext, RunRequest};
pub use selector::Selector;
pub use types::{OutcomeReason, RunMode, RunOutcome, RunSummary};
pub use validator::{PrecheckReport, ValidationVerdict};
