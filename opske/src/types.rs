//! Common types shared by the ledger, the session and the orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Whether a run stops after saving a document or also submits it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Save,
    Submit,
}

impl RunMode {
    pub fn submits(self) -> bool {
        matches!(self, RunMode::Submit)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Save => f.write_str("save"),
            RunMode::Submit => f.write_str("submit"),
        }
    }
}

/// Why an item ended the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum OutcomeReason {
    AlreadySubmitted,
    AlreadySaved,
    /// Saved, but the submit control was disabled
    SubmitUnavailable,
    FileNotFound,
    FileInvalid(String),
    Failed(String),
}

impl OutcomeReason {
    /// Reasons that explain a skip or a partial result rather than a failure.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            OutcomeReason::AlreadySubmitted
                | OutcomeReason::AlreadySaved
                | OutcomeReason::SubmitUnavailable
        )
    }
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeReason::AlreadySubmitted => f.write_str("already submitted"),
            OutcomeReason::AlreadySaved => f.write_str("already saved"),
            OutcomeReason::SubmitUnavailable => f.write_str("submit unavailable"),
            OutcomeReason::FileNotFound => f.write_str("no matching file in the folder"),
            OutcomeReason::FileInvalid(reason) => write!(f, "invalid file: {reason}"),
            OutcomeReason::Failed(reason) => f.write_str(reason),
        }
    }
}

/// Result of one spreadsheet row, keyed by its file base name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub name: String,
    pub success: bool,
    pub reason: Option<OutcomeReason>,
}

impl RunOutcome {
    pub fn succeeded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            reason: None,
        }
    }

    /// Processed, with a note such as [`OutcomeReason::SubmitUnavailable`].
    pub fn succeeded_with(name: impl Into<String>, reason: OutcomeReason) -> Self {
        Self {
            name: name.into(),
            success: true,
            reason: Some(reason),
        }
    }

    pub fn failed(name: impl Into<String>, reason: OutcomeReason) -> Self {
        Self {
            name: name.into(),
            success: false,
            reason: Some(reason),
        }
    }

    /// Not attempted because an earlier run already completed it.
    pub fn skipped(name: impl Into<String>, reason: OutcomeReason) -> Self {
        Self {
            name: name.into(),
            success: false,
            reason: Some(reason),
        }
    }

    /// A real failure, not a skip or a partial success.
    pub fn is_failure(&self) -> bool {
        !self.success
            && !self
                .reason
                .as_ref()
                .is_some_and(OutcomeReason::is_informational)
    }

    pub fn is_skip(&self) -> bool {
        !self.success && !self.is_failure()
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, self.success) {
            (None, _) => write!(f, "{}: ok", self.name),
            (Some(reason), true) => write!(f, "{}: ok ({reason})", self.name),
            (Some(reason), false) => write!(f, "{}: {reason}", self.name),
        }
    }
}

/// Everything a finished run reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcomes: Vec<RunOutcome>,
    /// Message for runs with nothing to do, e.g. "all documents already submitted"
    pub info: Option<String>,
    /// Where the updated spreadsheet was written
    pub persisted_to: Option<PathBuf>,
    /// Set when the outcomes could not be written back to the spreadsheet
    pub persist_error: Option<String>,
}

impl RunSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.is_skip())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some() || self.persist_error.is_some()
    }
}
