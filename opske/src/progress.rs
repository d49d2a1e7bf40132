//! Progress reporting from a running job
//!
//! The run calls a [`ProgressSink`] from its own task. [`ChannelProgress`]
//! turns the calls into [`ProgressEvent`]s so a front-end can render them on
//! its own schedule.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::types::{RunOutcome, RunSummary};

pub trait ProgressSink: Send + Sync {
    fn on_item_start(&self, _name: &str, _position: usize, _total: usize) {}

    /// Percent complete of the current item, 0..=100
    fn on_item_progress(&self, _name: &str, _percent: u8) {}

    fn on_item_done(&self, _outcome: &RunOutcome, _position: usize, _total: usize) {}

    fn on_run_done(&self, _summary: &RunSummary) {}
}

/// Writes progress to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_item_start(&self, name: &str, position: usize, total: usize) {
        info!("[{position}/{total}] {name}");
    }

    fn on_item_done(&self, outcome: &RunOutcome, position: usize, total: usize) {
        if outcome.is_failure() {
            warn!("[{position}/{total}] {outcome}");
        } else {
            info!("[{position}/{total}] {outcome}");
        }
    }

    fn on_run_done(&self, summary: &RunSummary) {
        info!(
            succeeded = summary.succeeded().count(),
            failed = summary.failures().count(),
            skipped = summary.skipped().count(),
            "Run finished"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    ItemStarted {
        name: String,
        position: usize,
        total: usize,
    },
    ItemProgress {
        name: String,
        percent: u8,
    },
    ItemDone {
        outcome: RunOutcome,
        position: usize,
        total: usize,
    },
    RunDone(RunSummary),
}

/// Forwards progress to a channel
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: ProgressEvent) {
        // The receiver going away only means nobody is watching anymore.
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelProgress {
    fn on_item_start(&self, name: &str, position: usize, total: usize) {
        self.emit(ProgressEvent::ItemStarted {
            name: name.to_string(),
            position,
            total,
        });
    }

    fn on_item_progress(&self, name: &str, percent: u8) {
        self.emit(ProgressEvent::ItemProgress {
            name: name.to_string(),
            percent: percent.min(100),
        });
    }

    fn on_item_done(&self, outcome: &RunOutcome, position: usize, total: usize) {
        self.emit(ProgressEvent::ItemDone {
            outcome: outcome.clone(),
            position,
            total,
        });
    }

    fn on_run_done(&self, summary: &RunSummary) {
        self.emit(ProgressEvent::RunDone(summary.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order_and_are_clamped() {
        let (sink, mut rx) = ChannelProgress::new();
        sink.on_item_start("a", 1, 2);
        sink.on_item_progress("a", 250);
        sink.on_item_done(&RunOutcome::succeeded("a"), 1, 2);

        assert!(matches!(rx.try_recv().unwrap(), ProgressEvent::ItemStarted { position: 1, .. }));
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::ItemProgress {
                name: "a".into(),
                percent: 100
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), ProgressEvent::ItemDone { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_harmless() {
        let (sink, rx) = ChannelProgress::new();
        drop(rx);
        sink.on_run_done(&RunSummary::default());
    }
}
