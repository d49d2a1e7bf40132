//! Running a whole submission job
//!
//! Ledger → work set → browser → login → one item at a time → persist →
//! close. Fatal errors stop the run; anything that goes wrong with a single
//! document is recorded against it and the run moves on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, instrument, warn};

use crate::browser::{Browser, BrowserLauncher};
use crate::config::AgentConfig;
use crate::credentials::Credentials;
use crate::errors::AgentError;
use crate::gate::PauseGate;
use crate::ledger::{DocumentRow, Ledger};
use crate::portal::{UploadDisposition, UploadSession, WorkItem};
use crate::progress::ProgressSink;
use crate::types::{OutcomeReason, RunMode, RunOutcome, RunSummary};
use crate::validator::{check_file, resolve_document, PrecheckReport};

/// What to process
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub spreadsheet: PathBuf,
    pub folder: PathBuf,
}

/// Operator-controlled state of a run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub mode: RunMode,
    gate: PauseGate,
    precheck_passed: bool,
}

impl RunContext {
    pub fn new(mode: RunMode, gate: PauseGate) -> Self {
        Self {
            mode,
            gate,
            precheck_passed: false,
        }
    }

    /// Record the verdict of the latest precheck. A run only starts after a
    /// passing one.
    pub fn record_precheck(&mut self, report: &PrecheckReport) {
        self.precheck_passed = report.passed();
    }

    pub fn precheck_passed(&self) -> bool {
        self.precheck_passed
    }

    pub fn gate(&self) -> &PauseGate {
        &self.gate
    }
}

pub struct Orchestrator {
    config: AgentConfig,
    launcher: Arc<dyn BrowserLauncher>,
}

impl Orchestrator {
    pub fn new(config: AgentConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    #[instrument(skip_all, fields(mode = %ctx.mode, sheet = %request.spreadsheet.display()))]
    pub async fn run(
        &self,
        request: &RunRequest,
        ctx: &RunContext,
        credentials: &Credentials,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary, AgentError> {
        if !ctx.precheck_passed() {
            return Err(AgentError::PrecheckRequired);
        }

        let mut ledger = Ledger::load(&request.spreadsheet)?;
        let work = ledger.compute_work_set(ctx.mode);
        let mut summary = RunSummary {
            outcomes: work.pre_completed,
            ..Default::default()
        };
        if work.items.is_empty() {
            info!("Nothing to do");
            summary.info = work.summary;
            progress.on_run_done(&summary);
            return Ok(summary);
        }

        let browser = self
            .launcher
            .launch()
            .await
            .map_err(|e| AgentError::BrowserLaunch(e.to_string()))?;
        let processed = self
            .drive(browser.as_ref(), &mut ledger, &work.items, request, ctx, credentials, progress)
            .await;
        if let Err(e) = browser.close().await {
            warn!("Closing the browser failed: {e}");
        }

        let outcomes = processed.inspect_err(|e| error!("Run aborted: {e}"))?;
        summary.outcomes.extend(outcomes);
        // Documents are already on the portal; report them even if the sheet
        // cannot be updated
        match ledger.persist() {
            Ok(path) => summary.persisted_to = Some(path),
            Err(e) => {
                error!("{e}");
                summary.persist_error = Some(e.to_string());
            }
        }
        progress.on_run_done(&summary);
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        browser: &dyn Browser,
        ledger: &mut Ledger,
        items: &[DocumentRow],
        request: &RunRequest,
        ctx: &RunContext,
        credentials: &Credentials,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<RunOutcome>, AgentError> {
        let mut session = UploadSession::new(browser.page(), &self.config);
        session.authenticate(credentials).await?;

        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, row) in items.iter().enumerate() {
            let position = index + 1;
            if ctx.gate().is_paused() {
                info!("Paused before {}", row.file_base_name);
            }
            ctx.gate().wait_until_running().await;

            progress.on_item_start(&row.file_base_name, position, total);
            let outcome = self
                .process(&mut session, ledger, row, &request.folder, ctx.mode, progress)
                .await;
            progress.on_item_done(&outcome, position, total);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn process(
        &self,
        session: &mut UploadSession,
        ledger: &mut Ledger,
        row: &DocumentRow,
        folder: &Path,
        mode: RunMode,
        progress: &dyn ProgressSink,
    ) -> RunOutcome {
        let name = row.file_base_name.clone();
        let file = match resolve_document(folder, &name) {
            Ok(Some(file)) => file,
            Ok(None) => {
                warn!("{name}: no matching file");
                return RunOutcome::failed(name, OutcomeReason::FileNotFound);
            }
            Err(e) => {
                warn!("{name}: cannot read {}: {e}", folder.display());
                return RunOutcome::failed(name, OutcomeReason::Failed(e.to_string()));
            }
        };
        let verdict = check_file(&file, &self.config.files);
        if let Some(reason) = verdict.reason {
            warn!("{name}: {reason}");
            return RunOutcome::failed(name, OutcomeReason::FileInvalid(reason));
        }
        progress.on_item_progress(&name, 10);

        let item = WorkItem {
            row: row.clone(),
            file,
        };
        match session.upload(&item, mode, progress).await {
            Ok(disposition) => {
                ledger.record_outcome(
                    row.row_key,
                    disposition.submitted(),
                    Local::now().naive_local(),
                );
                match disposition {
                    UploadDisposition::SubmitUnavailable => {
                        RunOutcome::succeeded_with(name, OutcomeReason::SubmitUnavailable)
                    }
                    UploadDisposition::Saved | UploadDisposition::Submitted { .. } => {
                        RunOutcome::succeeded(name)
                    }
                }
            }
            Err(e) => {
                warn!("{name}: {e}");
                session.recover().await;
                RunOutcome::failed(name, OutcomeReason::Failed(e.to_string()))
            }
        }
    }
}
