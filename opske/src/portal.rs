//! The OPSKE portal session: login and the per-document upload cycle

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::calendar::CalendarPicker;
use crate::config::{AgentConfig, PortalConfig, Timings};
use crate::credentials::Credentials;
use crate::dates::date_or_today;
use crate::errors::{AgentError, AutomationError};
use crate::ledger::DocumentRow;
use crate::locator::{Locator, WaitState};
use crate::page::Page;
use crate::progress::ProgressSink;
use crate::types::RunMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    OnDocumentList,
    FormOpen,
    Filled,
    Saved,
    Submitted,
    Returned,
}

/// A row together with the document file resolved for it
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub row: DocumentRow,
    pub file: PathBuf,
}

/// How far an upload got
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadDisposition {
    Saved,
    Submitted { screenshot: Option<PathBuf> },
    /// Saved, but the submit control was disabled
    SubmitUnavailable,
}

impl UploadDisposition {
    pub fn submitted(&self) -> bool {
        matches!(self, UploadDisposition::Submitted { .. })
    }
}

/// Brings the page back to a known state after an item failed
#[async_trait::async_trait]
pub trait RecoveryProcedure: Send + Sync {
    async fn recover(&self, page: &Page) -> Result<(), AutomationError>;
}

/// Navigates to a fixed URL and waits for it to load
#[derive(Debug, Clone)]
pub struct NavigateTo {
    pub url: String,
    pub timeout: Duration,
}

#[async_trait::async_trait]
impl RecoveryProcedure for NavigateTo {
    async fn recover(&self, page: &Page) -> Result<(), AutomationError> {
        page.goto(&self.url, Some(self.timeout)).await?;
        page.wait_for_load(Some(self.timeout)).await
    }
}

fn prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn suffix(text: &str, chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(chars)).collect()
}

fn screenshot_name(file_base_name: &str) -> String {
    let safe: String = file_base_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("submitted_{safe}.png")
}

pub struct UploadSession {
    page: Page,
    portal: PortalConfig,
    timings: Timings,
    screenshot_dir: PathBuf,
    recovery: Box<dyn RecoveryProcedure>,
    state: SessionState,
}

impl UploadSession {
    pub fn new(page: Page, config: &AgentConfig) -> Self {
        let recovery = NavigateTo {
            url: config.portal.document_list_url.clone(),
            timeout: config.timings.recovery_timeout.duration(),
        };
        Self {
            page,
            portal: config.portal.clone(),
            timings: config.timings.clone(),
            screenshot_dir: config.screenshot_dir.clone(),
            recovery: Box::new(recovery),
            state: SessionState::LoggedOut,
        }
    }

    pub fn with_recovery(mut self, recovery: Box<dyn RecoveryProcedure>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session");
        self.state = next;
    }

    fn locator(&self, selector: &str) -> Locator {
        self.page.locator(selector)
    }

    /// Log in through the federated login and open the document list.
    #[instrument(skip_all, fields(user = %credentials.username))]
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), AgentError> {
        self.enter(SessionState::Authenticating);
        let login = self.portal.login.clone();
        let step = |what: &'static str| {
            move |e: AutomationError| AgentError::AuthenticationTimeout(format!("{what}: {e}"))
        };

        self.page
            .goto(&self.portal.base_url, None)
            .await
            .map_err(step("opening the portal"))?;
        self.locator(&login.entry)
            .click(None)
            .await
            .map_err(step("login entry"))?;
        self.locator(&login.username)
            .fill(&credentials.username)
            .await
            .map_err(step("username field"))?;
        self.locator(&login.password)
            .fill(credentials.password())
            .await
            .map_err(step("password field"))?;
        self.locator(&login.submit)
            .first()
            .click(None)
            .await
            .map_err(step("login button"))?;
        let consent = self.locator(&login.consent);
        consent.wait(None).await.map_err(step("post-login page"))?;
        consent.click(None).await.map_err(step("post-login page"))?;
        self.locator(&login.document_list_link)
            .click(None)
            .await
            .map_err(step("document list link"))?;

        self.enter(SessionState::OnDocumentList);
        info!("Logged in");
        Ok(())
    }

    /// Upload one document: open the form, fill it, attach the file, save
    /// and, in submit mode, submit. Always tries to return to the list.
    #[instrument(skip_all, fields(name = %item.row.file_base_name, %mode))]
    pub async fn upload(
        &mut self,
        item: &WorkItem,
        mode: RunMode,
        progress: &dyn ProgressSink,
    ) -> Result<UploadDisposition, AgentError> {
        let name = item.row.file_base_name.as_str();

        self.open_form().await?;
        progress.on_item_progress(name, 25);

        self.fill_form(&item.row).await?;
        progress.on_item_progress(name, 50);

        self.set_dates(&item.row).await?;
        progress.on_item_progress(name, 65);

        self.attach(&item.file).await?;
        progress.on_item_progress(name, 75);

        self.save().await?;
        progress.on_item_progress(name, 85);

        let disposition = if mode.submits() {
            self.submit(name).await?
        } else {
            UploadDisposition::Saved
        };
        progress.on_item_progress(name, 95);

        self.return_to_list().await;
        progress.on_item_progress(name, 100);
        Ok(disposition)
    }

    async fn open_form(&mut self) -> Result<(), AgentError> {
        let add = self
            .locator(&self.portal.form.add_button)
            .set_default_timeout(self.timings.add_button_timeout.duration());
        add.wait(None).await?;
        add.click(None).await?;
        info!("Add form opened");
        tokio::time::sleep(self.timings.after_add.duration()).await;
        self.enter(SessionState::FormOpen);
        Ok(())
    }

    /// Click the first dropdown option whose text satisfies `matches`.
    async fn pick_option(&self, matches: impl Fn(&str) -> bool) -> Result<bool, AgentError> {
        let options = self.locator(&self.portal.form.option);
        options.wait_for(WaitState::Attached, None).await?;
        for option in options.all().await? {
            let Some(text) = option.text_content().await? else {
                continue;
            };
            if matches(text.trim()) {
                option.click(None).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn fill_form(&mut self, row: &DocumentRow) -> Result<(), AgentError> {
        let form = self.portal.form.clone();

        // Party: filter by the start of the label, pick by its tail
        self.locator(&form.party_combobox).click(None).await?;
        self.locator(&form.dropdown_filter)
            .first()
            .fill(&prefix(&row.party_label, self.portal.party_filter_chars))
            .await?;
        let tail = suffix(&row.party_label, self.portal.party_match_chars);
        if !self.pick_option(|text| text.contains(&tail)).await? {
            return Err(AutomationError::ElementNotFound(format!(
                "no party option matching '{}'",
                row.party_label
            ))
            .into());
        }
        info!(party = %row.party_label, "Party selected");

        // Project: multi-select, matched on the code
        self.locator(&form.project_multiselect).click(None).await?;
        let code = row.project_code.to_uppercase();
        if !self
            .pick_option(|text| text.to_uppercase().contains(&code))
            .await?
        {
            return Err(AutomationError::ElementNotFound(format!(
                "no project option matching '{}'",
                row.project_code
            ))
            .into());
        }
        self.locator(&form.dismiss_overlay).click(None).await?;
        info!(project = %row.project_code, "Project selected");

        // Document type: the first option left by the filter
        self.locator(&form.document_type_combobox)
            .click(None)
            .await?;
        self.locator(&form.dropdown_filter)
            .first()
            .fill(&prefix(
                &row.document_type_code,
                self.portal.document_filter_chars,
            ))
            .await?;
        self.locator(&form.option).first().click(None).await?;
        info!(document = %row.document_type_code, "Document type selected");

        self.locator(&form.comments).fill(&row.note).await?;
        self.enter(SessionState::Filled);
        Ok(())
    }

    async fn pick_date(&self, field: &str, date: NaiveDate) -> Result<(), AgentError> {
        self.locator(field).click(None).await?;
        CalendarPicker::new(&self.page, &self.portal.calendar, &self.timings)
            .select_date(date.day(), date.month(), date.year())
            .await?;
        Ok(())
    }

    async fn set_dates(&mut self, row: &DocumentRow) -> Result<(), AgentError> {
        let today = Local::now().date_naive();
        let issued = date_or_today(&row.issue_date, today);
        let expires = date_or_today(&row.expiry_date, today);
        self.pick_date(&self.portal.form.issue_date, issued).await?;
        self.pick_date(&self.portal.form.expiry_date, expires).await?;
        Ok(())
    }

    async fn attach(&mut self, file: &Path) -> Result<(), AgentError> {
        self.locator(&self.portal.form.file_chooser_trigger)
            .set_input_files(
                &[file.to_path_buf()],
                Some(self.timings.file_chooser_timeout.duration()),
            )
            .await?;
        info!("Attached {}", file.display());
        Ok(())
    }

    async fn save(&mut self) -> Result<(), AgentError> {
        self.locator(&self.portal.form.save_button)
            .click(None)
            .await?;
        let toast = self.locator(&self.portal.form.save_toast);
        match toast
            .wait(Some(self.timings.save_toast_timeout.duration()))
            .await
        {
            Ok(()) => {
                info!("Saved");
                tokio::time::sleep(self.timings.after_save_toast.duration()).await;
            }
            Err(e) => warn!("No save confirmation seen: {e}"),
        }
        self.enter(SessionState::Saved);
        Ok(())
    }

    async fn submit(&mut self, name: &str) -> Result<UploadDisposition, AgentError> {
        let button = self.locator(&self.portal.form.submit_button).first();
        button.scroll_into_view().await?;
        tokio::time::sleep(self.timings.before_submit.duration()).await;
        if !button.is_enabled().await? {
            warn!("Submit button is disabled, leaving the document saved only");
            return Ok(UploadDisposition::SubmitUnavailable);
        }
        button.click(None).await?;

        match self
            .locator(&self.portal.form.submitted_marker)
            .wait_for(
                WaitState::Attached,
                Some(self.timings.submit_confirm_timeout.duration()),
            )
            .await
        {
            Ok(()) => info!("Submitted"),
            Err(e) => warn!("Submission not confirmed: {e}"),
        }
        tokio::time::sleep(self.timings.after_submit.duration()).await;

        let path = self.screenshot_dir.join(screenshot_name(name));
        let screenshot = match self.page.screenshot_to(&path).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Confirmation screenshot failed: {e}");
                None
            }
        };
        self.enter(SessionState::Submitted);
        Ok(UploadDisposition::Submitted { screenshot })
    }

    /// Best effort: direct link, then the return button, else stay put.
    async fn return_to_list(&mut self) {
        let link = self.locator(&self.portal.form.return_link).first();
        let via_link = link
            .click(Some(self.timings.return_link_timeout.duration()))
            .await;
        if let Err(e) = via_link {
            debug!("return link unavailable: {e}");
            let button = self.locator(&self.portal.form.return_button).first();
            match button.count().await {
                Ok(n) if n > 0 => {
                    if let Err(e) = button.click(None).await {
                        debug!("return button failed: {e}");
                    }
                }
                Ok(_) => debug!("no return button either"),
                Err(e) => debug!("return button lookup failed: {e}"),
            }
        }
        tokio::time::sleep(self.timings.after_return.duration()).await;
        self.enter(SessionState::Returned);
    }

    /// Run the recovery procedure. Failures are logged, never returned.
    pub async fn recover(&mut self) {
        match self.recovery.recover(&self.page).await {
            Ok(()) => {
                info!("Recovered to the document list");
                self.enter(SessionState::OnDocumentList);
            }
            Err(e) => warn!("Recovery failed: {e}"),
        }
    }
}
