//! Scripted in-memory browser for driving the portal session in tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate};
use opske::config::{AgentConfig, Timings};
use opske::{AutomationError, Browser, BrowserLauncher, Page, PageDriver, Selector};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("opske=debug")),
        )
        .with_test_writer()
        .try_init();
}

const GREEK_MONTHS: [&str; 12] = [
    "Ιανουάριος",
    "Φεβρουάριος",
    "Μάρτιος",
    "Απρίλιος",
    "Μάιος",
    "Ιούνιος",
    "Ιούλιος",
    "Αύγουστος",
    "Σεπτέμβριος",
    "Οκτώβριος",
    "Νοέμβριος",
    "Δεκέμβριος",
];

#[derive(Debug)]
pub struct FakeState {
    /// (year, month) the picker header shows
    pub shown: (i32, u32),
    /// The next N header reads come back empty
    pub unreadable_header_reads: usize,
    /// Selector fragments that match nothing
    pub missing: Vec<String>,
    /// Selector fragments whose element is disabled
    pub disabled: Vec<String>,
    /// Selector fragments whose element is attached but not rendered
    pub hidden: Vec<String>,
    pub option_texts: Vec<String>,
    pub actions: Vec<String>,
}

/// A [`PageDriver`] that pretends every element exists unless told otherwise
/// and keeps a log of what was done to it. Selectors are matched on their
/// rendered text.
pub struct FakePage {
    pub state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        let today = Local::now().date_naive();
        Self::showing(today.year(), today.month())
    }

    pub fn showing(year: i32, month: u32) -> Self {
        Self {
            state: Mutex::new(FakeState {
                shown: (year, month),
                unreadable_header_reads: 0,
                missing: Vec::new(),
                disabled: Vec::new(),
                hidden: Vec::new(),
                option_texts: vec![
                    "ΑΛΦΑ Α.Ε. - 094014201".to_string(),
                    "ΕΡΓ-12 Ανακαίνιση".to_string(),
                ],
                actions: Vec::new(),
            }),
        }
    }

    pub fn with_missing(self, fragment: &str) -> Self {
        self.state.lock().unwrap().missing.push(fragment.to_string());
        self
    }

    pub fn with_disabled(self, fragment: &str) -> Self {
        self.state.lock().unwrap().disabled.push(fragment.to_string());
        self
    }

    pub fn with_hidden(self, fragment: &str) -> Self {
        self.state.lock().unwrap().hidden.push(fragment.to_string());
        self
    }

    pub fn with_unreadable_header(self, reads: usize) -> Self {
        self.state.lock().unwrap().unreadable_header_reads = reads;
        self
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn count_actions(&self, needle: &str) -> usize {
        self.actions().iter().filter(|a| a.contains(needle)).count()
    }

    fn exists(state: &FakeState, rendered: &str) -> bool {
        !state.missing.iter().any(|m| rendered.contains(m.as_str()))
    }

    fn nth_of(selector: &Selector) -> Option<i32> {
        match selector {
            Selector::Chain(parts) => parts.iter().rev().find_map(|p| match p {
                Selector::Nth(n) => Some(*n),
                _ => None,
            }),
            Selector::Nth(n) => Some(*n),
            _ => None,
        }
    }

    fn is_option(rendered: &str) -> bool {
        rendered.contains("@role='option'")
    }

    fn option_index(state: &FakeState, selector: &Selector) -> Option<usize> {
        let len = state.option_texts.len() as i32;
        let n = Self::nth_of(selector).unwrap_or(0);
        let i = if n < 0 { len + n } else { n };
        (0..len).contains(&i).then_some(i as usize)
    }
}

#[async_trait::async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), AutomationError> {
        self.state.lock().unwrap().actions.push(format!("goto {url}"));
        Ok(())
    }

    async fn wait_for_load(&self, _timeout: Duration) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn count(&self, selector: &Selector) -> Result<usize, AutomationError> {
        let state = self.state.lock().unwrap();
        let rendered = selector.to_string();
        if !Self::exists(&state, &rendered) {
            return Ok(0);
        }
        if Self::is_option(&rendered) {
            return Ok(match Self::nth_of(selector) {
                Some(_) => Self::option_index(&state, selector).map_or(0, |_| 1),
                None => state.option_texts.len(),
            });
        }
        Ok(1)
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError> {
        let attached = self.count(selector).await? > 0;
        let rendered = selector.to_string();
        let state = self.state.lock().unwrap();
        Ok(attached && !state.hidden.iter().any(|h| rendered.contains(h.as_str())))
    }

    async fn is_enabled(&self, selector: &Selector) -> Result<bool, AutomationError> {
        let state = self.state.lock().unwrap();
        let rendered = selector.to_string();
        Ok(Self::exists(&state, &rendered)
            && !state.disabled.iter().any(|d| rendered.contains(d.as_str())))
    }

    async fn text_content(&self, selector: &Selector) -> Result<Option<String>, AutomationError> {
        let mut state = self.state.lock().unwrap();
        let rendered = selector.to_string();
        if !Self::exists(&state, &rendered) {
            return Ok(None);
        }
        if rendered.contains("p-datepicker-title") {
            if state.unreadable_header_reads > 0 {
                state.unreadable_header_reads -= 1;
                return Ok(Some(String::new()));
            }
            let (year, month) = state.shown;
            return Ok(Some(format!("{} {year}", GREEK_MONTHS[month as usize - 1])));
        }
        if Self::is_option(&rendered) {
            return Ok(Self::option_index(&state, selector).map(|i| state.option_texts[i].clone()));
        }
        Ok(Some(String::new()))
    }

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        let rendered = selector.to_string();
        if !Self::exists(&state, &rendered) {
            return Err(AutomationError::ElementNotFound(rendered));
        }
        if rendered.contains("p-datepicker-next") {
            let (y, m) = state.shown;
            state.shown = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
        } else if rendered.contains("p-datepicker-prev") {
            let (y, m) = state.shown;
            state.shown = if m == 1 { (y - 1, 12) } else { (y, m - 1) };
        }
        state.actions.push(format!("click {rendered}"));
        Ok(())
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        let rendered = selector.to_string();
        if !Self::exists(&state, &rendered) {
            return Err(AutomationError::ElementNotFound(rendered));
        }
        state.actions.push(format!("fill {rendered} = {value}"));
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &Selector) -> Result<(), AutomationError> {
        if self.count(selector).await? == 0 {
            return Err(AutomationError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn attach_files(
        &self,
        trigger: &Selector,
        files: &[PathBuf],
        _timeout: Duration,
    ) -> Result<(), AutomationError> {
        self.click(trigger).await?;
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        self.state
            .lock()
            .unwrap()
            .actions
            .push(format!("attach {}", names.join(",")));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        self.state.lock().unwrap().actions.push("screenshot".into());
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn close(&self) -> Result<(), AutomationError> {
        Ok(())
    }
}

pub struct FakeBrowser {
    page: Page,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Browser for FakeBrowser {
    fn page(&self) -> Page {
        self.page.clone()
    }

    async fn close(&self) -> Result<(), AutomationError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out browsers over one shared [`FakePage`]
pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    pub launches: AtomicUsize,
    pub closed: Arc<AtomicBool>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Arc<Self> {
        Arc::new(Self {
            page: Arc::new(page),
            launches: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>, AutomationError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let driver: Arc<dyn PageDriver> = self.page.clone();
        Ok(Box::new(FakeBrowser {
            page: Page::new(driver),
            closed: self.closed.clone(),
        }))
    }
}

pub fn test_config(screenshot_dir: &Path) -> AgentConfig {
    AgentConfig {
        timings: Timings::default().without_pauses(),
        screenshot_dir: screenshot_dir.to_path_buf(),
        ..AgentConfig::default()
    }
}

pub fn fake_page(fake: &Arc<FakePage>) -> Page {
    let driver: Arc<dyn PageDriver> = fake.clone();
    Page::new(driver)
}

pub fn day_first(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Write an `.xlsx` with the required headers, the status columns and `rows`.
pub fn write_sheet(path: &Path, rows: &[[&str; 10]]) {
    use opske::ledger::{REQUIRED_COLUMNS, STATUS_COLUMNS};
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in REQUIRED_COLUMNS.iter().chain(STATUS_COLUMNS.iter()).enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(r as u32 + 1, col as u16, *value).unwrap();
            }
        }
    }
    workbook.save(path).unwrap();
}
