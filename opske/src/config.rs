//! Agent configuration
//!
//! Portal URLs, selectors, waits and browser flags carry the live portal's
//! values as defaults, so a YAML file only needs what differs. Environment
//! variables (optionally from a `.env` file) override the file.

use crate::errors::AgentError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const ENV_CHROME: &str = "OPSKE_CHROME";
pub const ENV_HEADLESS: &str = "OPSKE_HEADLESS";
pub const ENV_SCREENSHOT_DIR: &str = "OPSKE_SCREENSHOT_DIR";

/// A duration in milliseconds. Deserializes from a number of milliseconds or
/// a string such as `"500ms"`, `"1.5s"` or `"2m"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Millis(pub u64);

impl Millis {
    pub const fn from_secs(secs: u64) -> Self {
        Millis(secs * 1000)
    }

    pub fn duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Millis> for Duration {
    fn from(value: Millis) -> Self {
        value.duration()
    }
}

impl Serialize for Millis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for Millis {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(ms) => Ok(Millis(ms)),
            Raw::Text(text) => parse_duration(&text).map(Millis).map_err(de::Error::custom),
        }
    }
}

/// Parse human-readable duration strings into milliseconds
/// Supports formats like: "1s", "500ms", "2m", "1.5s", "30", "2h"
pub fn parse_duration(input: &str) -> Result<u64, String> {
    let input = input.trim();

    // Plain numbers are milliseconds
    if let Ok(ms) = input.parse::<u64>() {
        return Ok(ms);
    }

    let split_pos = input
        .char_indices()
        .find(|(_, ch)| ch.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    let (number_part, unit_part) = input.split_at(split_pos);
    if number_part.trim().is_empty() {
        return Err(format!("No numeric value in duration: {input}"));
    }
    let value: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {number_part}"))?;

    let multiplier = match unit_part {
        "ms" => 1.0,
        "s" | "sec" | "secs" | "seconds" => 1000.0,
        "m" | "min" | "mins" | "minutes" => 60_000.0,
        "h" | "hours" => 3_600_000.0,
        _ => return Err(format!("Unknown time unit: {unit_part}")),
    };
    if value < 0.0 {
        return Err(format!("Negative duration: {input}"));
    }
    Ok((value * multiplier) as u64)
}

/// Every fixed wait and timeout of the portal workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Default timeout for element operations and navigation
    pub operation_timeout: Millis,
    pub add_button_timeout: Millis,
    pub save_toast_timeout: Millis,
    pub submit_confirm_timeout: Millis,
    pub return_link_timeout: Millis,
    pub recovery_timeout: Millis,
    pub file_chooser_timeout: Millis,
    pub after_add: Millis,
    pub after_save_toast: Millis,
    pub before_submit: Millis,
    pub after_submit: Millis,
    pub after_return: Millis,
    pub calendar_poll: Millis,
    pub calendar_settle: Millis,
    pub after_day_click: Millis,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            operation_timeout: Millis::from_secs(30),
            add_button_timeout: Millis::from_secs(10),
            save_toast_timeout: Millis::from_secs(15),
            submit_confirm_timeout: Millis::from_secs(10),
            return_link_timeout: Millis::from_secs(3),
            recovery_timeout: Millis::from_secs(10),
            file_chooser_timeout: Millis::from_secs(10),
            after_add: Millis(1000),
            after_save_toast: Millis(2000),
            before_submit: Millis(500),
            after_submit: Millis(2000),
            after_return: Millis(1000),
            calendar_poll: Millis(100),
            calendar_settle: Millis(150),
            after_day_click: Millis(500),
        }
    }
}

impl Timings {
    /// All fixed pauses set to zero, keeping the timeouts. Used for fast
    /// dry runs against scripted pages.
    pub fn without_pauses(mut self) -> Self {
        self.after_add = Millis(0);
        self.after_save_toast = Millis(0);
        self.before_submit = Millis(0);
        self.after_submit = Millis(0);
        self.after_return = Millis(0);
        self.calendar_settle = Millis(0);
        self.after_day_click = Millis(0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub entry: String,
    pub username: String,
    pub password: String,
    pub submit: String,
    pub consent: String,
    pub document_list_link: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            entry: "text=Σύνδεση ΑΑΔΕ".into(),
            username: "#j_username".into(),
            password: "#j_password".into(),
            submit: "css:button >> has-text:Σύνδεση".into(),
            consent: "#btn-submit".into(),
            document_list_link: "text=Τα Δικαιολογητικά Δικαιούχου μου".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSelectors {
    pub add_button: String,
    pub party_combobox: String,
    pub document_type_combobox: String,
    pub dropdown_filter: String,
    pub option: String,
    pub project_multiselect: String,
    pub dismiss_overlay: String,
    pub comments: String,
    pub issue_date: String,
    pub expiry_date: String,
    pub file_chooser_trigger: String,
    pub save_button: String,
    pub save_toast: String,
    pub submit_button: String,
    pub submitted_marker: String,
    pub return_link: String,
    pub return_button: String,
}

impl Default for FormSelectors {
    fn default() -> Self {
        Self {
            add_button: "text=Προσθήκη".into(),
            party_combobox: "(//span[@role='combobox'])[1]".into(),
            document_type_combobox: "(//span[@role='combobox'])[2]".into(),
            dropdown_filter: "//input[contains(@class,'p-dropdown-filter')]".into(),
            option: "//li[@role='option']".into(),
            project_multiselect: "div.p-multiselect-label-container".into(),
            dismiss_overlay: "body".into(),
            comments: "#comments".into(),
            issue_date: "#issueDate".into(),
            expiry_date: "#expirationDate".into(),
            file_chooser_trigger: "text=Επιλογή Αρχείου".into(),
            save_button: "text=Αποθήκευση".into(),
            save_toast: "css:div.p-toast-detail >> has-text:Η εγγραφή αποθηκεύτηκε επιτυχώς".into(),
            submit_button: "//button[contains(., \"Υποβολή\")]".into(),
            submitted_marker: "//button[contains(., \"Υποβολή\") and @disabled]".into(),
            return_link: "a[href=\"/dashboard/invoices/supporting-document/my-supporting-document\"]"
                .into(),
            return_button: "css:button >> has-text:Επιστροφή".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSelectors {
    pub overlay: String,
    pub header: String,
    pub next: String,
    pub previous: String,
    pub day_cell: String,
}

impl Default for CalendarSelectors {
    fn default() -> Self {
        Self {
            overlay: ".p-datepicker".into(),
            header: ".p-datepicker-title".into(),
            next: ".p-datepicker-next".into(),
            previous: ".p-datepicker-prev".into(),
            day_cell: "td:not(.p-disabled):not(.p-datepicker-other-month)".into(),
        }
    }
}

/// Where the portal lives and how its pages are addressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub document_list_url: String,
    pub login: LoginSelectors,
    pub form: FormSelectors,
    pub calendar: CalendarSelectors,
    /// Leading characters of the party label typed into the dropdown filter
    pub party_filter_chars: usize,
    /// Trailing characters of the party label an option must contain
    pub party_match_chars: usize,
    /// Leading characters of the document-type code typed into the filter
    pub document_filter_chars: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.opske.gr/".into(),
            document_list_url:
                "https://app.opske.gr/dashboard/invoices/supporting-document/my-supporting-document"
                    .into(),
            login: LoginSelectors::default(),
            form: FormSelectors::default(),
            calendar: CalendarSelectors::default(),
            party_filter_chars: 6,
            party_match_chars: 3,
            document_filter_chars: 5,
        }
    }
}

/// How the browser is started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome or Chromium binary; searched on PATH when unset
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Pause before every click and fill
    pub slow_motion: Millis,
    pub window_width: u32,
    pub window_height: u32,
    pub extra_args: Vec<String>,
    pub launch_timeout: Millis,
    /// Upper bound for a single DevTools command
    pub command_timeout: Millis,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: false,
            slow_motion: Millis(300),
            window_width: 1366,
            window_height: 900,
            extra_args: Vec::new(),
            launch_timeout: Millis::from_secs(20),
            command_timeout: Millis::from_secs(30),
        }
    }
}

/// Rules a document file must satisfy before upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePolicy {
    /// Lower-case extensions including the dot
    pub allowed_extensions: Vec<String>,
    pub max_size_mb: u64,
}

impl Default for FilePolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: [".pdf", ".jpg", ".jpeg", ".png"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_size_mb: 10,
        }
    }
}

impl FilePolicy {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub portal: PortalConfig,
    pub browser: BrowserConfig,
    pub timings: Timings,
    pub files: FilePolicy,
    /// Where confirmation screenshots of submitted documents are written
    pub screenshot_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            browser: BrowserConfig::default(),
            timings: Timings::default(),
            files: FilePolicy::default(),
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }
}

impl AgentConfig {
    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        match dotenvy::dotenv() {
            Ok(p) => debug!("Loaded environment from {}", p.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(AgentError::Config(format!(".env: {e}"))),
        }

        let mut config = match path {
            Some(p) => {
                info!("Loading configuration from {}", p.display());
                let text = std::fs::read_to_string(p)
                    .map_err(|e| AgentError::Config(format!("{}: {e}", p.display())))?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, AgentError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| AgentError::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, AgentError> {
        serde_yaml::to_string(self).map_err(|e| AgentError::Config(e.to_string()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), AgentError> {
        if let Some(chrome) = var(ENV_CHROME).filter(|v| !v.trim().is_empty()) {
            self.browser.executable = Some(PathBuf::from(chrome));
        }
        if let Some(headless) = var(ENV_HEADLESS) {
            self.browser.headless = match headless.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(AgentError::Config(format!(
                        "{ENV_HEADLESS} must be true or false, got '{other}'"
                    )))
                }
            };
        }
        if let Some(dir) = var(ENV_SCREENSHOT_DIR).filter(|v| !v.trim().is_empty()) {
            self.screenshot_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}
