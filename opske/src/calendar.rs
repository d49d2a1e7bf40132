//! Driving the portal's date-picker overlay
//!
//! The picker only offers month-by-month navigation, so selecting a date means
//! reading the header, stepping towards the target month one click at a time
//! and finally clicking the day cell.

use std::cmp::Ordering;

use chrono::{Local, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::config::{CalendarSelectors, Timings};
use crate::errors::{AgentError, AutomationError};
use crate::page::Page;
use crate::selector::Selector;

const YEARS_BACK: u32 = 100;
const YEARS_AHEAD: u32 = 10;
// Enough for the whole selectable range plus slack
const MAX_NAVIGATION_CLICKS: u32 = (YEARS_BACK + YEARS_AHEAD + 2) * 12;

static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L}+)\W*(\d{4})").expect("calendar header pattern"));

// (month, names), compared after lower-casing and stripping Greek accents
const MONTH_NAMES: [(u32, &[&str]); 12] = [
    (1, &["ιανουαριος", "ιανουαριου", "january", "jan"]),
    (2, &["φεβρουαριος", "φεβρουαριου", "february", "feb"]),
    (3, &["μαρτιος", "μαρτιου", "march", "mar"]),
    (4, &["απριλιος", "απριλιου", "april", "apr"]),
    (5, &["μαιος", "μαιου", "may"]),
    (6, &["ιουνιος", "ιουνιου", "june", "jun"]),
    (7, &["ιουλιος", "ιουλιου", "july", "jul"]),
    (8, &["αυγουστος", "αυγουστου", "august", "aug"]),
    (9, &["σεπτεμβριος", "σεπτεμβριου", "september", "sep", "sept"]),
    (10, &["οκτωβριος", "οκτωβριου", "october", "oct"]),
    (11, &["νοεμβριος", "νοεμβριου", "november", "nov"]),
    (12, &["δεκεμβριος", "δεκεμβριου", "december", "dec"]),
];

fn fold(word: &str) -> String {
    word.to_lowercase()
        .chars()
        .map(|c| match c {
            'ά' => 'α',
            'έ' => 'ε',
            'ή' => 'η',
            'ί' | 'ϊ' | 'ΐ' => 'ι',
            'ό' => 'ο',
            'ύ' | 'ϋ' | 'ΰ' => 'υ',
            'ώ' => 'ω',
            other => other,
        })
        .collect()
}

/// Month number for a Greek (nominative or genitive) or English month name.
pub fn month_from_name(name: &str) -> Option<u32> {
    let folded = fold(name);
    MONTH_NAMES
        .iter()
        .find(|(_, names)| names.contains(&folded.as_str()))
        .map(|(month, _)| *month)
}

/// Parse a picker header such as `"Οκτώβριος 2026"` into (month, year).
pub fn parse_header(text: &str) -> Option<(u32, i32)> {
    HEADER.captures_iter(text).find_map(|caps| {
        let month = month_from_name(caps.get(1)?.as_str())?;
        let year = caps.get(2)?.as_str().parse().ok()?;
        Some((month, year))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarState {
    WaitingForCalendar,
    ReadingHeader,
    Navigating(Direction),
    TargetMonthReached,
    DaySelected,
}

/// Clicks issued while selecting a date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarReport {
    pub next_clicks: u32,
    pub prev_clicks: u32,
}

pub struct CalendarPicker<'a> {
    page: &'a Page,
    selectors: &'a CalendarSelectors,
    timings: &'a Timings,
}

impl<'a> CalendarPicker<'a> {
    pub fn new(page: &'a Page, selectors: &'a CalendarSelectors, timings: &'a Timings) -> Self {
        Self {
            page,
            selectors,
            timings,
        }
    }

    /// Select `day/month/year` in the open picker.
    pub async fn select_date(&self, day: u32, month: u32, year: i32) -> Result<CalendarReport, AgentError> {
        self.select_date_from(day, month, year, Local::now().date_naive())
            .await
    }

    /// As [`select_date`](Self::select_date), with the selectable range
    /// anchored on `today`.
    pub async fn select_date_from(
        &self,
        day: u32,
        month: u32,
        year: i32,
        today: NaiveDate,
    ) -> Result<CalendarReport, AgentError> {
        let label = format!("{day:02}/{month:02}/{year}");
        let target = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AgentError::OutOfRange(label.clone()))?;
        let earliest = today.checked_sub_months(Months::new(YEARS_BACK * 12));
        let latest = today.checked_add_months(Months::new(YEARS_AHEAD * 12));
        if earliest.map_or(true, |e| target < e) || latest.map_or(true, |l| target > l) {
            return Err(AgentError::OutOfRange(label));
        }

        let mut state = CalendarState::WaitingForCalendar;
        let mut enter = |next: CalendarState| {
            trace!(from = ?state, to = ?next, "calendar");
            state = next;
        };
        // Always the topmost picker
        let overlay = self.page.locator(self.selectors.overlay.as_str()).visible().last();
        overlay.wait(None).await?;

        let mut report = CalendarReport::default();
        let poll = self.timings.calendar_poll.duration();
        let settle = self.timings.calendar_settle.duration();
        let mut unreadable_since: Option<Instant> = None;

        loop {
            enter(CalendarState::ReadingHeader);
            let header = overlay
                .locator(self.selectors.header.as_str())
                .first()
                .text_content()
                .await?;
            let Some((shown_month, shown_year)) = header.as_deref().and_then(parse_header) else {
                let since = *unreadable_since.get_or_insert_with(Instant::now);
                let timeout = self.timings.operation_timeout.duration();
                if since.elapsed() >= timeout {
                    return Err(AutomationError::Timeout(format!(
                        "calendar header {header:?} unreadable for {timeout:?}"
                    ))
                    .into());
                }
                tokio::time::sleep(poll).await;
                continue;
            };
            unreadable_since = None;

            let direction = match (shown_year, shown_month).cmp(&(year, month)) {
                Ordering::Equal => break,
                Ordering::Less => Direction::Next,
                Ordering::Greater => Direction::Previous,
            };
            if report.next_clicks + report.prev_clicks >= MAX_NAVIGATION_CLICKS {
                return Err(AutomationError::Internal(format!(
                    "calendar still shows {shown_month:02}/{shown_year} after {MAX_NAVIGATION_CLICKS} clicks"
                ))
                .into());
            }
            enter(CalendarState::Navigating(direction));
            let button = match direction {
                Direction::Next => {
                    report.next_clicks += 1;
                    self.selectors.next.as_str()
                }
                Direction::Previous => {
                    report.prev_clicks += 1;
                    self.selectors.previous.as_str()
                }
            };
            overlay.locator(button).first().click(None).await?;
            tokio::time::sleep(settle).await;
        }

        enter(CalendarState::TargetMonthReached);
        debug!(?report, "target month reached");
        let day_cell = overlay
            .locator(self.selectors.day_cell.as_str())
            .locator(Selector::ExactText(day.to_string()))
            .first();
        if day_cell.count().await? == 0 {
            return Err(AgentError::DayNotFound(label));
        }
        day_cell.click(None).await?;
        tokio::time::sleep(self.timings.after_day_click.duration()).await;

        enter(CalendarState::DaySelected);
        info!(date = %label, next = report.next_clicks, prev = report.prev_clicks, "Date selected");
        Ok(report)
    }
}
