//! Interpreting the date cells of the spreadsheet

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};

/// Format used for the submission timestamp written back to the spreadsheet.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);
// 9999-12-31
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y",
];

/// Parse a date cell. Accepts ISO dates with an optional time part,
/// day-first dates separated by `/`, `-` or `.`, and Excel serial numbers.
/// Returns `None` for blank or unparseable text.
pub fn parse_cell_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // Drop any time part: "2026-10-18 00:00:00", "2026-10-18T00:00:00", "18/10/2026 13:45"
    let date_part = text
        .split_whitespace()
        .next()
        .map(|t| t.split('T').next().unwrap_or(t))
        .unwrap_or(text);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .or_else(|| date_part.parse::<f64>().ok().and_then(excel_serial_to_date))
}

/// Convert an Excel serial day number (1900 date system) to a date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(ChronoDuration::days(serial.trunc() as i64))
}

/// The cell's date, or `today` when the cell is blank or unparseable.
pub fn date_or_today(text: &str, today: NaiveDate) -> NaiveDate {
    parse_cell_date(text).unwrap_or(today)
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
