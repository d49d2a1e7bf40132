//! The spreadsheet as the run's ledger
//!
//! Rows describe documents to upload; three status columns record what a
//! previous run already achieved. The whole sheet is held as text, updated in
//! memory as items succeed, and written back once at the end of the run.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDateTime;
use rust_xlsxwriter::{Format, Workbook};
use tracing::{debug, info, warn};

use crate::dates::{format_timestamp, parse_cell_date};
use crate::errors::AgentError;
use crate::types::{OutcomeReason, RunMode, RunOutcome};

pub const COL_PARTY: &str = "Επωνυμία – ΑΦΜ";
pub const COL_PROJECT: &str = "Κωδικός έργου";
pub const COL_DOCUMENT_TYPE: &str = "Κωδικός Δικαιολογητικού";
pub const COL_FILE_NAME: &str = "Όνομα αρχείου";
pub const COL_ISSUE_DATE: &str = "Ημερομηνία έκδοσης δικαιολογητικού";
pub const COL_EXPIRY_DATE: &str = "Ημερομηνία λήξης δικαιολογητικού";
pub const COL_NOTE: &str = "Παρατηρήσεις ΟΠΣΚΕ";
pub const COL_SAVED: &str = "Αποθήκευση";
pub const COL_SUBMITTED: &str = "Υποβολή";
pub const COL_TIMESTAMP: &str = "Ημ/νία & ώρα υποβολής";

pub const REQUIRED_COLUMNS: [&str; 7] = [
    COL_PARTY,
    COL_PROJECT,
    COL_DOCUMENT_TYPE,
    COL_FILE_NAME,
    COL_ISSUE_DATE,
    COL_EXPIRY_DATE,
    COL_NOTE,
];

pub const STATUS_COLUMNS: [&str; 3] = [COL_SAVED, COL_SUBMITTED, COL_TIMESTAMP];

const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Header comparison ignores case, surrounding blanks, repeated blanks and
/// the kind of dash.
fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(['–', '—', '‐'], "-")
        .to_lowercase()
}

/// Spreadsheet column letter for a zero-based index: 0 → A, 26 → AA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(true) => "TRUE".to_string(),
        Data::Bool(false) => "FALSE".to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

/// Tri-state flag cell: TRUE, FALSE, or unset. Anything else counts as unset.
fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_uppercase().as_str() {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

fn flag_text(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// A worksheet held as text
///
/// Column indices are absolute: a table starting in column C has two blank
/// leading headers. Rows are relative to the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTable {
    pub sheet_name: String,
    /// Zero-based sheet row of the headers
    pub header_row: u32,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            header_row: 0,
            headers,
            rows,
        }
    }

    /// Read the first worksheet of an `.xlsx`, `.xlsm`, `.xls` or `.ods` file.
    pub fn read(path: &Path) -> Result<Self, AgentError> {
        let read_err = |e: String| AgentError::SpreadsheetRead(format!("{}: {e}", path.display()));
        let mut workbook = open_workbook_auto(path).map_err(|e| read_err(e.to_string()))?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| read_err("workbook has no sheets".into()))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| read_err(e.to_string()))?;

        // The range begins at the first used cell, not at A1
        let (header_row, first_col) = range.start().unwrap_or((0, 0));
        let padded = |cells: Vec<String>| -> Vec<String> {
            std::iter::repeat(String::new())
                .take(first_col as usize)
                .chain(cells)
                .collect()
        };

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|r| padded(r.iter().map(|c| cell_text(c).trim().to_string()).collect()))
            .unwrap_or_default();
        let rows: Vec<Vec<String>> = rows
            .map(|r| padded(r.iter().map(cell_text).collect()))
            .collect();
        debug!(
            sheet = %sheet_name,
            header_row,
            first_col,
            columns = headers.len(),
            rows = rows.len(),
            "Read {}",
            path.display()
        );
        Ok(Self {
            sheet_name,
            header_row,
            headers,
            rows,
        })
    }

    /// Write the table as `.xlsx`, every cell as a string.
    pub fn write(&self, path: &Path) -> Result<(), AgentError> {
        let write_err =
            |e: rust_xlsxwriter::XlsxError| AgentError::SpreadsheetWrite(format!("{}: {e}", path.display()));
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name).map_err(write_err)?;

        for (col, header) in self.headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            worksheet
                .write_string_with_format(self.header_row, col as u16, header, &header_format)
                .map_err(write_err)?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                worksheet
                    .write_string(self.header_row + 1 + r as u32, col as u16, value)
                    .map_err(write_err)?;
            }
        }
        workbook.save(path).map_err(write_err)?;
        Ok(())
    }

    /// Index of the column whose header matches `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = normalize_header(name);
        self.headers
            .iter()
            .position(|h| normalize_header(h) == wanted)
    }

    /// Append an empty column named `name` unless one already matches.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column(name) {
            return index;
        }
        self.headers.push(name.to_string());
        self.headers.len() - 1
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value.into();
        }
    }
}

/// The named fields of a document row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Party,
    Project,
    DocumentType,
    FileName,
    IssueDate,
    ExpiryDate,
    Note,
    Saved,
    Submitted,
    Timestamp,
}

/// Where each field lives in the sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    headers: Vec<String>,
    party: usize,
    project: usize,
    document_type: usize,
    file_name: usize,
    issue_date: usize,
    expiry_date: usize,
    note: usize,
    saved: usize,
    submitted: usize,
    timestamp: usize,
}

impl ColumnMap {
    /// Requires every column in [`REQUIRED_COLUMNS`]; adds the status
    /// columns when absent.
    fn resolve(table: &mut SheetTable) -> Result<Self, AgentError> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| table.column(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::Schema(missing));
        }
        let col = |table: &SheetTable, name: &str| table.column(name).unwrap_or_default();
        let saved = table.ensure_column(COL_SAVED);
        let submitted = table.ensure_column(COL_SUBMITTED);
        let timestamp = table.ensure_column(COL_TIMESTAMP);
        Ok(Self {
            headers: table.headers.clone(),
            party: col(table, COL_PARTY),
            project: col(table, COL_PROJECT),
            document_type: col(table, COL_DOCUMENT_TYPE),
            file_name: col(table, COL_FILE_NAME),
            issue_date: col(table, COL_ISSUE_DATE),
            expiry_date: col(table, COL_EXPIRY_DATE),
            note: col(table, COL_NOTE),
            saved,
            submitted,
            timestamp,
        })
    }

    pub fn index(&self, field: Field) -> usize {
        match field {
            Field::Party => self.party,
            Field::Project => self.project,
            Field::DocumentType => self.document_type,
            Field::FileName => self.file_name,
            Field::IssueDate => self.issue_date,
            Field::ExpiryDate => self.expiry_date,
            Field::Note => self.note,
            Field::Saved => self.saved,
            Field::Submitted => self.submitted,
            Field::Timestamp => self.timestamp,
        }
    }

    /// Column letter and header as shown to the operator, e.g. `"A (Επωνυμία – ΑΦΜ)"`.
    pub fn label(&self, field: Field) -> String {
        let index = self.index(field);
        let header = self.headers.get(index).map(String::as_str).unwrap_or("");
        format!("{} ({header})", column_letter(index))
    }
}

/// One document row, with its cell values as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    /// Zero-based index into the data rows
    pub row_key: usize,
    /// Zero-based sheet row of the headers
    pub header_row: usize,
    pub party_label: String,
    pub project_code: String,
    pub document_type_code: String,
    pub file_base_name: String,
    pub issue_date: String,
    pub expiry_date: String,
    pub note: String,
    pub saved: Option<bool>,
    pub submitted: Option<bool>,
    pub submission_timestamp: String,
}

impl DocumentRow {
    /// 1-based row number in the sheet.
    pub fn sheet_row(&self) -> usize {
        self.header_row + self.row_key + 2
    }

    pub fn parsed_issue_date(&self) -> Option<chrono::NaiveDate> {
        parse_cell_date(&self.issue_date)
    }

    pub fn parsed_expiry_date(&self) -> Option<chrono::NaiveDate> {
        parse_cell_date(&self.expiry_date)
    }

    fn is_submitted(&self) -> bool {
        self.submitted == Some(true)
    }

    fn is_saved(&self) -> bool {
        self.saved == Some(true)
    }
}

/// Rows a run has to process, and the ones earlier runs already finished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSet {
    pub items: Vec<DocumentRow>,
    pub pre_completed: Vec<RunOutcome>,
    /// Set when every row was already done
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    source: PathBuf,
    table: SheetTable,
    columns: ColumnMap,
}

impl Ledger {
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let table = SheetTable::read(path)?;
        Self::from_table(path, table)
    }

    pub fn from_table(path: &Path, mut table: SheetTable) -> Result<Self, AgentError> {
        let columns = ColumnMap::resolve(&mut table)?;
        Ok(Self {
            source: path.to_path_buf(),
            table,
            columns,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn table(&self) -> &SheetTable {
        &self.table
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    fn row_at(&self, row_key: usize) -> DocumentRow {
        let text = |field: Field| {
            self.table
                .cell(row_key, self.columns.index(field))
                .to_string()
        };
        DocumentRow {
            row_key,
            header_row: self.table.header_row as usize,
            party_label: text(Field::Party).trim().to_string(),
            project_code: text(Field::Project).trim().to_string(),
            document_type_code: text(Field::DocumentType).trim().to_string(),
            file_base_name: text(Field::FileName).trim().to_string(),
            issue_date: text(Field::IssueDate),
            expiry_date: text(Field::ExpiryDate),
            note: text(Field::Note),
            saved: parse_flag(&text(Field::Saved)),
            submitted: parse_flag(&text(Field::Submitted)),
            submission_timestamp: text(Field::Timestamp),
        }
    }

    /// Document rows in sheet order. Rows with a blank file name are skipped.
    pub fn rows(&self) -> Vec<DocumentRow> {
        (0..self.table.rows.len())
            .map(|key| self.row_at(key))
            .filter(|row| {
                if row.file_base_name.is_empty() {
                    debug!("Row {} has no file name, ignoring", row.sheet_row());
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    pub fn compute_work_set(&self, mode: RunMode) -> WorkSet {
        let mut set = WorkSet::default();
        for row in self.rows() {
            if row.is_submitted() {
                set.pre_completed.push(RunOutcome::skipped(
                    row.file_base_name.clone(),
                    OutcomeReason::AlreadySubmitted,
                ));
            } else if row.is_saved() && !mode.submits() {
                set.pre_completed.push(RunOutcome::skipped(
                    row.file_base_name.clone(),
                    OutcomeReason::AlreadySaved,
                ));
            } else {
                set.items.push(row);
            }
        }
        if set.items.is_empty() {
            set.pre_completed.clear();
            set.summary = Some(match mode {
                RunMode::Submit => "All documents have already been submitted".to_string(),
                RunMode::Save => "All documents have already been saved or submitted".to_string(),
            });
        }
        info!(
            %mode,
            pending = set.items.len(),
            done = set.pre_completed.len(),
            "Computed work set"
        );
        set
    }

    /// Mark a row saved (and possibly submitted) at `at`.
    pub fn record_outcome(&mut self, row_key: usize, submitted: bool, at: NaiveDateTime) {
        let saved_col = self.columns.index(Field::Saved);
        let submitted_col = self.columns.index(Field::Submitted);
        let timestamp_col = self.columns.index(Field::Timestamp);
        self.table.set_cell(row_key, saved_col, flag_text(true));
        self.table
            .set_cell(row_key, submitted_col, flag_text(submitted));
        self.table
            .set_cell(row_key, timestamp_col, format_timestamp(at));
    }

    /// Path the ledger is written to: the source, or its `.xlsx` sibling for
    /// formats that cannot be written.
    pub fn output_path(&self) -> PathBuf {
        let is_xlsx = self
            .source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
        if is_xlsx {
            self.source.clone()
        } else {
            self.source.with_extension("xlsx")
        }
    }

    /// Write the whole table back. Returns the path written.
    pub fn persist(&self) -> Result<PathBuf, AgentError> {
        let target = self.output_path();
        if target != self.source {
            warn!(
                "{} cannot be written in its own format, saving to {}",
                self.source.display(),
                target.display()
            );
        }
        self.table.write(&target)?;
        info!("Spreadsheet saved to {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn headers() -> Vec<String> {
        REQUIRED_COLUMNS.iter().map(|s| s.to_string()).collect()
    }

    fn row(name: &str, saved: &str, submitted: &str) -> Vec<String> {
        vec![
            "ΑΛΦΑ Α.Ε. - 094014201".into(),
            "ΕΡΓ-12".into(),
            "01.02".into(),
            name.into(),
            "2025-01-10".into(),
            "2030-01-10".into(),
            "".into(),
            saved.into(),
            submitted.into(),
            "".into(),
        ]
    }

    fn ledger(rows: Vec<Vec<String>>) -> Ledger {
        let mut headers = headers();
        headers.extend(STATUS_COLUMNS.iter().map(|s| s.to_string()));
        Ledger::from_table(Path::new("docs.xlsx"), SheetTable::new(headers, rows)).unwrap()
    }

    fn names(outcomes: &[RunOutcome]) -> Vec<(&str, Option<&OutcomeReason>)> {
        outcomes
            .iter()
            .map(|o| (o.name.as_str(), o.reason.as_ref()))
            .collect()
    }

    #[test]
    fn missing_columns_are_all_reported() {
        let table = SheetTable::new(
            vec![COL_PARTY.into(), COL_FILE_NAME.into(), COL_NOTE.into()],
            vec![],
        );
        match Ledger::from_table(Path::new("x.xlsx"), table) {
            Err(AgentError::Schema(missing)) => assert_eq!(
                missing,
                vec![COL_PROJECT, COL_DOCUMENT_TYPE, COL_ISSUE_DATE, COL_EXPIRY_DATE]
            ),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn status_columns_are_added_and_headers_match_loosely() {
        let mut hdrs = headers();
        hdrs[0] = "  επωνυμία - αφμ ".into();
        let ledger = Ledger::from_table(Path::new("x.xlsx"), SheetTable::new(hdrs, vec![])).unwrap();
        assert_eq!(ledger.table().headers.len(), 10);
        assert_eq!(ledger.columns().index(Field::Party), 0);
        assert_eq!(ledger.columns().index(Field::Timestamp), 9);
        assert_eq!(ledger.columns().label(Field::Saved), "H (Αποθήκευση)");
    }

    #[test]
    fn submitted_rows_are_skipped_in_both_modes() {
        let ledger = ledger(vec![row("A", "TRUE", "TRUE"), row("B", "", "")]);
        for mode in [RunMode::Save, RunMode::Submit] {
            let set = ledger.compute_work_set(mode);
            assert_eq!(
                names(&set.pre_completed),
                vec![("A", Some(&OutcomeReason::AlreadySubmitted))]
            );
            assert_eq!(set.items.len(), 1);
            assert_eq!(set.items[0].file_base_name, "B");
        }
    }

    #[test]
    fn saved_rows_are_skipped_only_when_not_submitting() {
        let ledger = ledger(vec![row("A", "TRUE", "FALSE"), row("B", "", "")]);

        let save = ledger.compute_work_set(RunMode::Save);
        assert_eq!(
            names(&save.pre_completed),
            vec![("A", Some(&OutcomeReason::AlreadySaved))]
        );
        assert_eq!(save.items.len(), 1);

        let submit = ledger.compute_work_set(RunMode::Submit);
        assert!(submit.pre_completed.is_empty());
        let pending: Vec<_> = submit.items.iter().map(|r| r.file_base_name.as_str()).collect();
        assert_eq!(pending, vec!["A", "B"]);
    }

    #[test]
    fn all_done_yields_a_summary_instead_of_entries() {
        let ledger = ledger(vec![row("A", "TRUE", "TRUE"), row("B", "TRUE", "FALSE")]);
        let save = ledger.compute_work_set(RunMode::Save);
        assert!(save.items.is_empty());
        assert!(save.pre_completed.is_empty());
        assert_eq!(
            save.summary.as_deref(),
            Some("All documents have already been saved or submitted")
        );
        // B still needs submitting
        assert_eq!(ledger.compute_work_set(RunMode::Submit).items.len(), 1);
    }

    #[test]
    fn blank_file_names_are_ignored() {
        let ledger = ledger(vec![row("", "", ""), row("B", "", "")]);
        let rows = ledger.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sheet_row(), 3);
    }

    #[test]
    fn record_outcome_sets_flags_and_timestamp() {
        let mut ledger = ledger(vec![row("A", "", "")]);
        let at = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        ledger.record_outcome(0, false, at);
        let row = &ledger.rows()[0];
        assert_eq!(row.saved, Some(true));
        assert_eq!(row.submitted, Some(false));
        assert_eq!(row.submission_timestamp, "18/10/2026 14:30:00");
    }

    #[test]
    fn legacy_xls_is_written_as_xlsx() {
        let table = SheetTable::new(headers(), vec![]);
        let ledger = Ledger::from_table(Path::new("/data/docs.xls"), table).unwrap();
        assert_eq!(ledger.output_path(), PathBuf::from("/data/docs.xlsx"));
    }

    #[test]
    fn only_true_and_false_are_flags() {
        assert_eq!(parse_flag(" true "), Some(true));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("1"), None);
        assert_eq!(parse_flag("0"), None);
        assert_eq!(parse_flag("ναι"), None);
    }

    #[test]
    fn stray_one_in_the_submitted_column_does_not_skip_the_row() {
        let ledger = ledger(vec![row("A", "1", "1")]);
        let set = ledger.compute_work_set(RunMode::Save);
        assert!(set.pre_completed.is_empty());
        assert_eq!(set.items.len(), 1);
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn native_cells_become_text() {
        assert_eq!(cell_text(&Data::Float(94014201.0)), "94014201");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Bool(true)), "TRUE");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
