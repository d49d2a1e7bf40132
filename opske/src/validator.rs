//! Row and file checks, and the combined precheck report

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::afm::{split_party_label, validate_afm};
use crate::config::FilePolicy;
use crate::errors::AgentError;
use crate::ledger::{ColumnMap, DocumentRow, Field, Ledger};

static PROJECT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9α-ωά-ώΑ-ΩΆ-Ώ]+-\d+$").expect("project code pattern")
});
static DOCUMENT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}\.\d{2}$").expect("document code pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIssueKind {
    PartyFormat,
    InvalidAfm,
    ProjectCode,
    DocumentCode,
    IssueDateInvalid,
    IssueDateInFuture,
    ExpiryDateInvalid,
    ExpiryDateInPast,
}

/// One failed structural rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub file_name: String,
    /// 1-based sheet row, header = 1
    pub sheet_row: usize,
    /// Column letter and header
    pub column: String,
    pub kind: RowIssueKind,
    pub message: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} ({}), column {}: {}",
            self.sheet_row, self.file_name, self.column, self.message
        )
    }
}

/// Check every structural rule of `row` against `today`.
pub fn check_row(row: &DocumentRow, columns: &ColumnMap, today: NaiveDate) -> Vec<RowIssue> {
    let mut issues = Vec::new();
    let mut push = |field: Field, kind: RowIssueKind, message: String| {
        issues.push(RowIssue {
            file_name: row.file_base_name.clone(),
            sheet_row: row.sheet_row(),
            column: columns.label(field),
            kind,
            message,
        })
    };

    match split_party_label(&row.party_label) {
        None => push(
            Field::Party,
            RowIssueKind::PartyFormat,
            format!(
                "'{}' is not in the form '<name> - <9 digits>'",
                row.party_label
            ),
        ),
        Some((_, afm)) if !validate_afm(afm) => push(
            Field::Party,
            RowIssueKind::InvalidAfm,
            format!("tax id {afm} fails the check digit"),
        ),
        Some(_) => {}
    }

    if !PROJECT_CODE.is_match(&row.project_code) {
        push(
            Field::Project,
            RowIssueKind::ProjectCode,
            format!("project code '{}' is not '<code>-<number>'", row.project_code),
        );
    }

    if !DOCUMENT_CODE.is_match(&row.document_type_code) {
        push(
            Field::DocumentType,
            RowIssueKind::DocumentCode,
            format!(
                "document code '{}' is not in the form NN.NN",
                row.document_type_code
            ),
        );
    }

    match row.parsed_issue_date() {
        None => push(
            Field::IssueDate,
            RowIssueKind::IssueDateInvalid,
            format!("issue date '{}' is not a date", row.issue_date.trim()),
        ),
        Some(issued) if issued > today => push(
            Field::IssueDate,
            RowIssueKind::IssueDateInFuture,
            format!("issue date {} is in the future", issued.format("%d/%m/%Y")),
        ),
        Some(_) => {}
    }

    match row.parsed_expiry_date() {
        None => push(
            Field::ExpiryDate,
            RowIssueKind::ExpiryDateInvalid,
            format!("expiry date '{}' is not a date", row.expiry_date.trim()),
        ),
        Some(expires) if expires < today => push(
            Field::ExpiryDate,
            RowIssueKind::ExpiryDateInPast,
            format!("expiry date {} has passed", expires.format("%d/%m/%Y")),
        ),
        Some(_) => {}
    }

    issues
}

/// Outcome of a single file check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub reason: Option<String>,
}

impl ValidationVerdict {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Extension and size rules for a resolved document file.
pub fn check_file(path: &Path, policy: &FilePolicy) -> ValidationVerdict {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    if !policy
        .allowed_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    {
        return ValidationVerdict::fail(format!(
            "extension '{extension}' is not one of {}",
            policy.allowed_extensions.join(", ")
        ));
    }
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => return ValidationVerdict::fail(format!("cannot read file: {e}")),
    };
    if size > policy.max_size_bytes() {
        return ValidationVerdict::fail(format!(
            "{:.1} MB exceeds the {} MB limit",
            size as f64 / (1024.0 * 1024.0),
            policy.max_size_mb
        ));
    }
    ValidationVerdict::pass()
}

/// Find the file in `folder` whose name without extension equals `base_name`.
/// The first match in name order wins.
pub fn resolve_document(folder: &Path, base_name: &str) -> std::io::Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.file_stem().and_then(|s| s.to_str()) == Some(base_name))
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Ok(PathBuf),
    Invalid { path: PathBuf, reason: String },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub name: String,
    pub status: FileStatus,
}

/// Result of checking the whole spreadsheet and folder before a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecheckReport {
    pub structural: Vec<RowIssue>,
    pub files: Vec<FileCheck>,
}

impl PrecheckReport {
    pub fn ok_files(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Ok(_)))
            .count()
    }

    pub fn file_problems(&self) -> usize {
        self.files.len() - self.ok_files()
    }

    /// No structural issue anywhere and at least one usable file.
    pub fn passed(&self) -> bool {
        self.structural.is_empty() && self.ok_files() > 0
    }

    pub fn summary(&self) -> String {
        if !self.structural.is_empty() {
            return format!(
                "{} spreadsheet problem(s) must be fixed before uploading",
                self.structural.len()
            );
        }
        match (self.ok_files(), self.file_problems()) {
            (0, _) => "No valid document file was found".to_string(),
            (ok, 0) => format!("All {ok} document(s) are ready"),
            (ok, problems) => format!(
                "{ok} document(s) ready and {problems} problem(s); only the ready ones will be processed"
            ),
        }
    }
}

/// Run the structural check over every row and the file check over every
/// referenced file.
pub fn precheck(
    ledger: &Ledger,
    folder: &Path,
    policy: &FilePolicy,
    today: NaiveDate,
) -> Result<PrecheckReport, AgentError> {
    if !folder.is_dir() {
        return Err(AgentError::Config(format!(
            "document folder {} does not exist",
            folder.display()
        )));
    }
    let mut report = PrecheckReport {
        structural: Vec::new(),
        files: Vec::new(),
    };
    for row in ledger.rows() {
        report
            .structural
            .extend(check_row(&row, ledger.columns(), today));

        let status = match resolve_document(folder, &row.file_base_name)? {
            None => FileStatus::Missing,
            Some(path) => {
                let verdict = check_file(&path, policy);
                match verdict.reason {
                    None => FileStatus::Ok(path),
                    Some(reason) => FileStatus::Invalid { path, reason },
                }
            }
        };
        debug!(name = %row.file_base_name, ?status, "file check");
        report.files.push(FileCheck {
            name: row.file_base_name,
            status,
        });
    }
    info!(
        structural = report.structural.len(),
        ok = report.ok_files(),
        problems = report.file_problems(),
        "Precheck finished"
    );
    Ok(report)
}
