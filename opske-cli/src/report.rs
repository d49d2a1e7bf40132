use colored::Colorize;
use opske::validator::{FileStatus, PrecheckReport};
use opske::{ProgressEvent, RunOutcome, RunSummary};

pub fn print_precheck(report: &PrecheckReport) {
    println!("{}", "Precheck".bold());
    for issue in &report.structural {
        println!("  {} {issue}", "✗".red());
    }
    for check in &report.files {
        match &check.status {
            FileStatus::Ok(path) => {
                println!("  {} {} → {}", "✓".green(), check.name, path.display())
            }
            FileStatus::Invalid { reason, .. } => {
                println!("  {} {}: {reason}", "!".yellow(), check.name)
            }
            FileStatus::Missing => println!("  {} {}: file not found", "!".yellow(), check.name),
        }
    }
    let summary = report.summary();
    if report.passed() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red().bold());
    }
}

fn outcome_line(outcome: &RunOutcome) -> String {
    let text = outcome.to_string();
    if outcome.is_failure() {
        format!("{} {}", "✗".red(), text.red())
    } else if outcome.is_skip() {
        format!("{} {}", "–".dimmed(), text.dimmed())
    } else {
        format!("{} {text}", "✓".green())
    }
}

pub fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::ItemStarted {
            name,
            position,
            total,
        } => println!("{} {name}", format!("[{position}/{total}]").cyan()),
        ProgressEvent::ItemProgress { .. } => {}
        ProgressEvent::ItemDone {
            outcome,
            position,
            total,
        } => println!("{} {}", format!("[{position}/{total}]").cyan(), outcome_line(outcome)),
        ProgressEvent::RunDone(_) => {}
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    if let Some(info) = &summary.info {
        println!("{}", info.green());
        return;
    }
    println!(
        "{}: {} ok, {} failed, {} skipped",
        "Done".bold(),
        summary.succeeded().count().to_string().green(),
        summary.failures().count().to_string().red(),
        summary.skipped().count()
    );
    for outcome in summary.skipped().chain(summary.failures()) {
        println!("  {}", outcome_line(outcome));
    }
    if let Some(path) = &summary.persisted_to {
        println!("Spreadsheet updated: {}", path.display());
    }
    if let Some(error) = &summary.persist_error {
        println!("{} {}", "Spreadsheet NOT updated:".red().bold(), error.red());
        println!("Record the results above by hand before the next run.");
    }
}
