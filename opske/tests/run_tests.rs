mod common;

use std::path::Path;
use std::time::Duration;

use chrono::{Duration as Days, Local, NaiveDate};
use common::{day_first, init_tracing, test_config, write_sheet, FakeLauncher, FakePage};
use opske::validator::precheck;
use opske::{
    AgentError, ChannelProgress, Credentials, Ledger, Orchestrator, OutcomeReason, PauseGate,
    ProgressEvent, RunContext, RunMode, RunRequest, TracingProgress,
};

struct Fixture {
    dir: tempfile::TempDir,
    request: RunRequest,
}

fn dates() -> (String, String) {
    let today = Local::now().date_naive();
    (day_first(today - Days::days(30)), day_first(today + Days::days(365)))
}

/// Sheet with rows A, B, C. C was submitted by an earlier run. Only B's
/// document is present in the folder (C's too, it is never opened).
fn fixture(extra_rows: &[[&str; 10]]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("docs");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("B.pdf"), b"%PDF-1.4 B").unwrap();
    std::fs::write(folder.join("C.pdf"), b"%PDF-1.4 C").unwrap();

    let (issued, expires) = dates();
    let party = "ΑΛΦΑ Α.Ε. - 094014201";
    let mut rows = vec![
        [party, "ΕΡΓ-12", "01.02", "C", issued.as_str(), expires.as_str(), "", "TRUE", "TRUE", "01/02/2026 10:00:00"],
        [party, "ΕΡΓ-12", "01.02", "A", issued.as_str(), expires.as_str(), "", "", "", ""],
        [party, "ΕΡΓ-12", "01.02", "B", issued.as_str(), expires.as_str(), "σημείωση", "", "", ""],
    ];
    rows.extend_from_slice(extra_rows);
    let spreadsheet = dir.path().join("ledger.xlsx");
    write_sheet(&spreadsheet, &rows);

    Fixture {
        request: RunRequest {
            spreadsheet,
            folder,
        },
        dir,
    }
}

fn checked_context(request: &RunRequest, mode: RunMode) -> RunContext {
    let ledger = Ledger::load(&request.spreadsheet).unwrap();
    let report = precheck(
        &ledger,
        &request.folder,
        &opske::FilePolicy::default(),
        Local::now().date_naive(),
    )
    .unwrap();
    assert!(report.passed(), "precheck should pass: {}", report.summary());
    let mut ctx = RunContext::new(mode, PauseGate::new());
    ctx.record_precheck(&report);
    ctx
}

fn creds() -> Credentials {
    Credentials::new("user", "pass")
}

fn row_status(path: &Path, name: &str) -> (Option<bool>, Option<bool>, String) {
    let ledger = Ledger::load(path).unwrap();
    let row = ledger
        .rows()
        .into_iter()
        .find(|r| r.file_base_name == name)
        .unwrap();
    (row.saved, row.submitted, row.submission_timestamp)
}

#[tokio::test(start_paused = true)]
async fn missing_file_fails_its_row_and_the_rest_is_saved() {
    init_tracing();
    let fx = fixture(&[]);
    let launcher = FakeLauncher::new(FakePage::new());
    let orchestrator = Orchestrator::new(test_config(&fx.dir.path().join("shots")), launcher.clone());
    let ctx = checked_context(&fx.request, RunMode::Save);

    let summary = orchestrator
        .run(&fx.request, &ctx, &creds(), &TracingProgress)
        .await
        .unwrap();

    let outcomes: Vec<(&str, bool, Option<&OutcomeReason>)> = summary
        .outcomes
        .iter()
        .map(|o| (o.name.as_str(), o.success, o.reason.as_ref()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("C", false, Some(&OutcomeReason::AlreadySubmitted)),
            ("A", false, Some(&OutcomeReason::FileNotFound)),
            ("B", true, None),
        ]
    );
    assert_eq!(summary.failures().count(), 1);
    assert_eq!(summary.persisted_to.as_deref(), Some(fx.request.spreadsheet.as_path()));

    let (saved, submitted, stamp) = row_status(&fx.request.spreadsheet, "B");
    assert_eq!((saved, submitted), (Some(true), Some(false)));
    let stamped = chrono::NaiveDateTime::parse_from_str(&stamp, "%d/%m/%Y %H:%M:%S");
    assert!(stamped.is_ok(), "timestamp {stamp:?} should be day-first");

    assert_eq!(row_status(&fx.request.spreadsheet, "A"), (None, None, String::new()));
    assert_eq!(
        row_status(&fx.request.spreadsheet, "C"),
        (Some(true), Some(true), "01/02/2026 10:00:00".to_string())
    );

    assert_eq!(launcher.launches(), 1);
    assert!(launcher.was_closed());
    assert_eq!(launcher.page.count_actions("attach "), 1);
}

#[tokio::test(start_paused = true)]
async fn submit_mode_marks_rows_submitted() {
    let fx = fixture(&[]);
    let shots = fx.dir.path().join("shots");
    let launcher = FakeLauncher::new(FakePage::new());
    let orchestrator = Orchestrator::new(test_config(&shots), launcher.clone());
    let ctx = checked_context(&fx.request, RunMode::Submit);

    let summary = orchestrator
        .run(&fx.request, &ctx, &creds(), &TracingProgress)
        .await
        .unwrap();

    assert_eq!(summary.succeeded().count(), 1);
    let (saved, submitted, _) = row_status(&fx.request.spreadsheet, "B");
    assert_eq!((saved, submitted), (Some(true), Some(true)));
    assert!(shots.join("submitted_B.png").exists());
}

#[tokio::test(start_paused = true)]
async fn disabled_submit_is_recorded_as_saved_only() {
    let fx = fixture(&[]);
    let launcher = FakeLauncher::new(FakePage::new().with_disabled("Υποβολή"));
    let orchestrator = Orchestrator::new(test_config(fx.dir.path()), launcher.clone());
    let ctx = checked_context(&fx.request, RunMode::Submit);

    let summary = orchestrator
        .run(&fx.request, &ctx, &creds(), &TracingProgress)
        .await
        .unwrap();

    let b = summary.outcomes.iter().find(|o| o.name == "B").unwrap();
    assert!(b.success);
    assert_eq!(b.reason, Some(OutcomeReason::SubmitUnavailable));
    let (saved, submitted, _) = row_status(&fx.request.spreadsheet, "B");
    assert_eq!((saved, submitted), (Some(true), Some(false)));
}

#[tokio::test(start_paused = true)]
async fn unwritable_spreadsheet_still_reports_every_outcome() {
    let mut fx = fixture(&[]);
    // An .xlsm is written to its .xlsx sibling, which is a directory here
    let source = fx.dir.path().join("ledger.xlsm");
    std::fs::rename(&fx.request.spreadsheet, &source).unwrap();
    std::fs::create_dir(&fx.request.spreadsheet).unwrap();
    fx.request.spreadsheet = source;

    let launcher = FakeLauncher::new(FakePage::new());
    let orchestrator = Orchestrator::new(test_config(fx.dir.path()), launcher.clone());
    let ctx = checked_context(&fx.request, RunMode::Save);
    let (progress, mut events) = ChannelProgress::new();

    let summary = orchestrator
        .run(&fx.request, &ctx, &creds(), &progress)
        .await
        .unwrap();

    let names: Vec<&str> = summary.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["C", "A", "B"]);
    assert_eq!(summary.succeeded().count(), 1);
    assert_eq!(summary.persisted_to, None);
    assert!(summary.persist_error.is_some());
    assert!(summary.has_failures());
    assert!(launcher.was_closed());

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    match last {
        Some(ProgressEvent::RunDone(done)) => assert_eq!(done, summary),
        other => panic!("expected the run summary last, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn run_refuses_to_start_without_a_passing_precheck() {
    let fx = fixture(&[]);
    let launcher = FakeLauncher::new(FakePage::new());
    let orchestrator = Orchestrator::new(test_config(fx.dir.path()), launcher.clone());
    let ctx = RunContext::new(RunMode::Save, PauseGate::new());

    let result = orchestrator
        .run(&fx.request, &ctx, &creds(), &TracingProgress)
        .await;

    assert!(matches!(result, Err(AgentError::PrecheckRequired)), "got {result:?}");
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test(start_paused = true)]
async fn nothing_pending_means_no_browser() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("docs");
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("C.pdf"), b"%PDF").unwrap();
    let (issued, expires) = dates();
    let spreadsheet = dir.path().join("done.xlsx");
    write_sheet(
        &spreadsheet,
        &[[
            "ΑΛΦΑ Α.Ε. - 094014201", "ΕΡΓ-12", "01.02", "C", issued.as_str(), expires.as_str(), "", "TRUE", "TRUE",
            "01/02/2026 10:00:00",
        ]],
    );
    let request = RunRequest {
        spreadsheet: spreadsheet.clone(),
        folder,
    };
    let launcher = FakeLauncher::new(FakePage::new());
    let orchestrator = Orchestrator::new(test_config(dir.path()), launcher.clone());
    let ctx = checked_context(&request, RunMode::Submit);
    let (progress, mut events) = ChannelProgress::new();

    let summary = orchestrator.run(&request, &ctx, &creds(), &progress).await.unwrap();

    assert!(summary.outcomes.is_empty());
    assert_eq!(
        summary.info.as_deref(),
        Some("All documents have already been submitted")
    );
    assert_eq!(launcher.launches(), 0);
    assert!(matches!(events.try_recv(), Ok(ProgressEvent::RunDone(_))));
    assert_eq!(summary.persisted_to, None);
}

#[tokio::test(start_paused = true)]
async fn failed_login_aborts_the_run_and_closes_the_browser() {
    let fx = fixture(&[]);
    let launcher = FakeLauncher::new(FakePage::new().with_missing("j_username"));
    let orchestrator = Orchestrator::new(test_config(fx.dir.path()), launcher.clone());
    let ctx = checked_context(&fx.request, RunMode::Save);

    let result = orchestrator
        .run(&fx.request, &ctx, &creds(), &TracingProgress)
        .await;

    assert!(matches!(result, Err(AgentError::AuthenticationTimeout(_))), "got {result:?}");
    assert!(launcher.was_closed());
    assert_eq!(row_status(&fx.request.spreadsheet, "B"), (None, None, String::new()));
}

#[tokio::test(start_paused = true)]
async fn portal_failure_on_one_item_does_not_stop_the_next() {
    let (issued, expires) = dates();
    let fx = fixture(&[[
        "ΑΛΦΑ Α.Ε. - 094014201", "ΕΡΓ-12", "01.02", "D", issued.as_str(), expires.as_str(), "", "", "", "",
    ]]);
    std::fs::write(fx.request.folder.join("D.pdf"), b"%PDF").unwrap();
    let launcher = FakeLauncher::new(FakePage::new().with_missing("Προσθήκη"));
    let config = test_config(fx.dir.path());
    let list_url = config.portal.document_list_url.clone();
    let orchestrator = Orchestrator::new(config, launcher.clone());
    let ctx = checked_context(&fx.request, RunMode::Save);

    let summary = orchestrator
        .run(&fx.request, &ctx, &creds(), &TracingProgress)
        .await
        .unwrap();

    let failed: Vec<&str> = summary.failures().map(|o| o.name.as_str()).collect();
    assert_eq!(failed, vec!["A", "B", "D"]);
    let recoveries = launcher.page.count_actions(&format!("goto {list_url}"));
    assert_eq!(recoveries, 2, "one recovery per portal failure");
    assert_eq!(row_status(&fx.request.spreadsheet, "D"), (None, None, String::new()));
}

#[tokio::test(start_paused = true)]
async fn paused_run_waits_at_the_next_item() {
    let fx = fixture(&[]);
    let launcher = FakeLauncher::new(FakePage::new());
    let orchestrator = Orchestrator::new(test_config(fx.dir.path()), launcher.clone());
    let ctx = checked_context(&fx.request, RunMode::Save);
    let gate = ctx.gate().clone();
    gate.pause();
    let (progress, mut events) = ChannelProgress::new();
    let credentials = creds();

    let operator = async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(
            events.try_recv().is_err(),
            "no item may start while paused"
        );
        assert!(launcher.page.count_actions("#btn-submit") > 0, "login still happens");
        gate.resume();
    };
    let (summary, ()) = tokio::join!(
        orchestrator.run(&fx.request, &ctx, &credentials, &progress),
        operator
    );

    assert_eq!(summary.unwrap().succeeded().count(), 1);
    assert!(matches!(events.try_recv(), Ok(ProgressEvent::ItemStarted { .. })));
}

#[tokio::test]
async fn legacy_date_cells_still_parse_after_round_trip() {
    let fx = fixture(&[]);
    let ledger = Ledger::load(&fx.request.spreadsheet).unwrap();
    let b = ledger.rows().into_iter().find(|r| r.file_base_name == "B").unwrap();
    let issued = b.parsed_issue_date().unwrap();
    assert!(issued < Local::now().date_naive());
    assert!(issued > NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    assert_eq!(b.note, "σημείωση");
    assert_eq!(b.sheet_row(), 4);
}
