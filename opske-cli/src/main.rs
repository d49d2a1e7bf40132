//! OPSKE CLI
//!
//! Uploads the supporting documents listed in a spreadsheet to the OPSKE
//! portal and records the outcome back into the spreadsheet.
//!
//! Usage:
//!   opske check --excel docs.xlsx --folder ./pdfs
//!   opske run --excel docs.xlsx --folder ./pdfs            # save only
//!   opske run --excel docs.xlsx --folder ./pdfs --submit   # save and submit
//!   opske init-config opske.yaml

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use opske::browser::ChromeLauncher;
use opske::credentials::{require_credentials, StaticCredentials};
use opske::validator::precheck;
use opske::{
    AgentConfig, AgentError, ChannelProgress, CredentialSource, Credentials, Ledger,
    Orchestrator, PauseGate, PrecheckReport, RunContext, RunMode, RunRequest,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

mod logging;
mod prompt;
mod report;

#[derive(Parser)]
#[command(name = "opske")]
#[command(about = "Upload supporting documents listed in a spreadsheet to the OPSKE portal")]
#[command(version)]
struct Cli {
    /// YAML configuration file (defaults apply when omitted)
    #[clap(long, short = 'c', global = true, env = "OPSKE_CONFIG")]
    config: Option<PathBuf>,

    /// Also write the log to this file
    #[clap(long, global = true, env = "OPSKE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Debug logging
    #[clap(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Spreadsheet with one row per document (.xlsx or .xls)
    #[clap(long, short = 'e')]
    excel: PathBuf,

    /// Folder holding the document files
    #[clap(long, short = 'f')]
    folder: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Submit each document after saving it
    #[clap(long)]
    submit: bool,

    #[clap(long, env = "OPSKE_USERNAME")]
    username: Option<String>,

    #[clap(long, env = "OPSKE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Run Chrome without a window
    #[clap(long)]
    headless: bool,
}

#[derive(Args, Debug)]
struct InitConfigArgs {
    /// Where to write the configuration
    #[clap(default_value = "opske.yaml")]
    path: PathBuf,

    /// Overwrite an existing file
    #[clap(long)]
    force: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the spreadsheet and the document folder without uploading
    Check(SourceArgs),
    /// Check, then upload every pending document
    Run(RunArgs),
    /// Write the default configuration to a YAML file
    InitConfig(InitConfigArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = logging::init(cli.log_file.as_deref(), cli.verbose);

    let result = match &cli.command {
        Commands::Check(args) => check(cli.config.as_deref(), args),
        Commands::Run(args) => run(cli.config.as_deref(), args).await,
        Commands::InitConfig(args) => init_config(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    let config = AgentConfig::load(path).context("Failed to load configuration")?;
    debug!(?config, "configuration");
    Ok(config)
}

fn run_precheck(config: &AgentConfig, source: &SourceArgs) -> Result<PrecheckReport> {
    let ledger = Ledger::load(&source.excel)
        .with_context(|| format!("Failed to read {}", source.excel.display()))?;
    let report = precheck(
        &ledger,
        &source.folder,
        &config.files,
        Local::now().date_naive(),
    )?;
    report::print_precheck(&report);
    Ok(report)
}

fn check(config: Option<&Path>, args: &SourceArgs) -> Result<ExitCode> {
    let config = load_config(config)?;
    let report = run_precheck(&config, args)?;
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_config(args: &InitConfigArgs) -> Result<ExitCode> {
    if args.path.exists() && !args.force {
        bail!("{} already exists, use --force to overwrite", args.path.display());
    }
    let yaml = AgentConfig::default().to_yaml()?;
    std::fs::write(&args.path, yaml)
        .with_context(|| format!("Failed to write {}", args.path.display()))?;
    println!("{} {}", "Wrote".green(), args.path.display());
    Ok(ExitCode::SUCCESS)
}

fn credentials(args: &RunArgs) -> Result<Credentials, AgentError> {
    let given = match (&args.username, &args.password) {
        (Some(user), Some(pass)) => Some(Credentials::new(user, pass)),
        _ => None,
    };
    let mut fixed = StaticCredentials(given);
    let mut terminal = prompt::TerminalPrompt;
    let mut sources: [&mut dyn CredentialSource; 2] = [&mut fixed, &mut terminal];
    require_credentials(&mut sources)
}

/// Toggle the gate whenever the operator enters `p`.
fn spawn_pause_listener(gate: PauseGate) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().eq_ignore_ascii_case("p") {
                let paused = gate.toggle();
                if paused {
                    println!("{}", "Paused after the current document, enter p to resume".yellow());
                } else {
                    println!("{}", "Resumed".green());
                }
            }
        }
    })
}

async fn run(config: Option<&Path>, args: &RunArgs) -> Result<ExitCode> {
    let mut config = load_config(config)?;
    if args.headless {
        config.browser.headless = true;
    }

    let report = run_precheck(&config, &args.source)?;
    if !report.passed() {
        return Ok(ExitCode::FAILURE);
    }

    let credentials = match credentials(args) {
        Ok(credentials) => credentials,
        Err(e) => {
            println!("{}", format!("{e}, nothing was uploaded").yellow());
            return Ok(ExitCode::SUCCESS);
        }
    };

    let mode = if args.submit {
        RunMode::Submit
    } else {
        RunMode::Save
    };
    let gate = PauseGate::new();
    let mut ctx = RunContext::new(mode, gate.clone());
    ctx.record_precheck(&report);

    let launcher = ChromeLauncher::new(
        config.browser.clone(),
        config.timings.operation_timeout.duration(),
    );
    let orchestrator = Orchestrator::new(config, Arc::new(launcher));
    let request = RunRequest {
        spreadsheet: args.source.excel.clone(),
        folder: args.source.folder.clone(),
    };
    let (progress, mut events) = ChannelProgress::new();

    info!(%mode, "Starting run");
    println!("{}", "Enter p at any time to pause or resume".dimmed());
    let pause_listener = spawn_pause_listener(gate);
    let job = tokio::spawn(async move {
        orchestrator
            .run(&request, &ctx, &credentials, &progress)
            .await
    });

    while let Some(event) = events.recv().await {
        report::print_event(&event);
    }
    pause_listener.abort();

    match job.await.context("Run task panicked")? {
        Ok(summary) => {
            report::print_summary(&summary);
            Ok(if summary.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(e) => Err(e.into()),
    }
}
