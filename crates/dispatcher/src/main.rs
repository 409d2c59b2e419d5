//! Console dispatcher
//!
//! Reads the latest job and the roster from JSON files and escalates it to the
//! selected candidates, printing every proposal to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Review the job and the roster
//! dispatcher show --jobs jobs.json --roster roster.json --select 1001,1003
//!
//! # Escalate; answer on stdin with `accept <handle>` / `decline <handle>`
//! DISPATCH_SUPERVISORS=900 dispatcher run --jobs jobs.json --roster roster.json --select 1001,1003
//! ```

mod console;
mod file_source;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dispatch_coordination::{
    DispatchConfig, DispatchResult, Dispatcher, EscalationOutcome, JobSource, RecipientId, Roster,
};
use tracing::info;

use console::ConsoleChannel;
use file_source::FileJobSource;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (DISPATCH_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the latest job and the roster with the current selection
    Show {
        #[command(flatten)]
        files: SourceFiles,

        /// Candidate ids to mark as selected, in order
        #[arg(long, value_delimiter = ',')]
        select: Vec<RecipientId>,
    },
    /// Escalate the latest job to the selected candidates
    Run {
        #[command(flatten)]
        files: SourceFiles,

        /// Candidate ids to offer the job to, in order
        #[arg(long, value_delimiter = ',', required = true)]
        select: Vec<RecipientId>,

        /// Candidate ids that cannot be reached
        #[arg(long, value_delimiter = ',')]
        blocked: Vec<RecipientId>,
    },
}

#[derive(Args, Debug)]
struct SourceFiles {
    /// JSON array of job records, oldest first
    #[arg(long)]
    jobs: PathBuf,

    /// JSON array of `{"id", "name"}` entries
    #[arg(long)]
    roster: PathBuf,

    /// Job fields to leave out of the summary
    #[arg(long, value_delimiter = ',', default_value = "timestamp")]
    ignore_fields: Vec<String>,
}

impl SourceFiles {
    fn source(&self) -> FileJobSource {
        FileJobSource::new(&self.jobs, &self.roster).with_ignored_fields(self.ignore_fields.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = DispatchConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Command::Show { files, select } => show(&files.source(), &select).await,
        Command::Run {
            files,
            select,
            blocked,
        } => run(config, &files.source(), &select, blocked).await,
    }
}

async fn show(source: &FileJobSource, select: &[RecipientId]) -> Result<()> {
    let job = source.latest_job().await.context("Failed to read latest job")?;
    let roster = source.roster().await.context("Failed to read roster")?;

    println!("{}\n", job.format_summary());
    let lines = roster_lines(&roster, select)?;
    for line in &lines {
        println!("{line}");
    }
    if select.is_empty() {
        println!("\nNothing selected.");
    }
    Ok(())
}

/// Roster menu with `select` applied the same way `run` resolves it:
/// in order, repeats ignored
fn roster_lines(roster: &Roster, select: &[RecipientId]) -> DispatchResult<Vec<String>> {
    let mut selection = roster.selection();
    for id in select {
        selection.select(id)?;
    }
    Ok(roster
        .candidates()
        .iter()
        .map(|candidate| format!("  [{}] {}", candidate.id, selection.label(candidate)))
        .collect())
}

async fn run(
    config: DispatchConfig,
    source: &FileJobSource,
    select: &[RecipientId],
    blocked: Vec<RecipientId>,
) -> Result<()> {
    if config.supervisors.is_empty() {
        tracing::warn!("No supervisors configured; the outcome will only be logged");
    }
    info!(
        window_minutes = config.response_window_minutes,
        supervisors = config.supervisors.len(),
        "Dispatcher starting"
    );

    let channel = Arc::new(ConsoleChannel::new(blocked));
    let dispatcher = Dispatcher::new(config, channel)?.shared();

    let escalation = dispatcher
        .dispatch_latest(source, select)
        .await
        .context("Failed to dispatch latest job")?;
    info!(job_id = %escalation.job_id(), "Job dispatched");

    // detached: stdin stays open until the operator closes it
    console::spawn_stdin_replies(dispatcher.clone());

    let report = escalation.wait().await?;
    match &report.outcome {
        EscalationOutcome::Accepted { candidate } => {
            println!("\nAccepted by {}.", candidate.name)
        }
        EscalationOutcome::Exhausted => println!("\nNobody accepted the job."),
    }
    for record in &report.history {
        println!("  {}: {}", record.candidate.name, record.disposition);
    }
    Ok(())
}
