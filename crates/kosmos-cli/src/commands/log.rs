use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use kosmos_core::pipeline::config::ReductionConfig;
use kosmos_core::pipeline::Stage;
use kosmos_core::session::{parse_session_log, LogEntry};
use tracing::debug;

use crate::summary::{print_log_entry, print_restore_report};

#[derive(Subcommand)]
pub enum LogCommand {
    /// Print the entries of a session log
    Show(ShowArgs),
    /// Rebuild a reduction config from a session log
    Restore(RestoreArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    /// Session log file
    pub file: PathBuf,

    /// Only show entries for this stage (e.g. "Bias", "Wave Cal")
    #[arg(long)]
    pub stage: Option<Stage>,
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Session log file
    pub file: PathBuf,

    /// Config to apply the logged parameters on top of
    #[arg(long)]
    pub base: Option<PathBuf>,

    /// Write the restored config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn read_log(path: &Path) -> Result<Vec<LogEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session log {}", path.display()))?;
    let entries = parse_session_log(&text);
    debug!(path = %path.display(), entries = entries.len(), "Parsed session log");
    Ok(entries)
}

pub fn run(cmd: &LogCommand) -> Result<()> {
    match cmd {
        LogCommand::Show(args) => show(args),
        LogCommand::Restore(args) => restore(args),
    }
}

fn show(args: &ShowArgs) -> Result<()> {
    let entries = read_log(&args.file)?;
    let shown = entries
        .iter()
        .filter(|e| args.stage.is_none() || e.stage() == args.stage);
    for entry in shown {
        print_log_entry(entry)?;
    }
    Ok(())
}

fn restore(args: &RestoreArgs) -> Result<()> {
    let entries = read_log(&args.file)?;
    let mut config = match &args.base {
        Some(path) => super::load_config(path)?,
        None => ReductionConfig::default(),
    };

    let report = config.restore_from_log(&entries);
    // Keep stdout clean for the TOML when no output file is given.
    print_restore_report(&report, args.output.is_some());
    super::write_config(&config, args.output.as_deref())
}
