mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kosmos", about = "KOSMOS multi-slit spectroscopy reduction")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or save a default reduction config
    Config(commands::config::ConfigArgs),
    /// Check a reduction config and show what it will run
    Validate(commands::validate::ValidateArgs),
    /// Inspect or restore a session log
    #[command(subcommand)]
    Log(commands::log::LogCommand),
    /// Show product file names for an object and its targets
    Names(commands::names::NamesArgs),
    /// List the reduction stages in run order
    Stages,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Log(cmd) => commands::log::run(cmd),
        Commands::Names(args) => commands::names::run(args),
        Commands::Stages => {
            summary::print_stages();
            Ok(())
        }
    }
}
