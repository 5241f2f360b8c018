//! `scalpel`: ScalpelLab recording database tool.
//!
//! Rescans the MP4 and SEQ recording trees into their status tables, maps
//! queries back to recording directories and serves the dashboard.

use anyhow::Context;
use clap::{Parser, Subcommand};
use scalpel::ScalpelConfig;
use scalpel_db::StatusKind;
use scalpel_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "scalpel", version, about = "ScalpelLab recording database tool")]
struct Cli {
    /// SQLite database (overrides the config)
    #[arg(long, global = true, env = "SCALPEL_DB")]
    db: Option<PathBuf>,

    /// Config file (default: <home>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rescan the MP4 tree and reconcile the MP4 status table
    Mp4(cli::status::ReconcileArgs),

    /// Rescan the SEQ tree and reconcile the SEQ status table
    Seq(cli::status::ReconcileArgs),

    /// Map a query to recording directories
    Paths(cli::paths::PathsArgs),

    /// Per-camera status distribution
    Summary(cli::summary::SummaryArgs),

    /// Export the schema as dbdiagram.io DSL
    Diagram(cli::diagram::DiagramArgs),

    /// Find duplicate camera exports
    Dedupe(cli::dedupe::DedupeArgs),

    /// Run the web dashboard
    Serve(cli::serve::ServeArgs),

    /// Show the resolved configuration
    Config(cli::config::ConfigArgs),
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Mp4(a) | Commands::Seq(a) => a.json,
            Commands::Paths(a) => a.json,
            Commands::Summary(a) => a.json,
            Commands::Dedupe(a) => a.json,
            Commands::Config(a) => a.json,
            Commands::Diagram(a) => a.output.is_none(),
            Commands::Serve(_) => false,
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ScalpelConfig> {
    let mut config = ScalpelConfig::load(cli.config.as_deref()).context("Loading configuration")?;
    if let Some(db) = &cli.db {
        config.database_path = scalpel::config::expand_tilde(db);
    }
    debug!(?config, "Configuration resolved");
    Ok(config)
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Mp4(args) => cli::status::run(StatusKind::Mp4, args, &config),
        Commands::Seq(args) => cli::status::run(StatusKind::Seq, args, &config),
        Commands::Paths(args) => cli::paths::run(args, &config),
        Commands::Summary(args) => cli::summary::run(args, &config),
        Commands::Diagram(args) => cli::diagram::run(args, &config),
        Commands::Dedupe(args) => cli::dedupe::run(args, &config),
        Commands::Serve(args) => cli::serve::run(args, config),
        Commands::Config(args) => cli::config::run(args, &config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "scalpel",
        verbose: cli.verbose,
        quiet_console: cli.command.wants_json(),
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {:?}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
