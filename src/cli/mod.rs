//! Command-line interface for release-audit
//!
//! Provides `audit`, `ping`, and `cache` subcommands. Service settings are
//! loaded once here and handed to each command.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod audit;
mod cache;
mod ping;

pub use audit::{clean_fix_version, resolve_branches, resolve_jql, resolve_window, BranchMode};

use crate::config::Settings;

/// Cross-reference Jira tickets against Bitbucket commits for a release
#[derive(Parser)]
#[command(name = "release-audit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (TOML); defaults to release-audit.settings.toml when present
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch commits per repo/branch, reconcile them with Jira, and write reports
    Audit(Box<audit::AuditArgs>),

    /// Check connectivity and credentials for Bitbucket and Jira
    Ping(ping::PingArgs),

    /// Inspect or clear the response cache
    Cache(cache::CacheArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let settings = Settings::load(cli.settings.as_deref())?;
    tracing::debug!(?settings, "settings loaded");

    match cli.command {
        Commands::Audit(args) => audit::run(*args, &settings),
        Commands::Ping(args) => ping::run(args, &settings),
        Commands::Cache(args) => cache::run(args, &settings),
    }
}
