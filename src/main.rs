//! Binary entry point for citemerge.
//!
//! This binary provides the CLI interface for merging and exporting
//! bibliographic records.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use citemerge::config::CitemergeConfig;
use citemerge::observability;

/// Citemerge - aggregate, deduplicate and export bibliographic records.
#[derive(Parser)]
#[command(name = "citemerge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "CITEMERGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Merge all configured sources into one deduplicated bibliography.
    Merge {
        /// Output format: json or yaml.
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not contact DOI or registry services.
        #[arg(long)]
        offline: bool,
    },

    /// Export every item of the configured sources through the cache.
    Export {
        /// Name of the aggregated source.
        #[arg(short, long, default_value = "all")]
        name: String,

        /// Output format: json or yaml.
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not contact DOI or registry services.
        #[arg(long)]
        offline: bool,

        /// Ignore cached entries.
        #[arg(long)]
        refresh: bool,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(Some(&config.logging), cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &CitemergeConfig) -> anyhow::Result<()> {
    match command {
        Commands::Merge {
            format,
            output,
            offline,
        } => commands::cmd_merge(config, &format, output, offline),

        Commands::Export {
            name,
            format,
            output,
            offline,
            refresh,
        } => commands::cmd_export(config, &name, &format, output, offline, refresh),

        Commands::Config { show } => commands::cmd_config(config, show),

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "citemerge", &mut std::io::stdout());
            Ok(())
        },
    }
}

/// Loads configuration from the given file or the default location.
fn load_config(path: Option<&Path>) -> citemerge::Result<CitemergeConfig> {
    match path {
        Some(path) => CitemergeConfig::load_from_file(path),
        None => Ok(CitemergeConfig::load_default()),
    }
}
