//! CLI command definitions and execution
//!
//! `s3c` with no subcommand opens the browser. Profile management and shell
//! completions are separate subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sc_core::{ConfigManager, Result};

use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

mod browse;
mod completions;
mod profile;

pub use browse::{build_dispatcher, demo_store, BrowseArgs};

/// s3c - dual-pane S3 commander
///
/// Browse buckets side by side and run batch copy, move, delete, upload and
/// download between them.
#[derive(Parser, Debug)]
#[command(name = "s3c")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (default: ~/.config/s3c/config.toml)
    #[arg(long, global = true, env = "S3C_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress spinner
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the dual-pane browser (default)
    Browse(BrowseArgs),

    /// Manage storage profiles
    #[command(subcommand)]
    Profile(profile::ProfileCommands),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

impl Cli {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            no_progress: self.no_progress,
            quiet: self.quiet,
        }
    }

    /// Config manager for `--config`, or the default location
    pub fn config_manager(&self) -> Result<ConfigManager> {
        match &self.config {
            Some(path) => Ok(ConfigManager::with_path(path.clone())),
            None => ConfigManager::new(),
        }
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = cli.output_config();
    let config_manager = match cli.config_manager() {
        Ok(manager) => manager,
        Err(e) => {
            crate::output::Formatter::new(output_config).error(&e.to_string());
            return ExitCode::for_error(&e);
        }
    };

    match cli.command {
        None => browse::execute(BrowseArgs::default(), config_manager, output_config).await,
        Some(Commands::Browse(args)) => browse::execute(args, config_manager, output_config).await,
        Some(Commands::Profile(cmd)) => profile::execute(cmd, config_manager, output_config),
        Some(Commands::Completions(args)) => completions::execute(args),
    }
}
