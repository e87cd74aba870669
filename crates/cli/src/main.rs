//! s3c - dual-pane S3 commander
//!
//! Browse S3-compatible buckets side by side and run batch transfers
//! between them.

use std::fs::File;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use s3_commander::commands::{self, Cli};
use s3_commander::exit_code::ExitCode;

/// Environment variable holding the log filter
const LOG_ENV: &str = "S3C_LOG";

fn init_tracing(cli: &Cli) -> std::io::Result<()> {
    let default_level = if cli.debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("Cannot open log file: {e}");
        std::process::exit(ExitCode::GeneralError.as_i32());
    }

    let exit_code = commands::execute(cli).await;
    std::process::exit(exit_code.as_i32());
}
