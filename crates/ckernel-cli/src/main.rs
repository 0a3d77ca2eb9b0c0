//! ckernel CLI - build and run C/C++ notebook cells from a terminal.

mod colors;
mod manifest;
mod run;
mod terminal;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::terminal::OutputMode;

#[derive(Parser)]
#[command(name = "ckernel")]
#[command(about = "Build and run C/C++ notebook cells")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cells of a notebook manifest
    Run {
        /// Path to the manifest (.json)
        manifest: PathBuf,

        /// Run only a specific cell (all cells are still saved)
        #[arg(long)]
        cell: Option<String>,

        /// Keep sources and artifacts in this directory instead of a
        /// temporary one
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format ckernel-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(kernel_err) = err.downcast_ref::<ckernel_core::Error>() {
            anyhow::anyhow!("{}", kernel_err.with_hint())
        } else {
            err
        }
    };

    let ok = match cli.command {
        Commands::Run {
            manifest,
            cell,
            workdir,
            json,
        } => {
            let mode = if json { OutputMode::Json } else { OutputMode::Text };
            run::execute(&manifest, cell.as_deref(), workdir.as_deref(), mode)
                .await
                .map_err(format_error)?
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
