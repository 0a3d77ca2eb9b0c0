//! Run command implementation.
//!
//! Saves every cell of a manifest, then builds and runs the selected ones in
//! order, stopping at the first failure.

use std::path::Path;
use std::time::Instant;

use anyhow::bail;
use ckernel_core::{
    CellOutcome, ErrorKind, Kernel, KernelSettings, TerminalStatus, WorkArea, event_channel,
    input_channel,
};
use tokio_util::sync::CancellationToken;

use crate::colors;
use crate::manifest::Manifest;
use crate::terminal::{self, OutputMode};

/// Run a notebook manifest. Returns whether every selected cell succeeded.
pub async fn execute(
    manifest_path: &Path,
    cell_filter: Option<&str>,
    workdir: Option<&Path>,
    mode: OutputMode,
) -> anyhow::Result<bool> {
    let start = Instant::now();

    let settings = KernelSettings::from_env();
    if settings.shim_path.is_none() {
        tracing::warn!("Input intercept library not found, programs will not show prompts");
    }

    let manifest = Manifest::load(manifest_path)?;
    let base = manifest_path.parent().unwrap_or(Path::new("."));
    let cells = manifest.cells(base, &settings)?;

    let selected: Vec<_> = match cell_filter {
        Some(name) => match cells.iter().find(|c| c.config.target_name == name) {
            Some(cell) => vec![cell],
            None => bail!("unknown cell '{name}'"),
        },
        None => cells.iter().collect(),
    };

    let area = match workdir {
        Some(dir) => WorkArea::new(dir)?,
        None => WorkArea::temporary()?,
    };
    tracing::debug!("Working area: {}", area.root.display());

    let (sink, stream) = event_channel();
    let printer = tokio::spawn(terminal::print_events(stream, mode));
    let (input_tx, mut input) = input_channel();
    terminal::forward_stdin(input_tx);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut kernel = Kernel::new(settings, area, sink);
    for cell in &cells {
        kernel.save(cell)?;
    }

    let mut succeeded = 0;
    let mut ok = true;
    for cell in selected {
        let name = &cell.config.target_name;
        tracing::info!("Running cell '{}'", name);
        match kernel.execute_cell(cell, &mut input, &cancel).await {
            Ok(CellOutcome::Ran { status, .. }) if !status.is_success() => {
                ok = false;
                if status != TerminalStatus::Cancelled {
                    tracing::debug!("Cell '{}' failed, skipping the rest", name);
                }
                break;
            }
            Ok(_) => succeeded += 1,
            Err(e) => {
                ok = false;
                match e.kind() {
                    ErrorKind::Cancelled => eprintln!("{}Cancelled{}", colors::YELLOW, colors::RESET),
                    // Diagnostics were already streamed.
                    ErrorKind::Compile => eprintln!("{}error:{} {}", colors::RED, colors::RESET, e),
                    _ => eprintln!("{}error:{} {}", colors::RED, colors::RESET, e.with_hint()),
                }
                break;
            }
        }
    }

    // Closing the sink ends the printer.
    drop(kernel);
    if let Err(e) = printer.await {
        tracing::debug!("Event printer stopped: {}", e);
    }

    if mode == OutputMode::Text && ok {
        eprintln!(
            "{}{}Completed{} {} cell(s) in {:.2}s",
            colors::BOLD,
            colors::GREEN,
            colors::RESET,
            succeeded,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(ok)
}
