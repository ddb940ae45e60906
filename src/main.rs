mod cli;
mod engine;
mod error;
mod host;
mod lists;
mod logbook;
mod metrics;
mod model;
mod orchestrator;
mod queue;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_ENV: &str = "SCENE_BATCH_LOG";

/// Install the tracing subscriber for the selected output mode.
///
/// The TUI owns the terminal, so there tracing only goes to `--trace-file` (if given).
fn init_tracing(args: &cli::Cli) -> Result<()> {
    let is_tui = !(args.json || args.text || args.silent);
    let default_directive = if args.text { "scene_batch=info" } else { "scene_batch=warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));

    if let Some(path) = args.trace_file.as_deref() {
        let file = std::fs::File::create(path)
            .with_context(|| format!("create trace file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .init();
    } else if !is_tui && !args.silent {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    // Read before any runtime thread exists.
    model::init_local_offset();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build async runtime")?
        .block_on(run_main())
}

async fn run_main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    let is_non_tui = args.silent || args.json || args.text;

    init_tracing(&args)?;

    match cli::run(args).await {
        Ok(()) => {
            // Headless modes exit as soon as output is flushed.
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "scene-batch failed");
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
