use crate::engine::{AbortSignal, BatchController};
use crate::host::{HostAdapter, RhaiHost, RhaiHostConfig};
use crate::lists::{self, AddOutcome, FileKind, FileList};
use crate::logbook::LogBook;
use crate::model::{BatchEvent, LogEntry, LogLevel, RunConfig, RunResult};
use crate::orchestrator::HostFactory;
use crate::queue::{self, Pairing};
use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Which stream a queued line goes to.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Writer thread for stdout/stderr; async code only pushes lines onto the channel.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "scene-batch",
    version,
    about = "Apply Rhai scripts to JSON scene files in batch, with an optional TUI"
)]
pub struct Cli {
    /// Script file(s) to run, in order
    #[arg(long = "script", value_name = "PATH", num_args = 1..)]
    pub scripts: Vec<PathBuf>,

    /// Scene file(s) to process, in order
    #[arg(long = "scene", value_name = "PATH", num_args = 1..)]
    pub scenes: Vec<PathBuf>,

    /// Text file listing scripts and scenes, one quoted or bare path per entry
    #[arg(long = "list-file", value_name = "PATH")]
    pub list_files: Vec<PathBuf>,

    /// Save each scene after its script ran
    #[arg(long)]
    pub save: bool,

    /// How scripts and scenes are paired into work items
    #[arg(long, value_enum, default_value_t = Pairing::Positional)]
    pub pairing: Pairing,

    /// Extensions accepted as script files
    #[arg(long, value_delimiter = ',', default_value = "rhai")]
    pub script_ext: Vec<String>,

    /// Extensions accepted as scene files
    #[arg(long, value_delimiter = ',', default_value = "json")]
    pub scene_ext: Vec<String>,

    /// Operation budget per script run (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub max_operations: u64,

    /// How long an abort may go unanswered before the UI says so
    #[arg(long, default_value = "3s")]
    pub abort_grace: humantime::Duration,

    /// Run headless and print the run result as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the log and a text summary, then exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Suppress everything except errors (requires --json)
    #[arg(long)]
    pub silent: bool,

    /// Export the run result as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export the session log as plain text
    #[arg(long)]
    pub export_log: Option<PathBuf>,

    /// Write tracing output to this file (the TUI owns the terminal otherwise)
    #[arg(long)]
    pub trace_file: Option<PathBuf>,

    /// Start processing as soon as the TUI opens
    #[arg(long)]
    pub start_on_launch: bool,
}

/// Script and scene lists gathered from the command line, plus notices for the log.
pub(crate) struct Inputs {
    pub scripts: FileList,
    pub scenes: FileList,
    pub notices: Vec<LogEntry>,
}

fn note_outcome(kind: FileKind, outcome: &AddOutcome, notices: &mut Vec<LogEntry>) {
    tracing::debug!(kind = kind.label(), added = outcome.added, "files added");
    for p in &outcome.duplicates {
        notices.push(LogEntry::new(
            LogLevel::Warning,
            format!("Already in {}: {}", kind.label(), p.display()),
        ));
    }
    for p in &outcome.rejected {
        notices.push(LogEntry::new(
            LogLevel::Warning,
            format!("Skipping {} (not one of the {})", p.display(), kind.label()),
        ));
    }
}

/// Collect scripts and scenes from flags and list files.
pub(crate) fn collect_inputs(args: &Cli) -> Result<Inputs> {
    // Only the cross product treats a repeated path as a mistake; positional runs pair by index.
    let keep = args.pairing != Pairing::CrossProduct;
    let mut scripts = FileList::new(FileKind::Script, &args.script_ext).keep_duplicates(keep);
    let mut scenes = FileList::new(FileKind::Scene, &args.scene_ext).keep_duplicates(keep);
    let mut notices = Vec::new();

    let outcome = scripts.add(args.scripts.iter().cloned());
    note_outcome(FileKind::Script, &outcome, &mut notices);
    let outcome = scenes.add(args.scenes.iter().cloned());
    note_outcome(FileKind::Scene, &outcome, &mut notices);

    for list in &args.list_files {
        let entries = lists::load_list_file(list, &scripts, &scenes)?;
        let outcome = scripts.add(entries.scripts);
        note_outcome(FileKind::Script, &outcome, &mut notices);
        let outcome = scenes.add(entries.scenes);
        note_outcome(FileKind::Scene, &outcome, &mut notices);
        tracing::debug!(list = %list.display(), "list file loaded");
    }

    Ok(Inputs {
        scripts,
        scenes,
        notices,
    })
}

pub async fn run(args: Cli) -> Result<()> {
    // --silent only makes sense for JSON output.
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    // Silent wins over the other modes.
    if args.silent {
        return run_batch(args, true).await;
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Built without the tui feature.
            return run_text(args).await;
        }
    }

    if args.json {
        return run_batch(args, false).await;
    }

    run_text(args).await
}

/// Generate a random identifier for a batch session.
fn gen_run_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

/// Build a `RunConfig` from CLI arguments and the collected lists.
pub(crate) fn build_config(args: &Cli, inputs: &Inputs) -> RunConfig {
    RunConfig {
        run_id: gen_run_id(),
        scripts: inputs.scripts.paths().to_vec(),
        scenes: inputs.scenes.paths().to_vec(),
        save_after: args.save,
        pairing: args.pairing,
        max_operations: args.max_operations,
        abort_grace: Duration::from(args.abort_grace),
    }
}

/// Factory for the embedded script host, configured from `cfg`.
pub(crate) fn host_factory(cfg: &RunConfig) -> HostFactory {
    let host_cfg = RhaiHostConfig {
        max_operations: cfg.max_operations,
    };
    Arc::new(move || Box::new(RhaiHost::new(host_cfg.clone())) as Box<dyn HostAdapter>)
}

/// A headless run: controller on a blocking worker, Ctrl-C wired to the abort signal.
struct HeadlessRun {
    events: mpsc::UnboundedReceiver<BatchEvent>,
    abort: AbortSignal,
    handle: tokio::task::JoinHandle<Result<RunResult, crate::error::StateError>>,
}

fn spawn_headless(cfg: &RunConfig) -> Result<HeadlessRun> {
    let queue = queue::build_with(cfg.pairing, &cfg.scripts, &cfg.scenes, cfg.save_after)
        .map_err(|e| match e {
            crate::error::QueueError::Empty => {
                anyhow::anyhow!("Script or scene file lists are empty!")
            }
            other => anyhow::Error::new(other),
        })?;
    let (evt_tx, events) = mpsc::unbounded_channel::<BatchEvent>();
    let abort = AbortSignal::new();
    let controller = BatchController::new(cfg.run_id.clone());
    let hosts = host_factory(cfg);
    let worker_abort = abort.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let mut host = hosts();
        controller.run(&queue, &worker_abort, host.as_mut(), &evt_tx)
    });
    Ok(HeadlessRun {
        events,
        abort,
        handle,
    })
}

/// Run the batch without a UI and print (or swallow) the JSON result.
/// `silent` controls whether anything besides errors is written.
async fn run_batch(args: Cli, silent: bool) -> Result<()> {
    let inputs = collect_inputs(&args)?;
    let cfg = build_config(&args, &inputs);
    let (out_tx, out_handle) = if silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };

    let mut log = LogBook::default();
    for n in inputs.notices {
        log.push(n);
    }

    let HeadlessRun {
        mut events,
        abort,
        handle,
    } = spawn_headless(&cfg)?;
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(BatchEvent::Log(entry)) => log.push(entry),
                Some(_) => {}
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                abort.request();
                log.record(LogLevel::Warning, "Abort requested, stopping after the current step…");
            }
        }
    }

    let result = handle
        .await
        .context("batch worker failed")?
        .context("batch refused")?;

    // Export failures propagate.
    handle_exports(&args, &log, &result)?;

    if let Some(tx) = out_tx.as_ref() {
        let out = serde_json::to_string_pretty(&result)?;
        let _ = tx.send(OutputLine::Stdout(out));
    }

    if let Some(tx) = out_tx {
        drop(tx);
    }
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }

    Ok(())
}

fn progress_line(p: &crate::model::Progress) -> String {
    match p.eta {
        Some(eta) if p.processed < p.total => format!(
            "Progress: {:.1}% ({}/{}), ~{} remaining",
            p.percent(),
            p.processed,
            p.total,
            crate::metrics::format_hms(eta)
        ),
        _ => format!("Progress: {:.1}% ({}/{})", p.percent(), p.processed, p.total),
    }
}

async fn run_text(args: Cli) -> Result<()> {
    let inputs = collect_inputs(&args)?;
    let cfg = build_config(&args, &inputs);
    let (out_tx, out_handle) = spawn_output_writer();

    let mut log = LogBook::default();
    for n in inputs.notices {
        let _ = out_tx.send(OutputLine::Stderr(n.to_line()));
        log.push(n);
    }

    let HeadlessRun {
        mut events,
        abort,
        handle,
    } = spawn_headless(&cfg)?;
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(BatchEvent::Log(entry)) => {
                    let _ = out_tx.send(OutputLine::Stderr(entry.to_line()));
                    log.push(entry);
                }
                Some(BatchEvent::Progress(p)) => {
                    let _ = out_tx.send(OutputLine::Stderr(progress_line(&p)));
                }
                Some(BatchEvent::StateChanged { state }) => {
                    tracing::debug!(state = state.label(), "run state changed");
                }
                Some(BatchEvent::RunCompleted { .. }) => {}
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                abort.request();
                let entry = LogEntry::new(
                    LogLevel::Warning,
                    "Abort requested, stopping after the current step…",
                );
                let _ = out_tx.send(OutputLine::Stderr(entry.to_line()));
                log.push(entry);
            }
        }
    }

    let result = handle.await??;

    handle_exports(&args, &log, &result)?;
    let summary = crate::text_summary::build_text_summary(&result);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Handle export operations (result JSON and session log) for both text and JSON modes.
fn handle_exports(args: &Cli, log: &LogBook, result: &RunResult) -> Result<()> {
    if let Some(p) = args.export_json.as_deref() {
        crate::orchestrator::export_json(p, result)?;
    }
    if let Some(p) = args.export_log.as_deref() {
        log.export(p)?;
    }
    Ok(())
}
