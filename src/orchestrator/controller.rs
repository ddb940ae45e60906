//! Run lifecycle controller.
//!
//! Owns start/abort/quit orchestration and emits events for presentation layers.

use crate::engine::{AbortSignal, BatchController};
use crate::error::{QueueError, StateError};
use crate::host::HostAdapter;
use crate::model::{BatchEvent, LogEntry, LogLevel, RunConfig, RunResult, RunState};
use crate::queue;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Creates a fresh host adapter for each run, on the worker thread that will drive it.
pub(crate) type HostFactory = Arc<dyn Fn() -> Box<dyn HostAdapter> + Send + Sync>;

/// Commands emitted by UI layers to control batch runs.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Process the given lists as they are shown in the UI.
    Start {
        scripts: Vec<PathBuf>,
        scenes: Vec<PathBuf>,
        save_after: bool,
    },
    Abort,
    Quit,
}

type RunHandle = tokio::task::JoinHandle<Result<RunResult, StateError>>;

fn notify(event_tx: &UnboundedSender<BatchEvent>, level: LogLevel, msg: impl Into<String>) {
    let _ = event_tx.send(BatchEvent::Log(LogEntry::new(level, msg)));
}

/// Everything needed to launch a run; one per orchestrator.
struct Runner<'a> {
    cfg: &'a RunConfig,
    controller: BatchController,
    abort: AbortSignal,
    hosts: HostFactory,
    event_tx: UnboundedSender<BatchEvent>,
}

impl Runner<'_> {
    /// Build the queue and hand it to the controller on a blocking worker.
    ///
    /// Returns `None` (after logging why) when the queue cannot be built.
    fn start(&self, scripts: &[PathBuf], scenes: &[PathBuf], save_after: bool) -> Option<RunHandle> {
        let queue = match queue::build_with(self.cfg.pairing, scripts, scenes, save_after) {
            Ok(q) => q,
            Err(QueueError::Empty) => {
                notify(&self.event_tx, LogLevel::Warning, "Script or scene file lists are empty!");
                return None;
            }
            Err(e) => {
                notify(&self.event_tx, LogLevel::Warning, format!("Cannot start: {e}."));
                return None;
            }
        };

        self.abort.reset();
        let controller = self.controller.clone();
        let abort = self.abort.clone();
        let hosts = self.hosts.clone();
        let event_tx = self.event_tx.clone();
        Some(tokio::task::spawn_blocking(move || {
            let mut host = hosts();
            controller.run(&queue, &abort, host.as_mut(), &event_tx)
        }))
    }
}

/// Orchestrate batch runs based on UI commands and emit events back to presentation layers.
pub(crate) async fn run_controller(
    cfg: &RunConfig,
    hosts: HostFactory,
    start_on_launch: bool,
    event_tx: UnboundedSender<BatchEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> anyhow::Result<()> {
    let runner = Runner {
        cfg,
        controller: BatchController::new(cfg.run_id.clone()),
        abort: AbortSignal::new(),
        hosts,
        event_tx: event_tx.clone(),
    };
    let run_state = runner.controller.state_handle();
    let abort = runner.abort.clone();
    let mut handle: Option<RunHandle> = if start_on_launch {
        runner.start(&cfg.scripts, &cfg.scenes, cfg.save_after)
    } else {
        None
    };
    let mut quit_pending = false;
    // Abort watchdog: cancellation is cooperative, so a script that never polls can stall it.
    let mut abort_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Start { scripts, scenes, save_after }) => {
                        if handle.is_some() || run_state.get().is_active() {
                            notify(&event_tx, LogLevel::Warning, "A batch is already running.");
                        } else {
                            handle = runner.start(&scripts, &scenes, save_after);
                        }
                    }
                    Some(UiCommand::Abort) => {
                        if handle.is_some() && !abort.is_requested() {
                            abort.request();
                            notify(&event_tx, LogLevel::Warning, "Abort requested, stopping after the current step…");
                            abort_deadline = Some(tokio::time::Instant::now() + cfg.abort_grace);
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the current run to finish so the host is left in a clean state.
                        quit_pending = true;
                        if handle.is_some() {
                            abort.request();
                            abort_deadline = Some(tokio::time::Instant::now() + cfg.abort_grace);
                        } else {
                            break;
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            join_res = async {
                match handle.as_mut() {
                    Some(h) => h.await,
                    None => futures::future::pending().await,
                }
            } => {
                handle = None;
                abort_deadline = None;
                match join_res {
                    Ok(Ok(r)) => {
                        let _ = event_tx.send(BatchEvent::RunCompleted { result: Box::new(r) });
                    }
                    Ok(Err(e)) => {
                        notify(&event_tx, LogLevel::Error, format!("Run refused: {e}"));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "batch worker failed");
                        notify(&event_tx, LogLevel::Error, format!("Run join failed: {e}"));
                    }
                }
                if quit_pending {
                    break;
                }
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = abort_deadline {
                    if tokio::time::Instant::now() >= deadline
                        && run_state.observe(&abort) == RunState::Aborting
                    {
                        notify(
                            &event_tx,
                            LogLevel::Info,
                            "Still aborting… waiting for the running script to poll abort_requested().",
                        );
                        abort_deadline = None;
                    }
                }
            }
        }
    }

    Ok(())
}
