mod abort;
mod run_state;

pub use abort::AbortSignal;
pub use run_state::RunStateHandle;

use crate::error::StateError;
use crate::host::HostAdapter;
use crate::model::{
    BatchEvent, FailedItem, FailureKind, LogEntry, LogLevel, Progress, RunResult, RunState,
    WorkItem, WorkQueue,
};
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;

/// Drives a host adapter through a work queue.
///
/// One controller owns one run state. Clones share it, so a second `run` on any clone while a
/// run is active fails with [`StateError::AlreadyRunning`].
#[derive(Debug, Clone)]
pub struct BatchController {
    run_id: String,
    state: RunStateHandle,
}

enum ItemOutcome {
    /// The item went through every step it could; failures are already recorded.
    Done,
    /// The abort flag was raised while the script ran.
    Interrupted,
}

impl BatchController {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: RunStateHandle::default(),
        }
    }

    pub fn state_handle(&self) -> RunStateHandle {
        self.state.clone()
    }

    /// Process `queue` in order. Per-item failures are logged and recorded, never returned;
    /// the batch stops early only when `abort` is raised.
    pub fn run<H: HostAdapter + ?Sized>(
        &self,
        queue: &WorkQueue,
        abort: &AbortSignal,
        host: &mut H,
        event_tx: &mpsc::UnboundedSender<BatchEvent>,
    ) -> Result<RunResult, StateError> {
        self.state.begin()?;

        let mut run = RunCtx {
            event_tx,
            state: &self.state,
            started: Instant::now(),
            total: queue.len(),
            processed: 0,
            failed: Vec::new(),
        };
        run.emit_state(RunState::Running);
        run.log(
            LogLevel::Info,
            format!(
                "Starting processing of {} work items ({} scene files, {} script files).",
                queue.len(),
                queue.scene_count(),
                queue.script_count()
            ),
        );
        tracing::info!(run_id = %self.run_id, items = queue.len(), "batch run started");

        let mut loaded: Option<PathBuf> = None;
        let mut aborted = false;
        for (index, item) in queue.iter().enumerate() {
            if abort.is_requested() {
                aborted = true;
                break;
            }
            match run.process(index, item, abort, &mut *host, &mut loaded) {
                ItemOutcome::Done => {
                    run.processed += 1;
                    run.emit_progress();
                }
                ItemOutcome::Interrupted => {
                    aborted = true;
                    break;
                }
            }
        }

        if aborted {
            run.emit_state(RunState::Aborting);
            run.log(
                LogLevel::Warning,
                format!(
                    "Processing aborted at {:.1}%.",
                    crate::metrics::percent(run.processed, run.total)
                ),
            );
            run.emit_state(RunState::Aborted);
        } else {
            if run.failed.is_empty() {
                run.log(LogLevel::Info, "Processing finished successfully.");
            } else {
                run.log(
                    LogLevel::Warning,
                    "Processing completed with errors. Check the log for details.",
                );
            }
            run.emit_state(RunState::Completed);
        }

        let elapsed = run.started.elapsed();
        tracing::info!(
            run_id = %self.run_id,
            processed = run.processed,
            failed = run.failed.len(),
            aborted,
            ?elapsed,
            "batch run finished"
        );

        Ok(RunResult {
            run_id: self.run_id.clone(),
            timestamp_utc: crate::model::utc_timestamp(),
            total_items: run.total,
            processed_items: run.processed,
            failed_items: run.failed,
            aborted,
            elapsed,
        })
    }
}

/// Per-run bookkeeping and event emission.
struct RunCtx<'a> {
    event_tx: &'a mpsc::UnboundedSender<BatchEvent>,
    state: &'a RunStateHandle,
    started: Instant,
    total: usize,
    processed: usize,
    failed: Vec<FailedItem>,
}

impl RunCtx<'_> {
    fn process<H: HostAdapter + ?Sized>(
        &mut self,
        index: usize,
        item: &WorkItem,
        abort: &AbortSignal,
        host: &mut H,
        loaded: &mut Option<PathBuf>,
    ) -> ItemOutcome {
        let reuse = item.reuse_scene && loaded.as_deref() == Some(item.scene.as_path());
        if !reuse {
            self.log(
                LogLevel::Loading,
                format!("Loading scene file: {}", item.scene.display()),
            );
            if let Err(e) = host.load_scene(&item.scene) {
                *loaded = None;
                self.fail(index, item, FailureKind::Load, e);
                return ItemOutcome::Done;
            }
            *loaded = Some(item.scene.clone());
        }

        self.log(
            LogLevel::Running,
            format!("Running script file: {}", item.script.display()),
        );
        if let Err(e) = host.execute_script(&item.script, abort) {
            self.fail(index, item, FailureKind::Script, e);
            // A shared scene still carries the work of the earlier scripts in its group.
            if reuse && item.save_after && !abort.is_requested() {
                self.save(index, item, host);
            }
            return ItemOutcome::Done;
        }
        if abort.is_requested() {
            self.log(
                LogLevel::Warning,
                format!("Execution aborted during script: {}", item.script.display()),
            );
            return ItemOutcome::Interrupted;
        }

        if item.save_after {
            self.save(index, item, host);
        }
        ItemOutcome::Done
    }

    fn save<H: HostAdapter + ?Sized>(&mut self, index: usize, item: &WorkItem, host: &mut H) {
        self.log(
            LogLevel::Saving,
            format!("Saving scene file: {}", item.scene.display()),
        );
        if let Err(e) = host.save_scene(&item.scene) {
            self.fail(index, item, FailureKind::Save, e);
        }
    }

    fn fail(&mut self, index: usize, item: &WorkItem, kind: FailureKind, err: impl Display) {
        let message = err.to_string();
        let (verb, path) = match kind {
            FailureKind::Load => ("loading", &item.scene),
            FailureKind::Script => ("executing", &item.script),
            FailureKind::Save => ("saving", &item.scene),
        };
        tracing::warn!(index, %kind, error = %message, "work item failed");
        self.log(
            LogLevel::Error,
            format!("Error {verb} '{}': {message}", path.display()),
        );
        self.failed.push(FailedItem {
            index,
            item: item.clone(),
            kind,
            message,
        });
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        tracing::debug!(level = %entry.level, "{}", entry.message);
        let _ = self.event_tx.send(BatchEvent::Log(entry));
    }

    fn emit_state(&self, state: RunState) {
        self.state.set(state);
        let _ = self.event_tx.send(BatchEvent::StateChanged { state });
    }

    fn emit_progress(&self) {
        let elapsed = self.started.elapsed();
        let _ = self.event_tx.send(BatchEvent::Progress(Progress {
            processed: self.processed,
            total: self.total,
            elapsed,
            eta: crate::metrics::estimate_remaining(elapsed, self.processed, self.total),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::host::mock::{HostCall, ScriptedHost};
    use crate::queue::{build_with, Pairing};
    use std::path::Path;

    fn queue(scripts: &[&str], scenes: &[&str], save: bool) -> WorkQueue {
        let scripts: Vec<PathBuf> = scripts.iter().map(PathBuf::from).collect();
        let scenes: Vec<PathBuf> = scenes.iter().map(PathBuf::from).collect();
        WorkQueue::build(&scripts, &scenes, save)
    }

    fn run_collect(
        controller: &BatchController,
        q: &WorkQueue,
        abort: &AbortSignal,
        host: &mut ScriptedHost,
    ) -> (RunResult, Vec<BatchEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = controller.run(q, abort, host, &tx).unwrap();
        drop(tx);
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        (result, events)
    }

    fn logs(events: &[BatchEvent]) -> Vec<LogEntry> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Log(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    fn states(events: &[BatchEvent]) -> Vec<RunState> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn full_run_loads_runs_and_saves_each_item_in_order() {
        let q = queue(&["a.ms", "b.ms"], &["x.max", "y.max"], true);
        let controller = BatchController::new("run-1");
        let mut host = ScriptedHost::new();

        let (result, events) = run_collect(&controller, &q, &AbortSignal::new(), &mut host);

        assert_eq!(result.total_items, 2);
        assert_eq!(result.processed_items, 2);
        assert!(result.failed_items.is_empty());
        assert!(!result.aborted);
        assert_eq!(
            host.calls,
            vec![
                HostCall::load("x.max"),
                HostCall::execute("a.ms"),
                HostCall::save("x.max"),
                HostCall::load("y.max"),
                HostCall::execute("b.ms"),
                HostCall::save("y.max"),
            ]
        );

        let steps: Vec<(LogLevel, String)> = logs(&events)
            .into_iter()
            .filter(|e| {
                matches!(
                    e.level,
                    LogLevel::Loading | LogLevel::Running | LogLevel::Saving
                )
            })
            .map(|e| (e.level, e.message))
            .collect();
        assert_eq!(
            steps,
            vec![
                (LogLevel::Loading, "Loading scene file: x.max".to_string()),
                (LogLevel::Running, "Running script file: a.ms".to_string()),
                (LogLevel::Saving, "Saving scene file: x.max".to_string()),
                (LogLevel::Loading, "Loading scene file: y.max".to_string()),
                (LogLevel::Running, "Running script file: b.ms".to_string()),
                (LogLevel::Saving, "Saving scene file: y.max".to_string()),
            ]
        );
        assert_eq!(states(&events), vec![RunState::Running, RunState::Completed]);
        assert_eq!(controller.state_handle().get(), RunState::Completed);
    }

    #[test]
    fn no_save_step_without_save_flag() {
        let q = queue(&["a.ms"], &["x.max"], false);
        let mut host = ScriptedHost::new();
        let (result, events) =
            run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

        assert_eq!(result.processed_items, 1);
        assert!(!host.calls.contains(&HostCall::save("x.max")));
        assert!(logs(&events).iter().all(|e| e.level != LogLevel::Saving));
    }

    #[test]
    fn progress_is_reported_after_every_item() {
        let q = queue(&["a", "b", "c"], &["x", "y", "z"], false);
        let mut host = ScriptedHost::new();
        let (_, events) =
            run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

        let progress: Vec<(usize, usize)> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress(p) => Some((p.processed, p.total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn missing_scene_fails_only_that_item() {
        let q = queue(&["a.ms", "b.ms"], &["x.max", "y.max"], true);
        let mut host = ScriptedHost::new().missing("y.max");
        let (result, events) =
            run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

        assert_eq!(result.total_items, 2);
        assert_eq!(result.processed_items, 2);
        assert!(!result.aborted);
        assert_eq!(result.failed_items.len(), 1);
        let failed = &result.failed_items[0];
        assert_eq!(failed.index, 1);
        assert_eq!(failed.item, q.items()[1]);
        assert_eq!(failed.kind, FailureKind::Load);

        // Neither the script nor the save runs against a scene that failed to load.
        assert!(!host.calls.contains(&HostCall::execute("b.ms")));
        assert!(!host.calls.contains(&HostCall::save("y.max")));

        let entries = logs(&events);
        assert!(entries
            .iter()
            .any(|e| e.level == LogLevel::Error && e.message.contains("y.max")));
        assert_eq!(
            entries.last().map(|e| e.message.as_str()),
            Some("Processing completed with errors. Check the log for details.")
        );
    }

    #[test]
    fn a_failure_at_any_stage_does_not_stop_the_batch() {
        let cases = [
            (ScriptedHost::new().missing("y"), FailureKind::Load),
            (ScriptedHost::new().failing_script("b"), FailureKind::Script),
            (ScriptedHost::new().failing_save("y"), FailureKind::Save),
        ];
        for (mut host, kind) in cases {
            let q = queue(&["a", "b", "c"], &["x", "y", "z"], true);
            let (result, _) =
                run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

            assert_eq!(result.processed_items, 3, "{kind}");
            assert_eq!(result.failed_items.len(), 1, "{kind}");
            assert_eq!(result.failed_items[0].index, 1, "{kind}");
            assert_eq!(result.failed_items[0].kind, kind);
            assert!(host.calls.contains(&HostCall::execute("c")), "{kind}");
            assert!(host.calls.contains(&HostCall::save("z")), "{kind}");
        }
    }

    #[test]
    fn abort_before_start_processes_nothing() {
        let q = queue(&["a", "b"], &["x", "y"], true);
        let abort = AbortSignal::new();
        abort.request();
        let mut host = ScriptedHost::new();
        let (result, events) = run_collect(&BatchController::new("r"), &q, &abort, &mut host);

        assert!(result.aborted);
        assert_eq!(result.processed_items, 0);
        assert_eq!(result.remaining_items(), 2);
        assert!(host.calls.is_empty());
        assert_eq!(
            states(&events),
            vec![RunState::Running, RunState::Aborting, RunState::Aborted]
        );
    }

    #[test]
    fn abort_after_first_save_stops_before_second_item() {
        let q = queue(&["a.ms", "b.ms"], &["x.max", "y.max"], true);
        let abort = AbortSignal::new();
        let mut host = ScriptedHost::new().abort_after(HostCall::save("x.max"), &abort);
        let controller = BatchController::new("r");
        let (result, events) = run_collect(&controller, &q, &abort, &mut host);

        assert_eq!(result.total_items, 2);
        assert_eq!(result.processed_items, 1);
        assert!(result.failed_items.is_empty());
        assert!(result.aborted);
        assert!(!host.calls.contains(&HostCall::load("y.max")));
        assert_eq!(controller.state_handle().get(), RunState::Aborted);
        assert!(logs(&events)
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.message == "Processing aborted at 50.0%."));
    }

    #[test]
    fn abort_before_item_k_attempts_nothing_after_it() {
        let q = queue(&["a", "b", "c", "d"], &["w", "x", "y", "z"], false);
        let abort = AbortSignal::new();
        // Raised after item 2 (index 1) finishes, i.e. before item k = 3.
        let mut host = ScriptedHost::new().abort_after(HostCall::execute("b"), &abort);
        let (result, _) = run_collect(&BatchController::new("r"), &q, &abort, &mut host);

        assert!(result.aborted);
        assert!(result.processed_items < q.len());
        for later in ["y", "z"] {
            assert!(!host.calls.contains(&HostCall::load(later)));
        }
    }

    #[test]
    fn cooperating_script_returns_early_and_item_is_not_saved() {
        let q = queue(&["a", "long"], &["x", "y"], true);
        let abort = AbortSignal::new();
        let mut host = ScriptedHost::new().polling_script("long", 1_000, Some(10));
        let (result, events) = run_collect(&BatchController::new("r"), &q, &abort, &mut host);

        assert_eq!(host.loop_exit, Some(10));
        assert!(result.aborted);
        assert_eq!(result.processed_items, 1);
        assert!(!host.calls.contains(&HostCall::save("y")));
        assert!(logs(&events)
            .iter()
            .any(|e| e.message == "Execution aborted during script: long"));
    }

    #[test]
    fn abort_after_last_item_is_a_normal_completion() {
        let q = queue(&["a"], &["x"], true);
        let abort = AbortSignal::new();
        let mut host = ScriptedHost::new().abort_after(HostCall::save("x"), &abort);
        let (result, _) = run_collect(&BatchController::new("r"), &q, &abort, &mut host);

        assert!(!result.aborted);
        assert_eq!(result.processed_items, 1);
    }

    #[test]
    fn cross_product_reuses_loaded_scene_and_saves_once() {
        let scripts = vec![PathBuf::from("a"), PathBuf::from("b")];
        let scenes = vec![PathBuf::from("x"), PathBuf::from("y")];
        let q = build_with(Pairing::CrossProduct, &scripts, &scenes, true).unwrap();
        let mut host = ScriptedHost::new();
        let (result, _) =
            run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

        assert_eq!(result.processed_items, 4);
        assert_eq!(
            host.calls,
            vec![
                HostCall::load("x"),
                HostCall::execute("a"),
                HostCall::execute("b"),
                HostCall::save("x"),
                HostCall::load("y"),
                HostCall::execute("a"),
                HostCall::execute("b"),
                HostCall::save("y"),
            ]
        );
    }

    #[test]
    fn cross_product_saves_group_when_last_script_fails() {
        let scripts = vec![PathBuf::from("a"), PathBuf::from("b")];
        let scenes = vec![PathBuf::from("x")];
        let q = build_with(Pairing::CrossProduct, &scripts, &scenes, true).unwrap();
        let mut host = ScriptedHost::new().failing_script("b");
        let (result, events) =
            run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

        assert_eq!(
            host.calls,
            vec![
                HostCall::load("x"),
                HostCall::execute("a"),
                HostCall::execute("b"),
                HostCall::save("x"),
            ]
        );
        assert_eq!(result.processed_items, 2);
        assert_eq!(result.failed_items.len(), 1);
        assert_eq!(result.failed_items[0].kind, FailureKind::Script);
        assert!(logs(&events)
            .iter()
            .any(|e| e.level == LogLevel::Saving && e.message.ends_with('x')));
    }

    #[test]
    fn positional_script_failure_skips_save() {
        let q = queue(&["a"], &["x"], true);
        let mut host = ScriptedHost::new().failing_script("a");
        run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

        assert_eq!(host.calls, vec![HostCall::load("x"), HostCall::execute("a")]);
    }

    #[test]
    fn cross_product_reloads_after_failed_load() {
        let scripts = vec![PathBuf::from("a"), PathBuf::from("b")];
        let scenes = vec![PathBuf::from("x")];
        let q = build_with(Pairing::CrossProduct, &scripts, &scenes, false).unwrap();
        let mut host = ScriptedHost::new().missing("x");
        let (result, _) =
            run_collect(&BatchController::new("r"), &q, &AbortSignal::new(), &mut host);

        assert_eq!(result.failed_items.len(), 2);
        assert!(result
            .failed_items
            .iter()
            .all(|f| f.kind == FailureKind::Load));
        assert_eq!(host.calls, vec![HostCall::load("x"), HostCall::load("x")]);
    }

    #[test]
    fn controller_can_run_again_after_completion() {
        let q = queue(&["a"], &["x"], false);
        let controller = BatchController::new("r");
        let mut host = ScriptedHost::new();
        run_collect(&controller, &q, &AbortSignal::new(), &mut host);
        let (second, _) = run_collect(&controller, &q, &AbortSignal::new(), &mut host);
        assert_eq!(second.processed_items, 1);
    }

    /// Host that tries to start another run on the same controller from inside a host call.
    struct ReentrantHost {
        controller: BatchController,
        nested: Option<Result<RunResult, StateError>>,
    }

    impl HostAdapter for ReentrantHost {
        fn load_scene(&mut self, _path: &Path) -> Result<(), LoadError> {
            let (tx, _rx) = mpsc::unbounded_channel();
            let q = queue(&["a"], &["x"], false);
            let controller = self.controller.clone();
            let mut inner = ScriptedHost::new();
            self.nested = Some(controller.run(&q, &AbortSignal::new(), &mut inner, &tx));
            Ok(())
        }

        fn execute_script(
            &mut self,
            _path: &Path,
            _abort: &AbortSignal,
        ) -> Result<(), crate::error::ScriptError> {
            Ok(())
        }

        fn save_scene(&mut self, _path: &Path) -> Result<(), crate::error::SaveError> {
            Ok(())
        }
    }

    #[test]
    fn reentrant_run_is_a_state_error() {
        let controller = BatchController::new("r");
        let mut host = ReentrantHost {
            controller: controller.clone(),
            nested: None,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let outer = controller
            .run(&queue(&["a"], &["x"], false), &AbortSignal::new(), &mut host, &tx)
            .unwrap();

        assert_eq!(outer.processed_items, 1);
        assert!(matches!(host.nested, Some(Err(StateError::AlreadyRunning))));
    }
}
