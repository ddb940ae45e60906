//! Scripted host adapter for controller tests.

use super::HostAdapter;
use crate::engine::AbortSignal;
use crate::error::{LoadError, SaveError, ScriptError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Upper bound for scripts that wait on the abort flag, so a broken test cannot hang.
const WAIT_LIMIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Load(PathBuf),
    Execute(PathBuf),
    Save(PathBuf),
}

impl HostCall {
    pub fn load(p: &str) -> Self {
        HostCall::Load(p.into())
    }

    pub fn execute(p: &str) -> Self {
        HostCall::Execute(p.into())
    }

    pub fn save(p: &str) -> Self {
        HostCall::Save(p.into())
    }
}

/// A script body that polls the abort flag once per iteration, like a well-behaved user script.
#[derive(Debug, Clone)]
struct PollingScript {
    path: PathBuf,
    iterations: usize,
    /// Iteration at which the "UI" raises the abort flag.
    abort_at: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ScriptedHost {
    pub calls: Vec<HostCall>,
    /// Iteration at which the last polling script returned early, if it did.
    pub loop_exit: Option<usize>,
    missing: HashSet<PathBuf>,
    failing_scripts: HashSet<PathBuf>,
    failing_saves: HashSet<PathBuf>,
    abort_after: Vec<(HostCall, AbortSignal)>,
    polling: Vec<PollingScript>,
    waiting: HashSet<PathBuf>,
    stubborn: Vec<(PathBuf, Duration)>,
    loaded: Option<PathBuf>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scene or script paths that do not exist.
    pub fn missing(mut self, path: &str) -> Self {
        self.missing.insert(path.into());
        self
    }

    pub fn failing_script(mut self, path: &str) -> Self {
        self.failing_scripts.insert(path.into());
        self
    }

    pub fn failing_save(mut self, path: &str) -> Self {
        self.failing_saves.insert(path.into());
        self
    }

    /// Raise `signal` right after `call` completes.
    pub fn abort_after(mut self, call: HostCall, signal: &AbortSignal) -> Self {
        self.abort_after.push((call, signal.clone()));
        self
    }

    pub fn polling_script(mut self, path: &str, iterations: usize, abort_at: Option<usize>) -> Self {
        self.polling.push(PollingScript {
            path: path.into(),
            iterations,
            abort_at,
        });
        self
    }

    /// A script that sleeps in small steps until abort is requested.
    pub fn waiting_script(mut self, path: &str) -> Self {
        self.waiting.insert(path.into());
        self
    }

    /// A script that never polls the abort flag and returns after `busy`.
    pub fn stubborn_script(mut self, path: &str, busy: Duration) -> Self {
        self.stubborn.push((path.into(), busy));
        self
    }

    fn record(&mut self, call: HostCall) {
        for (trigger, signal) in &self.abort_after {
            if *trigger == call {
                signal.request();
            }
        }
        self.calls.push(call);
    }

    fn run_polling(&mut self, path: &Path, abort: &AbortSignal) {
        let Some(script) = self.polling.iter().find(|s| s.path == path).cloned() else {
            return;
        };
        for i in 0..script.iterations {
            if script.abort_at == Some(i) {
                abort.request();
            }
            if abort.is_requested() {
                self.loop_exit = Some(i);
                break;
            }
        }
    }
}

impl HostAdapter for ScriptedHost {
    fn load_scene(&mut self, path: &Path) -> Result<(), LoadError> {
        let result = if self.missing.contains(path) {
            self.loaded = None;
            Err(LoadError::NotFound(path.to_path_buf()))
        } else {
            self.loaded = Some(path.to_path_buf());
            Ok(())
        };
        self.record(HostCall::Load(path.to_path_buf()));
        result
    }

    fn execute_script(&mut self, path: &Path, abort: &AbortSignal) -> Result<(), ScriptError> {
        let result = if self.missing.contains(path) {
            Err(ScriptError::NotFound(path.to_path_buf()))
        } else if self.failing_scripts.contains(path) {
            Err(ScriptError::Runtime {
                path: path.to_path_buf(),
                reason: "boom".into(),
            })
        } else {
            self.run_polling(path, abort);
            if self.waiting.contains(path) {
                let started = Instant::now();
                while !abort.is_requested() && started.elapsed() < WAIT_LIMIT {
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
            if let Some((_, busy)) = self.stubborn.iter().find(|(p, _)| p == path) {
                std::thread::sleep(*busy);
            }
            Ok(())
        };
        self.record(HostCall::Execute(path.to_path_buf()));
        result
    }

    fn save_scene(&mut self, path: &Path) -> Result<(), SaveError> {
        let result = if self.loaded.is_none() {
            Err(SaveError::NoSceneLoaded)
        } else if self.failing_saves.contains(path) {
            Err(SaveError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        } else {
            Ok(())
        };
        self.record(HostCall::Save(path.to_path_buf()));
        result
    }
}
