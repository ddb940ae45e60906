use crate::engine::AbortSignal;
use crate::error::StateError;
use crate::model::RunState;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

/// Atomic view of a controller's run state. Written by the controller, read by the UI.
#[derive(Debug, Clone)]
pub struct RunStateHandle {
    state: Arc<AtomicU8>,
}

impl Default for RunStateHandle {
    fn default() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(encode(RunState::Idle))),
        }
    }
}

impl RunStateHandle {
    pub fn get(&self) -> RunState {
        decode(self.state.load(Ordering::SeqCst))
    }

    /// State as the UI should present it: a pending abort request shows as `Aborting` even
    /// before the controller has noticed it.
    pub fn observe(&self, abort: &AbortSignal) -> RunState {
        match self.get() {
            RunState::Running if abort.is_requested() => RunState::Aborting,
            other => other,
        }
    }

    pub(crate) fn set(&self, state: RunState) {
        self.state.store(encode(state), Ordering::SeqCst);
    }

    /// Move into `Running` unless a run is already active.
    pub(crate) fn begin(&self) -> Result<(), StateError> {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if decode(current).is_active() {
                return Err(StateError::AlreadyRunning);
            }
            match self.state.compare_exchange(
                current,
                encode(RunState::Running),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }
}

fn encode(state: RunState) -> u8 {
    match state {
        RunState::Idle => 0,
        RunState::Running => 1,
        RunState::Aborting => 2,
        RunState::Completed => 3,
        RunState::Aborted => 4,
    }
}

fn decode(v: u8) -> RunState {
    match v {
        1 => RunState::Running,
        2 => RunState::Aborting,
        3 => RunState::Completed,
        4 => RunState::Aborted,
        _ => RunState::Idle,
    }
}
