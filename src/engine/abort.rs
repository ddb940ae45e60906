use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cooperative cancellation flag.
///
/// The UI sets it; the controller polls it between items and the host adapter exposes it to
/// running scripts so they can return early from long loops. Nothing is interrupted
/// preemptively.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a previous request before starting a new run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
