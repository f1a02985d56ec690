//! Trailing-edge debounce for rebuild triggers.
//!
//! Every call to [`Debouncer::schedule`] cancels the pending timer and arms a
//! new one, so the trigger fires once, a quiet period after the last call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Quiet period used for ordinary change events.
pub const DEFAULT_QUIET: Duration = Duration::from_millis(300);

/// Quiet period used after rename events, whose delete+create pairs arrive
/// back to back.
pub const RENAME_QUIET: Duration = Duration::from_millis(100);

/// Single-timer debouncer.
///
/// Must be used from inside a tokio runtime.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, replacing any pending one.
    pub fn schedule<F>(&mut self, trigger: F, quiet: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.pending.take() {
            previous.abort();
        }

        let current = Arc::clone(&self.generation);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            // An aborted task can still be past its last await; the
            // generation check keeps a superseded timer from firing.
            if current.load(Ordering::SeqCst) == generation {
                trigger();
            }
        }));
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = self.pending.take() {
            previous.abort();
        }
    }

    /// Whether a timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
