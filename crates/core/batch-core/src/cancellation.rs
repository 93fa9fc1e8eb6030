//! A single cooperative cancellation signal shared across one operation.
//!
//! Generalizes the teacher's bare `Arc<AtomicBool>` cancellation flag
//! (`infrastructure::batch::BatchProcessor`) with a recorded *cause*, since
//! this spec's tie-break rule ("final status reflects the first triggering
//! cause") cannot be reconstructed from a boolean alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Why cancellation was raised. The first cause to win a race is the one recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller's wall-clock timeout elapsed.
    Timeout,
    /// `fail_fast` fired after a batch failure.
    FailFast,
    /// An external caller requested cancellation.
    External,
}

/// Shared, cloneable cancellation handle. Raising is idempotent: only the
/// first call to [`CancellationSignal::cancel`] records its cause.
#[derive(Clone)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
    cause: Arc<Mutex<Option<CancelCause>>>,
}

impl CancellationSignal {
    /// Create a fresh, not-yet-cancelled signal.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            cause: Arc::new(Mutex::new(None)),
        }
    }

    /// Raise cancellation with `cause`. Idempotent: repeated calls (even with
    /// a different cause) do not change the recorded cause once set (P5).
    pub fn cancel(&self, cause: CancelCause) {
        let mut guard = self.cause.lock().unwrap();
        if guard.is_none() {
            *guard = Some(cause);
        }
        drop(guard);
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The first cause that raised cancellation, if any.
    pub fn cause(&self) -> Option<CancelCause> {
        *self.cause.lock().unwrap()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
