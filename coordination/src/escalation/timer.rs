//! Timer Service: single-shot delayed callbacks with idempotent cancel
//!
//! Cancellation is best-effort: a callback that already started (or already
//! posted its message) is not recalled. Consumers must tolerate a fire that
//! arrives after they cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;

/// Callback run once when a timer elapses
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules delayed callbacks
pub trait TimerService: Send + Sync {
    /// Run `callback` once after `after`, unless cancelled first
    fn schedule(&self, after: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Handle to a scheduled timer.
///
/// `cancel` may be called any number of times, before or after the timer
/// fired; extra calls are no-ops.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    /// `cancelled` is shared with the scheduled task, which must check it before firing
    pub fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Timer cancelled");
        }
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// True once the timer either fired or was cancelled
    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Timer service backed by `tokio::time::sleep` on spawned tasks.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioTimerService;

impl TokioTimerService {
    pub fn new() -> Self {
        Self
    }
}

impl TimerService for TokioTimerService {
    fn schedule(&self, after: Duration, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if !flag.swap(true, Ordering::SeqCst) {
                callback();
            }
        });
        TimerHandle::new(cancelled, Some(task.abort_handle()))
    }
}
