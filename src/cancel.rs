//! Cooperative cancellation for provisioning runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::RsprovisionError;

/// Granularity at which sleeps re-check the cancellation flag.
pub(crate) const CANCEL_POLL_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag for one provisioning run.
///
/// Clones share the same flag. The underlying `Arc<AtomicBool>` is exposed
/// through [`flag()`](Self::flag) so signal handlers can raise it directly.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once the flag has been raised.
    pub fn check(&self) -> Result<(), RsprovisionError> {
        if self.is_cancelled() {
            Err(RsprovisionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Returns the raw flag for registration with `signal_hook::flag`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Sleeps for `duration`, waking early if the token is cancelled.
    ///
    /// Returns `false` if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    (deadline - now).min(CANCEL_POLL_SLICE)
                }
                None => CANCEL_POLL_SLICE,
            };
            thread::sleep(slice);
        }
    }
}
