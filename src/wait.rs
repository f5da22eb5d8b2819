//! Readiness polling with bounded backoff.
//!
//! [`wait_for()`] repeatedly invokes a boolean probe until it succeeds, the
//! total wait exceeds the configured ceiling, or the run is cancelled. This
//! is the only place a provisioning run loops with delay.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::RsprovisionError;

/// Configuration for [`wait_for()`].
#[derive(Clone, Debug, PartialEq)]
pub struct WaitConfig {
    /// Delay between the first and second attempt
    pub interval: Duration,
    /// Ceiling on total elapsed time
    pub timeout: Duration,
    /// Multiplier applied to the delay after each miss (1.0 = fixed interval)
    pub backoff_multiplier: f64,
    /// Upper bound on the delay between attempts
    pub max_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(180),
            backoff_multiplier: 1.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

impl WaitConfig {
    /// Create a fixed-interval config.
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            backoff_multiplier: 1.0,
            max_interval: interval,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return delay;
        }
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_interval.as_secs_f64()),
        )
    }
}

/// Polls `probe` until it returns true.
///
/// The probe runs immediately; a `true` result returns without sleeping.
/// A `false` result means "not ready yet". Between attempts the poller
/// sleeps for the current delay, clipped to the time left before the
/// ceiling, waking early on cancellation.
///
/// # Errors
///
/// - [`RsprovisionError::ReadinessTimeout`] once the ceiling has passed
///   without a successful probe.
/// - [`RsprovisionError::Cancelled`] if the token is raised before or
///   during the wait.
pub fn wait_for<F>(
    config: &WaitConfig,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<(), RsprovisionError>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let mut delay = config.interval;
    let mut attempts = 0u32;

    loop {
        cancel.check()?;

        attempts += 1;
        if probe() {
            debug!(attempts = attempts, "readiness probe succeeded");
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            return Err(RsprovisionError::ReadinessTimeout {
                timeout: config.timeout,
                attempts,
            });
        }

        let sleep_for = delay.min(config.timeout - elapsed);
        debug!(
            attempts = attempts,
            delay_ms = sleep_for.as_millis(),
            "readiness probe not ready, retrying"
        );
        if !cancel.sleep(sleep_for) {
            return Err(RsprovisionError::Cancelled);
        }

        delay = config.next_delay(delay);
    }
}
