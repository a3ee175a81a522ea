/*!
 * Polling Backoff
 *
 * Deadline-bounded polling for delegates whose blocking wait has no native
 * timeout (child process exit, socket readiness across several connections).
 *
 * Rather than sleeping immediately, the loop starts with CPU spin hints and only
 * escalates to yielding and then sleeping if the condition keeps failing.
 */

use super::limits::{BACKOFF_SLEEP, BACKOFF_SPIN_RETRIES, BACKOFF_YIELD_RETRIES};
use std::time::{Duration, Instant};

/// Adaptive backoff: spin → yield → sleep
#[inline(always)]
pub fn adaptive_backoff(retry_count: u32) {
    match retry_count {
        0..=BACKOFF_SPIN_RETRIES => std::hint::spin_loop(),
        n if n <= BACKOFF_YIELD_RETRIES => std::thread::yield_now(),
        _ => std::thread::sleep(BACKOFF_SLEEP),
    }
}

/// Instant `timeout` from now
///
/// `None` for no timeout, and also when the deadline lies past what `Instant`
/// can represent; callers treat both as waiting forever.
pub fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}

/// Poll `probe` until it yields a value or `timeout` elapses
///
/// `None` as timeout polls forever. Errors from the probe end the loop
/// immediately.
pub fn poll_until<T, E>(
    timeout: Option<Duration>,
    mut probe: impl FnMut() -> Result<Option<T>, E>,
) -> Result<Option<T>, E> {
    let deadline = deadline_after(timeout);
    let mut retry_count = 0u32;

    loop {
        if let Some(value) = probe()? {
            return Ok(Some(value));
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }

        adaptive_backoff(retry_count);
        retry_count = retry_count.saturating_add(1);
    }
}
