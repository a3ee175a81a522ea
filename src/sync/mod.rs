/*!
 * Synchronization Delegates
 *
 * Local blocking primitives wrapped by the lock bridges:
 * - `Lock` / `RLock`: plain and recursive mutual exclusion
 * - `Semaphore` / `BoundedSemaphore`: counting, optionally capped
 * - `Condition`: FIFO condition variable over an `RLock`
 * - `Event`: one-shot flag with waiters
 * - `Barrier`: cyclic rendezvous for a fixed number of parties
 *
 * All of them are parking_lot `Mutex` + `Condvar` constructions with
 * deadline-based timeouts. Fairness is whatever parking_lot provides; nothing
 * here reorders waiters.
 */

mod barrier;
mod condition;
mod event;
mod lock;
mod semaphore;
pub mod traits;

pub use barrier::{Barrier, BarrierAction};
pub use condition::Condition;
pub use event::Event;
pub use lock::{Lock, RLock};
pub use semaphore::{BoundedSemaphore, Semaphore};
pub use traits::{
    Accept, Acquire, ConditionVar, ConnectionOps, Join, JoinableQueueOps, QueueOps, Wait,
};

use crate::core::backoff::deadline_after;
use crate::core::errors::{BridgeResult, DelegateError};
use parking_lot::{Condvar, MutexGuard};
use std::time::Duration;

/// Timeout to wait with, given an acquire's `blocking` flag
///
/// A non-blocking attempt waits zero time. Combining it with a timeout is
/// rejected, matching the usual acquire contract.
pub(crate) fn acquire_timeout(
    blocking: bool,
    timeout: Option<Duration>,
) -> BridgeResult<Option<Duration>> {
    match (blocking, timeout) {
        (true, timeout) => Ok(timeout),
        (false, None) => Ok(Some(Duration::ZERO)),
        (false, Some(_)) => Err(DelegateError::InvalidArgument(
            "can't specify a timeout for a non-blocking acquire".into(),
        )
        .into()),
    }
}

/// Block on `cond` while `blocked` holds, up to `timeout`
///
/// Returns `true` once `blocked` is false, `false` if the deadline passed first.
pub(crate) fn wait_while<T>(
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    timeout: Option<Duration>,
    mut blocked: impl FnMut(&mut T) -> bool,
) -> bool {
    let deadline = deadline_after(timeout);

    while blocked(guard) {
        match deadline {
            Some(deadline) => {
                if cond.wait_until(guard, deadline).timed_out() {
                    return !blocked(guard);
                }
            }
            None => cond.wait(guard),
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_acquire_timeout_rules() {
        assert_eq!(acquire_timeout(true, None), Ok(None));
        assert_eq!(acquire_timeout(false, None), Ok(Some(Duration::ZERO)));
        assert!(acquire_timeout(false, Some(Duration::from_secs(1))).is_err());
    }

    #[test]
    fn test_wait_while_times_out() {
        let mutex = Mutex::new(true);
        let cond = Condvar::new();
        let mut guard = mutex.lock();
        assert!(!wait_while(&cond, &mut guard, Some(Duration::from_millis(10)), |b| *b));
        *guard = false;
        assert!(wait_while(&cond, &mut guard, Some(Duration::ZERO), |b| *b));
    }

    #[test]
    fn test_wait_while_unrepresentable_timeout_does_not_panic() {
        let mutex = Mutex::new(false);
        let cond = Condvar::new();
        let mut guard = mutex.lock();
        assert!(wait_while(&cond, &mut guard, Some(Duration::MAX), |b| *b));
    }
}
