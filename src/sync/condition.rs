/*!
 * Condition Variable
 *
 * Each waiter parks on its own slot, queued FIFO; `notify(n)` wakes the `n`
 * oldest. Waiting fully releases the (possibly recursively held) lock and
 * restores the same depth on wakeup.
 */

use super::lock::RLock;
use super::traits::{Acquire, ConditionVar};
use super::wait_while;
use crate::core::backoff::deadline_after;
use crate::core::errors::{BridgeResult, DelegateError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Waiter {
    signaled: Mutex<bool>,
    wake: Condvar,
}

#[derive(Debug, Default)]
pub struct Condition {
    lock: RLock,
    waiters: Mutex<VecDeque<Arc<Waiter>>>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Threads currently parked in `wait`
    pub fn waiting(&self) -> usize {
        self.waiters.lock().len()
    }

    fn check_owned(&self, action: &str) -> BridgeResult<()> {
        if self.lock.is_owned_by_current_thread() {
            Ok(())
        } else {
            Err(DelegateError::NotOwner(format!("cannot {} on un-acquired lock", action)).into())
        }
    }
}

impl Acquire for Condition {
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        self.lock.acquire(blocking, timeout)
    }

    fn release(&self) -> BridgeResult<()> {
        self.lock.release()
    }
}

impl ConditionVar for Condition {
    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        self.check_owned("wait")?;

        let waiter = Arc::new(Waiter::default());
        self.waiters.lock().push_back(Arc::clone(&waiter));

        let saved = self.lock.release_save()?;
        {
            let mut signaled = waiter.signaled.lock();
            wait_while(&waiter.wake, &mut signaled, timeout, |s| !*s);
        }
        self.lock.acquire_restore(saved);

        // A notify may land between the timeout and reacquiring the lock
        let notified = *waiter.signaled.lock();
        if !notified {
            self.waiters.lock().retain(|w| !Arc::ptr_eq(w, &waiter));
        }
        Ok(notified)
    }

    fn wait_for<P>(&self, mut predicate: P, timeout: Option<Duration>) -> BridgeResult<bool>
    where
        P: FnMut() -> bool,
    {
        let deadline = deadline_after(timeout);
        let mut result = predicate();

        while !result {
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    Some(remaining)
                }
                None => None,
            };
            self.wait(remaining)?;
            result = predicate();
        }
        Ok(result)
    }

    fn notify(&self, n: usize) -> BridgeResult<()> {
        self.check_owned("notify")?;

        let mut waiters = self.waiters.lock();
        for _ in 0..n {
            let Some(waiter) = waiters.pop_front() else {
                break;
            };
            *waiter.signaled.lock() = true;
            waiter.wake.notify_one();
        }
        Ok(())
    }

    fn notify_all(&self) -> BridgeResult<()> {
        self.notify(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_wait_requires_lock() {
        let cond = Condition::new();
        let err = cond.wait(Some(Duration::from_millis(1))).unwrap_err();
        assert!(matches!(err.delegate(), Some(DelegateError::NotOwner(_))));
        assert!(cond.notify(1).is_err());
    }

    #[test]
    fn test_wait_times_out_and_keeps_lock() {
        let cond = Condition::new();
        cond.acquire(true, None).unwrap();
        cond.acquire(true, None).unwrap();

        assert_eq!(cond.wait(Some(Duration::from_millis(10))), Ok(false));
        assert_eq!(cond.lock.count(), 2);
        assert_eq!(cond.waiting(), 0);
    }

    #[test]
    fn test_wait_for_with_unrepresentable_timeout() {
        let cond = Condition::new();
        cond.acquire(true, None).unwrap();
        assert_eq!(cond.wait_for(|| true, Some(Duration::MAX)), Ok(true));
        cond.release().unwrap();
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let cond = Arc::new(Condition::new());
        let ready = Arc::new(AtomicBool::new(false));

        let waiter = {
            let cond = Arc::clone(&cond);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                cond.acquire(true, None).unwrap();
                let flag = Arc::clone(&ready);
                let result = cond
                    .wait_for(move || flag.load(Ordering::SeqCst), Some(Duration::from_secs(2)));
                cond.release().unwrap();
                result
            })
        };

        while cond.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        cond.acquire(true, None).unwrap();
        ready.store(true, Ordering::SeqCst);
        cond.notify_all().unwrap();
        cond.release().unwrap();

        assert_eq!(waiter.join().unwrap(), Ok(true));
    }
}
