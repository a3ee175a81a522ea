/*!
 * Counting Semaphores
 */

use super::traits::Acquire;
use super::{acquire_timeout, wait_while};
use crate::core::errors::{BridgeResult, DelegateError};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug)]
pub struct Semaphore {
    value: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(value: usize) -> Self {
        Self {
            value: Mutex::new(value),
            available: Condvar::new(),
        }
    }

    pub fn get_value(&self) -> usize {
        *self.value.lock()
    }

    /// Release `n` permits at once
    pub fn release_n(&self, n: usize) -> BridgeResult<()> {
        if n == 0 {
            return Err(DelegateError::InvalidArgument("n must be one or more".into()).into());
        }
        let mut value = self.value.lock();
        *value += n;
        for _ in 0..n {
            self.available.notify_one();
        }
        Ok(())
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Acquire for Semaphore {
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        let timeout = acquire_timeout(blocking, timeout)?;
        let mut value = self.value.lock();

        if !wait_while(&self.available, &mut value, timeout, |v| *v == 0) {
            return Ok(false);
        }
        *value -= 1;
        Ok(true)
    }

    fn release(&self) -> BridgeResult<()> {
        self.release_n(1)
    }
}

/// Semaphore that refuses to be released past its initial value
#[derive(Debug)]
pub struct BoundedSemaphore {
    inner: Semaphore,
    limit: usize,
}

impl BoundedSemaphore {
    pub fn new(value: usize) -> Self {
        Self {
            inner: Semaphore::new(value),
            limit: value,
        }
    }

    pub fn get_value(&self) -> usize {
        self.inner.get_value()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for BoundedSemaphore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Acquire for BoundedSemaphore {
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        self.inner.acquire(blocking, timeout)
    }

    fn release(&self) -> BridgeResult<()> {
        let mut value = self.inner.value.lock();
        if *value >= self.limit {
            return Err(DelegateError::ValueExceeded { limit: self.limit }.into());
        }
        *value += 1;
        self.inner.available.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_semaphore_counts() {
        let sem = Semaphore::new(2);
        assert_eq!(sem.acquire(false, None), Ok(true));
        assert_eq!(sem.acquire(false, None), Ok(true));
        assert_eq!(sem.acquire(false, None), Ok(false));

        // Unbounded: may grow past the initial value
        sem.release_n(3).unwrap();
        assert_eq!(sem.get_value(), 3);
    }

    #[test]
    fn test_bounded_semaphore_overflow() {
        let sem = BoundedSemaphore::new(2);
        assert_eq!(
            sem.release(),
            Err(DelegateError::ValueExceeded { limit: 2 }.into())
        );

        sem.acquire(true, None).unwrap();
        sem.release().unwrap();
        assert_eq!(sem.get_value(), 2);
    }

    #[test]
    fn test_semaphore_wakes_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.acquire(true, Some(Duration::from_secs(2))))
        };

        thread::sleep(Duration::from_millis(20));
        sem.release().unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(true));
    }
}
