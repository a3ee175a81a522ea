/*!
 * Mutual Exclusion
 */

use super::traits::Acquire;
use super::{acquire_timeout, wait_while};
use crate::core::errors::{BridgeResult, DelegateError};
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Non-recursive lock
///
/// Any thread may release it, not only the one that acquired it.
#[derive(Debug, Default)]
pub struct Lock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl Lock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locked(&self) -> bool {
        *self.locked.lock()
    }
}

impl Acquire for Lock {
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        let timeout = acquire_timeout(blocking, timeout)?;
        let mut locked = self.locked.lock();

        if !wait_while(&self.released, &mut locked, timeout, |held| *held) {
            return Ok(false);
        }
        *locked = true;
        Ok(true)
    }

    fn release(&self) -> BridgeResult<()> {
        let mut locked = self.locked.lock();
        if !*locked {
            return Err(DelegateError::ReleaseUnlocked.into());
        }
        *locked = false;
        self.released.notify_one();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    count: usize,
}

/// Recursive lock owned by the thread that acquired it
///
/// Only the owning thread may release. This is the primitive whose thread
/// affinity the lock bridges exist to respect.
#[derive(Debug, Default)]
pub struct RLock {
    state: Mutex<Ownership>,
    released: Condvar,
}

impl RLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_owned_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Recursion depth held by the owner
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Fully release the lock, returning the recursion depth to restore later
    pub(crate) fn release_save(&self) -> BridgeResult<usize> {
        let mut state = self.state.lock();
        if state.owner != Some(thread::current().id()) {
            return Err(not_owner("cannot wait on un-acquired lock"));
        }
        let count = state.count;
        state.owner = None;
        state.count = 0;
        self.released.notify_one();
        Ok(count)
    }

    /// Reacquire after [`release_save`](Self::release_save), blocking as long as needed
    pub(crate) fn acquire_restore(&self, count: usize) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        wait_while(&self.released, &mut state, None, |s| s.owner.is_some());
        state.owner = Some(me);
        state.count = count;
    }
}

impl Acquire for RLock {
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        let timeout = acquire_timeout(blocking, timeout)?;
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.count += 1;
            return Ok(true);
        }

        if !wait_while(&self.released, &mut state, timeout, |s| s.owner.is_some()) {
            return Ok(false);
        }
        state.owner = Some(me);
        state.count = 1;
        Ok(true)
    }

    fn release(&self) -> BridgeResult<()> {
        let mut state = self.state.lock();
        if state.owner != Some(thread::current().id()) {
            return Err(not_owner("cannot release un-acquired lock"));
        }

        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            self.released.notify_one();
        }
        Ok(())
    }
}

fn not_owner(message: &str) -> crate::core::errors::BridgeError {
    let thread = thread::current();
    let name = thread.name().unwrap_or("unnamed");
    DelegateError::NotOwner(format!("{} (thread {})", message, name)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lock_acquire_release() {
        let lock = Lock::new();
        assert_eq!(lock.acquire(true, None), Ok(true));
        assert!(lock.locked());
        assert_eq!(lock.acquire(false, None), Ok(false));
        assert_eq!(lock.acquire(true, Some(Duration::from_millis(10))), Ok(false));
        lock.release().unwrap();
        assert!(!lock.locked());
    }

    #[test]
    fn test_lock_release_unlocked() {
        let lock = Lock::new();
        assert_eq!(lock.release(), Err(DelegateError::ReleaseUnlocked.into()));
    }

    #[test]
    fn test_lock_released_by_other_thread() {
        let lock = Arc::new(Lock::new());
        lock.acquire(true, None).unwrap();

        let other = Arc::clone(&lock);
        thread::spawn(move || other.release()).join().unwrap().unwrap();
        assert!(!lock.locked());
    }

    #[test]
    fn test_rlock_is_recursive() {
        let rlock = RLock::new();
        assert_eq!(rlock.acquire(true, None), Ok(true));
        assert_eq!(rlock.acquire(false, None), Ok(true));
        assert_eq!(rlock.count(), 2);

        rlock.release().unwrap();
        assert!(rlock.is_owned_by_current_thread());
        rlock.release().unwrap();
        assert!(!rlock.is_owned_by_current_thread());
    }

    #[test]
    fn test_rlock_rejects_foreign_release() {
        let rlock = Arc::new(RLock::new());
        rlock.acquire(true, None).unwrap();

        let other = Arc::clone(&rlock);
        let result = thread::spawn(move || other.release()).join().unwrap();
        assert!(matches!(
            result.unwrap_err().delegate(),
            Some(DelegateError::NotOwner(_))
        ));

        let other = Arc::clone(&rlock);
        let acquired = thread::spawn(move || other.acquire(false, None)).join().unwrap();
        assert_eq!(acquired, Ok(false));
        rlock.release().unwrap();
    }
}
