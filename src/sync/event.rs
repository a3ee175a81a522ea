/*!
 * Event Flag
 */

use super::traits::Wait;
use super::wait_while;
use crate::core::errors::BridgeResult;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Flag that waiters block on until it is set
#[derive(Debug, Default)]
pub struct Event {
    flag: Mutex<bool>,
    changed: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    /// Set the flag and wake every waiter
    pub fn set(&self) {
        *self.flag.lock() = true;
        self.changed.notify_all();
    }

    pub fn clear(&self) {
        *self.flag.lock() = false;
    }
}

impl Wait for Event {
    /// The flag's value on return: `false` only on timeout
    type Output = bool;

    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        let mut flag = self.flag.lock();
        Ok(wait_while(&self.changed, &mut flag, timeout, |set| !*set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_event_set_wakes_waiters() {
        let event = Arc::new(Event::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let event = Arc::clone(&event);
                thread::spawn(move || event.wait(Some(Duration::from_secs(2))))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        event.set();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Ok(true));
        }
    }

    #[test]
    fn test_event_wait_timeout() {
        let event = Event::new();
        assert_eq!(event.wait(Some(Duration::from_millis(10))), Ok(false));
        event.set();
        event.clear();
        assert!(!event.is_set());
    }
}
