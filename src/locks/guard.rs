/*!
 * Acquisition Guards
 * RAII release for lock wrappers
 */

use super::state::{HoldState, LockStateMachine};
use crate::core::errors::BridgeResult;
use crate::sync::traits::Acquire;
use tracing::warn;

/// Holds a lock wrapper's primitive until released or dropped
///
/// Dropping releases with `force_background_thread`, so a guard obtained from
/// `async_acquire_guard` still releases on the worker that acquired.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct AcquiredGuard<'a, D: Acquire> {
    machine: &'a LockStateMachine<D>,
    released: bool,
}

impl<'a, D: Acquire> AcquiredGuard<'a, D> {
    pub(crate) fn new(machine: &'a LockStateMachine<D>) -> Self {
        Self {
            machine,
            released: false,
        }
    }

    #[inline]
    pub fn state(&self) -> HoldState {
        self.machine.state()
    }

    /// Release now, surfacing any error
    pub fn release(mut self) -> BridgeResult<()> {
        self.released = true;
        self.machine.release(true)
    }

    pub async fn async_release(mut self) -> BridgeResult<()> {
        self.released = true;
        self.machine.async_release(true).await
    }
}

impl<D: Acquire> Drop for AcquiredGuard<'_, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.machine.release(true) {
            warn!(error = %e, "Failed to release lock held by dropped guard");
        }
    }
}
