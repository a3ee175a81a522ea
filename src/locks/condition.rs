/*!
 * Condition Wrapper
 *
 * Lock state machine over a [`Condition`], plus offloaded waits and
 * notifications through [`AsyncCondition`]. Waits run on the same single
 * worker as `async_acquire`, so a background hold can be waited on; they
 * never change the hold state.
 */

use super::guard::AcquiredGuard;
use super::state::{HoldState, LockStateMachine};
use crate::capability::{AsyncCondition, Bridge, Capability, CONDITION};
use crate::context::{Context, FromContext};
use crate::core::errors::BridgeResult;
use crate::executor::{Executor, Transfer};
use crate::sync::Condition;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

pub struct AioCondition {
    machine: LockStateMachine<Condition>,
}

impl AioCondition {
    pub fn from_delegate(delegate: Condition) -> Self {
        Self {
            machine: LockStateMachine::new(Arc::new(delegate), &CONDITION),
        }
    }

    pub fn with_context(ctx: &Context) -> BridgeResult<Self> {
        Ok(Self::from_delegate(Condition::from_context(ctx, ())?))
    }

    pub fn new() -> BridgeResult<Self> {
        Self::with_context(&Context::default())
    }

    #[inline]
    pub fn state(&self) -> HoldState {
        self.machine.state()
    }

    pub fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        self.machine.acquire(blocking, timeout)
    }

    pub fn async_acquire(
        &self,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<bool>> + Send + 'static {
        self.machine.async_acquire(blocking, timeout)
    }

    pub fn release(&self, force_background_thread: bool) -> BridgeResult<()> {
        self.machine.release(force_background_thread)
    }

    pub fn async_release(
        &self,
        force_background_thread: bool,
    ) -> impl Future<Output = BridgeResult<()>> + Send + 'static {
        self.machine.async_release(force_background_thread)
    }

    pub fn acquire_guard(&self) -> BridgeResult<AcquiredGuard<'_, Condition>> {
        self.machine.acquire(true, None)?;
        Ok(AcquiredGuard::new(&self.machine))
    }

    pub async fn async_acquire_guard(&self) -> BridgeResult<AcquiredGuard<'_, Condition>> {
        self.machine.async_acquire(true, None).await?;
        Ok(AcquiredGuard::new(&self.machine))
    }
}

impl Bridge for AioCondition {
    type Delegate = Condition;

    const CAPABILITY: &'static Capability = &CONDITION;

    fn delegate(&self) -> &Arc<Condition> {
        self.machine.delegate()
    }

    fn executor(&self) -> &Executor {
        self.machine.executor()
    }
}

impl AsyncCondition for AioCondition {}

impl Deref for AioCondition {
    type Target = Condition;

    fn deref(&self) -> &Condition {
        self.machine.delegate()
    }
}

impl Clone for AioCondition {
    fn clone(&self) -> Self {
        Self {
            machine: self.machine.transfer_copy(),
        }
    }
}

impl Transfer for AioCondition {
    fn prepare_for_transfer(&self) {
        self.machine.executor().prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.machine.reset_after_transfer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::traits::ConditionVar;

    #[tokio::test]
    async fn test_background_wait_keeps_hold_state() {
        let cond = AioCondition::new().unwrap();
        assert!(cond.async_acquire(true, None).await.unwrap());

        let notified = cond.async_wait(Some(Duration::from_millis(10))).await.unwrap();
        assert!(!notified);
        assert_eq!(cond.state(), HoldState::HeldBackground);

        cond.async_notify_all().await.unwrap();
        cond.async_release(false).await.unwrap();
        assert_eq!(cond.state(), HoldState::Idle);
    }

    #[test]
    fn test_foreground_wait_for() {
        let cond = AioCondition::new().unwrap();
        cond.acquire(true, None).unwrap();
        assert_eq!(cond.wait_for(|| true, None), Ok(true));
        assert_eq!(cond.wait_for(|| false, Some(Duration::from_millis(5))), Ok(false));
        cond.release(false).unwrap();
    }
}
