/*!
 * Lock Wrappers
 *
 * `AioAcquirer<D>` wraps any [`Acquire`] delegate with the lock state machine.
 * Its `acquire`/`release` shadow the delegate's; everything else the delegate
 * offers is reachable through `Deref`.
 */

use super::guard::AcquiredGuard;
use super::state::{HoldState, LockStateMachine};
use crate::capability::{Bridge, Capability, LOCK};
use crate::context::{Context, FromContext};
use crate::core::errors::BridgeResult;
use crate::executor::{Executor, Transfer};
use crate::sync::traits::Acquire;
use crate::sync::{BoundedSemaphore, Lock, RLock, Semaphore};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

pub type AioLock = AioAcquirer<Lock>;
pub type AioRLock = AioAcquirer<RLock>;
pub type AioSemaphore = AioAcquirer<Semaphore>;
pub type AioBoundedSemaphore = AioAcquirer<BoundedSemaphore>;

pub struct AioAcquirer<D: Acquire> {
    machine: LockStateMachine<D>,
}

impl<D: Acquire> AioAcquirer<D> {
    pub fn from_delegate(delegate: D) -> Self {
        Self::from_arc(Arc::new(delegate))
    }

    pub fn from_arc(delegate: Arc<D>) -> Self {
        Self {
            machine: LockStateMachine::new(delegate, <Self as Bridge>::CAPABILITY),
        }
    }

    pub fn with_context<A>(ctx: &Context, args: A) -> BridgeResult<Self>
    where
        D: FromContext<A>,
    {
        Ok(Self::from_delegate(D::from_context(ctx, args)?))
    }

    /// Build with the platform default context
    pub fn new<A>(args: A) -> BridgeResult<Self>
    where
        D: FromContext<A>,
    {
        Self::with_context(&Context::default(), args)
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

    /// Block until acquired and return a releasing guard
    pub fn acquire_guard(&self) -> BridgeResult<AcquiredGuard<'_, D>> {
        self.machine.acquire(true, None)?;
        Ok(AcquiredGuard::new(&self.machine))
    }

    /// Guard if acquired within `timeout`
    pub fn try_acquire_guard(
        &self,
        timeout: Option<Duration>,
    ) -> BridgeResult<Option<AcquiredGuard<'_, D>>> {
        let blocking = timeout.is_some();
        Ok(self
            .machine
            .acquire(blocking, timeout)?
            .then(|| AcquiredGuard::new(&self.machine)))
    }

    pub async fn async_acquire_guard(&self) -> BridgeResult<AcquiredGuard<'_, D>> {
        self.machine.async_acquire(true, None).await?;
        Ok(AcquiredGuard::new(&self.machine))
    }
}

impl<D: Acquire> Bridge for AioAcquirer<D> {
    type Delegate = D;

    const CAPABILITY: &'static Capability = &LOCK;

    fn delegate(&self) -> &Arc<D> {
        self.machine.delegate()
    }

    fn executor(&self) -> &Executor {
        self.machine.executor()
    }
}

impl<D: Acquire> Deref for AioAcquirer<D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.machine.delegate()
    }
}

impl<D: Acquire + Default> Default for AioAcquirer<D> {
    fn default() -> Self {
        Self::from_delegate(D::default())
    }
}

/// A transfer copy: same primitive, fresh engine, `Idle`
impl<D: Acquire> Clone for AioAcquirer<D> {
    fn clone(&self) -> Self {
        Self {
            machine: self.machine.transfer_copy(),
        }
    }
}

impl<D: Acquire> Transfer for AioAcquirer<D> {
    fn prepare_for_transfer(&self) {
        self.machine.executor().prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.machine.reset_after_transfer();
    }
}

impl<D: Acquire + fmt::Debug> fmt::Debug for AioAcquirer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AioAcquirer")
            .field("delegate", self.machine.delegate())
            .field("state", &self.state())
            .field("executor", self.machine.executor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::BridgeError;

    #[test]
    fn test_foreground_round_trip() {
        let lock = AioLock::default();
        assert_eq!(lock.acquire(true, None), Ok(true));
        assert_eq!(lock.state(), HoldState::HeldForeground);
        assert!(lock.locked());

        lock.release(false).unwrap();
        assert_eq!(lock.state(), HoldState::Idle);
        assert!(!lock.executor().is_started());
    }

    #[tokio::test]
    async fn test_foreground_hold_rejects_async_release() {
        let lock = AioLock::default();
        lock.acquire(true, None).unwrap();

        let err = lock.async_release(false).await.unwrap_err();
        assert!(err.is_ownership_violation());
        assert_eq!(lock.state(), HoldState::HeldForeground);

        lock.async_release(true).await.unwrap();
        assert_eq!(lock.state(), HoldState::Idle);
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let lock = AioRLock::default();
        {
            let guard = lock.async_acquire_guard().await.unwrap();
            assert_eq!(guard.state(), HoldState::HeldBackground);
        }
        assert_eq!(lock.state(), HoldState::Idle);

        let guard = lock.try_acquire_guard(None).unwrap().unwrap();
        assert_eq!(guard.state(), HoldState::HeldForeground);
        guard.release().unwrap();
        assert_eq!(lock.state(), HoldState::Idle);
    }

    #[test]
    fn test_clone_is_idle_transfer_copy() {
        let lock = AioSemaphore::new(2).unwrap();
        lock.acquire(true, None).unwrap();

        let copy = lock.clone();
        assert_eq!(copy.state(), HoldState::Idle);
        assert!(Arc::ptr_eq(lock.delegate(), copy.delegate()));
        assert_eq!(copy.get_value(), 1);
        lock.release(false).unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_executor_surfaces_error() {
        let lock = AioLock::default();
        lock.executor().shutdown(true);
        assert_eq!(
            lock.async_acquire(true, None).await,
            Err(BridgeError::EngineShutdown)
        );
        assert_eq!(lock.state(), HoldState::Idle);
    }
}
