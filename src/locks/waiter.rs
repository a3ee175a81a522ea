/*!
 * Waiter Wrappers
 *
 * Event and barrier: a single blocking `wait`, offloaded through
 * [`AsyncWait`]. No hold state is tracked.
 */

use crate::capability::{AsyncWait, Bridge, Capability, WAITER};
use crate::context::{Context, FromContext};
use crate::core::errors::BridgeResult;
use crate::executor::{Executor, Transfer};
use crate::sync::traits::Wait;
use crate::sync::{Barrier, Event};
use std::ops::Deref;
use std::sync::Arc;

pub type AioEvent = AioWaiter<Event>;
pub type AioBarrier = AioWaiter<Barrier>;

pub struct AioWaiter<D: Wait> {
    delegate: Arc<D>,
    executor: Executor,
}

impl<D: Wait> AioWaiter<D> {
    pub fn from_delegate(delegate: D) -> Self {
        Self::from_arc(Arc::new(delegate))
    }

    pub fn from_arc(delegate: Arc<D>) -> Self {
        Self {
            delegate,
            executor: Executor::for_capability(<Self as Bridge>::CAPABILITY),
        }
    }

    pub fn with_context<A>(ctx: &Context, args: A) -> BridgeResult<Self>
    where
        D: FromContext<A>,
    {
        Ok(Self::from_delegate(D::from_context(ctx, args)?))
    }

    pub fn new<A>(args: A) -> BridgeResult<Self>
    where
        D: FromContext<A>,
    {
        Self::with_context(&Context::default(), args)
    }
}

impl<D: Wait> Bridge for AioWaiter<D> {
    type Delegate = D;

    const CAPABILITY: &'static Capability = &WAITER;

    fn delegate(&self) -> &Arc<D> {
        &self.delegate
    }

    fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl<D: Wait> AsyncWait for AioWaiter<D> {}

impl<D: Wait> Deref for AioWaiter<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.delegate
    }
}

impl<D: Wait> Clone for AioWaiter<D> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
            executor: self.executor.clone(),
        }
    }
}

impl<D: Wait> Transfer for AioWaiter<D> {
    fn prepare_for_transfer(&self) {
        self.executor.prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.executor.resume_after_transfer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::DelegateError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_event_async_wait() {
        let event = AioEvent::new(()).unwrap();
        let setter = event.clone();

        let waiting = event.async_wait(Some(Duration::from_secs(2)));
        setter.set();
        assert_eq!(waiting.await, Ok(true));
    }

    #[tokio::test]
    async fn test_barrier_cohort_of_two() {
        let barrier = AioBarrier::new(2).unwrap();
        let other = barrier.clone();

        let (a, b) = tokio::join!(barrier.async_wait(None), other.async_wait(None));
        let mut indices = vec![a.unwrap(), b.unwrap()];
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_late_waiter_blocks_until_next_cohort() {
        let barrier = AioBarrier::new(2).unwrap();
        let other = barrier.clone();
        let (a, b) = tokio::join!(barrier.async_wait(None), other.async_wait(None));
        assert!(a.is_ok() && b.is_ok());

        let third = barrier.clone();
        let pending = tokio::spawn(async move { third.async_wait(None).await });
        while barrier.n_waiting() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!pending.is_finished());

        let fourth = barrier.clone();
        let index = fourth.async_wait(Some(Duration::from_secs(5))).await.unwrap();
        let late = pending.await.unwrap().unwrap();
        let mut indices = vec![index, late];
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_lone_waiter_times_out_after_reset() {
        let barrier = AioBarrier::new(2).unwrap();
        let other = barrier.clone();
        let (a, b) = tokio::join!(barrier.async_wait(None), other.async_wait(None));
        assert!(a.is_ok() && b.is_ok());

        let err = barrier.async_wait(Some(Duration::from_millis(20))).await.unwrap_err();
        assert_eq!(err.delegate(), Some(&DelegateError::BrokenBarrier));
    }
}
