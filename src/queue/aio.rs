/*!
 * Queue Bridges
 *
 * `AioQueue`, `AioJoinableQueue` and `AioSimpleQueue` offload `get`/`put`
 * (and `join`) through the capability traits.
 *
 * # Teardown
 *
 * `close` stops the offload engine without blocking and closes the queue
 * only once every offloaded put already submitted has run. `join_thread`
 * then waits for that to happen. After `cancel_join_thread`, `join_thread`
 * returns at once: queued puts still complete on the detached workers, none
 * are dropped.
 */

use super::local::{JoinableQueue, Queue, SimpleQueue};
use crate::capability::{
    AsyncJoinableQueue, AsyncQueue, Bridge, Capability, JOINABLE_QUEUE, QUEUE,
};
use crate::context::{Context, FromContext};
use crate::core::errors::BridgeResult;
use crate::executor::{Executor, Transfer};
use crate::sync::traits::{JoinableQueueOps, QueueOps};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A queue delegate the bridge knows how to tear down
pub trait QueueKind: Send + Sync + 'static {
    const CAPABILITY: &'static Capability;

    fn close(&self);

    fn join_thread(&self) -> BridgeResult<()>;

    fn cancel_join_thread(&self);
}

impl<T: Send + 'static> QueueKind for Queue<T> {
    const CAPABILITY: &'static Capability = &QUEUE;

    fn close(&self) {
        Queue::close(self)
    }

    fn join_thread(&self) -> BridgeResult<()> {
        Queue::join_thread(self)
    }

    fn cancel_join_thread(&self) {
        Queue::cancel_join_thread(self)
    }
}

impl<T: Send + 'static> QueueKind for JoinableQueue<T> {
    const CAPABILITY: &'static Capability = &JOINABLE_QUEUE;

    fn close(&self) {
        JoinableQueue::close(self)
    }

    fn join_thread(&self) -> BridgeResult<()> {
        JoinableQueue::join_thread(self)
    }

    fn cancel_join_thread(&self) {
        JoinableQueue::cancel_join_thread(self)
    }
}

impl<T: Send + 'static> QueueKind for SimpleQueue<T> {
    const CAPABILITY: &'static Capability = &QUEUE;

    fn close(&self) {
        SimpleQueue::close(self)
    }

    fn join_thread(&self) -> BridgeResult<()> {
        Ok(())
    }

    fn cancel_join_thread(&self) {}
}

pub type AioQueue<T> = AioQueueBridge<Queue<T>>;
pub type AioJoinableQueue<T> = AioQueueBridge<JoinableQueue<T>>;
pub type AioSimpleQueue<T> = AioQueueBridge<SimpleQueue<T>>;

pub struct AioQueueBridge<Q: QueueKind> {
    delegate: Arc<Q>,
    executor: Executor,
    join_cancelled: AtomicBool,
}

impl<Q: QueueKind> AioQueueBridge<Q> {
    pub fn from_delegate(delegate: Q) -> Self {
        Self::from_arc(Arc::new(delegate))
    }

    pub fn from_arc(delegate: Arc<Q>) -> Self {
        Self {
            delegate,
            executor: Executor::for_capability(Q::CAPABILITY),
            join_cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_context<A>(ctx: &Context, args: A) -> BridgeResult<Self>
    where
        Q: FromContext<A>,
    {
        Ok(Self::from_delegate(Q::from_context(ctx, args)?))
    }

    pub fn new<A>(args: A) -> BridgeResult<Self>
    where
        Q: FromContext<A>,
    {
        Self::with_context(&Context::default(), args)
    }

    /// Close the queue once pending offloaded puts have run
    ///
    /// The offload engine stops accepting calls immediately.
    pub fn close(&self) {
        let delegate = Arc::clone(&self.delegate);
        self.executor.shutdown_then(move || delegate.close());
    }

    /// Wait until the queue is closed and every offloaded put has run
    ///
    /// Only valid after `close`.
    pub fn join_thread(&self) -> BridgeResult<()> {
        if self.join_cancelled.load(Ordering::Acquire) {
            debug!("Queue bridge join cancelled, leaving offload workers detached");
            self.executor.shutdown(false);
            return Ok(());
        }

        self.executor.shutdown(true);
        self.delegate.join_thread()
    }

    /// Make `join_thread` return without waiting for pending puts
    pub fn cancel_join_thread(&self) {
        self.join_cancelled.store(true, Ordering::Release);
        self.delegate.cancel_join_thread();
    }
}

impl<Q: QueueKind> Bridge for AioQueueBridge<Q> {
    type Delegate = Q;

    const CAPABILITY: &'static Capability = Q::CAPABILITY;

    fn delegate(&self) -> &Arc<Q> {
        &self.delegate
    }

    fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl<T, Q> AsyncQueue<T> for AioQueueBridge<Q>
where
    T: Send + 'static,
    Q: QueueKind + QueueOps<T>,
{
}

impl<T, Q> AsyncJoinableQueue<T> for AioQueueBridge<Q>
where
    T: Send + 'static,
    Q: QueueKind + JoinableQueueOps<T>,
{
}

impl<Q: QueueKind> Deref for AioQueueBridge<Q> {
    type Target = Q;

    fn deref(&self) -> &Q {
        &self.delegate
    }
}

impl<Q: QueueKind> Clone for AioQueueBridge<Q> {
    fn clone(&self) -> Self {
        Self::from_arc(Arc::clone(&self.delegate))
    }
}

impl<Q: QueueKind> Transfer for AioQueueBridge<Q> {
    fn prepare_for_transfer(&self) {
        self.executor.prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.executor.resume_after_transfer();
    }
}
