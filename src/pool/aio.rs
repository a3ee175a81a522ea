/*!
 * Pool Bridge
 *
 * `async_apply`, `async_map` and `async_starmap` hand the pool a pair of
 * callbacks that resolve an [`OffloadHandle`]. `async_join` is offloaded like
 * any other blocking call.
 */

use super::task_pool::TaskPool;
use super::StarFn;
use crate::capability::{AsyncJoin, Bridge, Capability, POOL};
use crate::context::{Context, FromContext};
use crate::core::errors::{BridgeError, BridgeResult};
use crate::executor::{Executor, OffloadHandle, Resolver, Transfer};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

pub struct AioPool {
    delegate: Arc<TaskPool>,
    executor: Executor,
}

impl AioPool {
    pub fn from_delegate(delegate: TaskPool) -> Self {
        Self::from_arc(Arc::new(delegate))
    }

    pub fn from_arc(delegate: Arc<TaskPool>) -> Self {
        Self {
            delegate,
            executor: Executor::for_capability(&POOL),
        }
    }

    pub fn with_context(ctx: &Context, workers: Option<usize>) -> BridgeResult<Self> {
        Ok(Self::from_delegate(TaskPool::from_context(ctx, workers)?))
    }

    pub fn new(workers: Option<usize>) -> BridgeResult<Self> {
        Self::with_context(&Context::default(), workers)
    }

    pub fn async_apply<F, R>(&self, f: F) -> OffloadHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (on_success, on_error, handle) = callbacks();
        match self.delegate.apply_async_with(f, on_success, on_error) {
            Ok(()) => handle,
            Err(e) => OffloadHandle::ready(Err(e)),
        }
    }

    pub fn async_map<F, A, R>(
        &self,
        f: F,
        items: Vec<A>,
        chunksize: Option<usize>,
    ) -> OffloadHandle<Vec<R>>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
        A: Send + 'static,
        R: Send + 'static,
    {
        let (on_success, on_error, handle) = callbacks();
        match self.delegate.map_async_with(f, items, chunksize, on_success, on_error) {
            Ok(()) => handle,
            Err(e) => OffloadHandle::ready(Err(e)),
        }
    }

    pub fn async_starmap<F, Args>(
        &self,
        f: F,
        items: Vec<Args>,
        chunksize: Option<usize>,
    ) -> OffloadHandle<Vec<F::Output>>
    where
        F: StarFn<Args>,
        Args: Send + 'static,
    {
        self.async_map(move |args: Args| f.call_star(args), items, chunksize)
    }
}

/// Success and error callbacks sharing one resolver
fn callbacks<R: Send + 'static>() -> (
    impl FnOnce(R) + Send + 'static,
    impl FnOnce(BridgeError) + Send + 'static,
    OffloadHandle<R>,
) {
    let (resolver, handle) = OffloadHandle::completion();
    let resolver: Arc<Mutex<Resolver<R>>> = Arc::new(Mutex::new(resolver));
    let on_error = Arc::clone(&resolver);

    (
        move |value: R| resolver.lock().resolve(value),
        move |error: BridgeError| on_error.lock().reject(error),
        handle,
    )
}

impl Bridge for AioPool {
    type Delegate = TaskPool;

    const CAPABILITY: &'static Capability = &POOL;

    fn delegate(&self) -> &Arc<TaskPool> {
        &self.delegate
    }

    fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl AsyncJoin for AioPool {}

impl Deref for AioPool {
    type Target = TaskPool;

    fn deref(&self) -> &TaskPool {
        &self.delegate
    }
}

impl Clone for AioPool {
    fn clone(&self) -> Self {
        Self::from_arc(Arc::clone(&self.delegate))
    }
}

impl Transfer for AioPool {
    fn prepare_for_transfer(&self) {
        self.executor.prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.executor.resume_after_transfer();
    }
}

impl fmt::Debug for AioPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AioPool")
            .field("delegate", &self.delegate)
            .field("executor", &self.executor)
            .finish()
    }
}
