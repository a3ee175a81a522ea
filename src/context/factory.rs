/*!
 * Delegate Factory
 *
 * `FromContext` impls for every local delegate, the per-kind factory methods
 * on [`Context`], and `aio_*` free functions taking an optional context.
 */

use super::{Context, FromContext};
use crate::connection::{aio_pipe, AioConnection};
use crate::core::errors::BridgeResult;
use crate::locks::{
    AioBarrier, AioBoundedSemaphore, AioCondition, AioEvent, AioLock, AioRLock, AioSemaphore,
};
use crate::pool::{AioPool, TaskPool};
use crate::process::{AioProcess, ChildProcess, ProcessSpec};
use crate::queue::{AioJoinableQueue, AioQueue, AioSimpleQueue, JoinableQueue, Queue, SimpleQueue};
use crate::sync::{Barrier, BoundedSemaphore, Condition, Event, Lock, RLock, Semaphore};

// =============================================================================
// DELEGATE CONSTRUCTION
// =============================================================================

macro_rules! from_context_unit {
    ($($ty:ty),+) => {
        $(
            impl FromContext<()> for $ty {
                fn from_context(_ctx: &Context, _args: ()) -> BridgeResult<Self> {
                    Ok(<$ty>::new())
                }
            }
        )+
    };
}

from_context_unit!(Lock, RLock, Condition, Event);

impl FromContext<usize> for Semaphore {
    fn from_context(_ctx: &Context, value: usize) -> BridgeResult<Self> {
        Ok(Semaphore::new(value))
    }
}

impl FromContext<usize> for BoundedSemaphore {
    fn from_context(_ctx: &Context, value: usize) -> BridgeResult<Self> {
        Ok(BoundedSemaphore::new(value))
    }
}

impl FromContext<usize> for Barrier {
    fn from_context(_ctx: &Context, parties: usize) -> BridgeResult<Self> {
        Barrier::new(parties)
    }
}

impl<T: Send + 'static> FromContext<Option<usize>> for Queue<T> {
    fn from_context(_ctx: &Context, maxsize: Option<usize>) -> BridgeResult<Self> {
        Ok(Queue::new(maxsize))
    }
}

impl<T: Send + 'static> FromContext<Option<usize>> for JoinableQueue<T> {
    fn from_context(_ctx: &Context, maxsize: Option<usize>) -> BridgeResult<Self> {
        Ok(JoinableQueue::new(maxsize))
    }
}

impl<T: Send + 'static> FromContext<()> for SimpleQueue<T> {
    fn from_context(_ctx: &Context, _args: ()) -> BridgeResult<Self> {
        Ok(SimpleQueue::new())
    }
}

impl FromContext<Option<usize>> for TaskPool {
    fn from_context(_ctx: &Context, workers: Option<usize>) -> BridgeResult<Self> {
        TaskPool::new(workers)
    }
}

impl FromContext<ProcessSpec> for ChildProcess {
    fn from_context(ctx: &Context, spec: ProcessSpec) -> BridgeResult<Self> {
        Ok(ChildProcess::new(spec, ctx.start_method()))
    }
}

// =============================================================================
// WRAPPER FACTORIES
// =============================================================================

impl Context {
    pub fn lock(&self) -> BridgeResult<AioLock> {
        AioLock::with_context(self, ())
    }

    pub fn rlock(&self) -> BridgeResult<AioRLock> {
        AioRLock::with_context(self, ())
    }

    pub fn semaphore(&self, value: usize) -> BridgeResult<AioSemaphore> {
        AioSemaphore::with_context(self, value)
    }

    pub fn bounded_semaphore(&self, value: usize) -> BridgeResult<AioBoundedSemaphore> {
        AioBoundedSemaphore::with_context(self, value)
    }

    pub fn condition(&self) -> BridgeResult<AioCondition> {
        AioCondition::with_context(self)
    }

    pub fn event(&self) -> BridgeResult<AioEvent> {
        AioEvent::with_context(self, ())
    }

    pub fn barrier(&self, parties: usize) -> BridgeResult<AioBarrier> {
        AioBarrier::with_context(self, parties)
    }

    pub fn queue<T: Send + 'static>(&self, maxsize: Option<usize>) -> BridgeResult<AioQueue<T>> {
        AioQueue::with_context(self, maxsize)
    }

    pub fn joinable_queue<T: Send + 'static>(
        &self,
        maxsize: Option<usize>,
    ) -> BridgeResult<AioJoinableQueue<T>> {
        AioJoinableQueue::with_context(self, maxsize)
    }

    pub fn simple_queue<T: Send + 'static>(&self) -> BridgeResult<AioSimpleQueue<T>> {
        AioSimpleQueue::with_context(self, ())
    }

    pub fn pool(&self, workers: Option<usize>) -> BridgeResult<AioPool> {
        AioPool::with_context(self, workers)
    }

    pub fn process(&self, spec: ProcessSpec) -> BridgeResult<AioProcess> {
        AioProcess::with_context(self, spec)
    }

    pub fn pipe(&self, duplex: bool) -> BridgeResult<(AioConnection, AioConnection)> {
        aio_pipe(duplex)
    }
}

// =============================================================================
// FREE FUNCTIONS
// =============================================================================

fn resolve(ctx: Option<&Context>) -> Context {
    ctx.copied().unwrap_or_default()
}

pub fn aio_lock(ctx: Option<&Context>) -> BridgeResult<AioLock> {
    resolve(ctx).lock()
}

pub fn aio_rlock(ctx: Option<&Context>) -> BridgeResult<AioRLock> {
    resolve(ctx).rlock()
}

pub fn aio_semaphore(value: usize, ctx: Option<&Context>) -> BridgeResult<AioSemaphore> {
    resolve(ctx).semaphore(value)
}

pub fn aio_bounded_semaphore(
    value: usize,
    ctx: Option<&Context>,
) -> BridgeResult<AioBoundedSemaphore> {
    resolve(ctx).bounded_semaphore(value)
}

pub fn aio_condition(ctx: Option<&Context>) -> BridgeResult<AioCondition> {
    resolve(ctx).condition()
}

pub fn aio_event(ctx: Option<&Context>) -> BridgeResult<AioEvent> {
    resolve(ctx).event()
}

pub fn aio_barrier(parties: usize, ctx: Option<&Context>) -> BridgeResult<AioBarrier> {
    resolve(ctx).barrier(parties)
}

pub fn aio_queue<T: Send + 'static>(
    maxsize: Option<usize>,
    ctx: Option<&Context>,
) -> BridgeResult<AioQueue<T>> {
    resolve(ctx).queue(maxsize)
}

pub fn aio_joinable_queue<T: Send + 'static>(
    maxsize: Option<usize>,
    ctx: Option<&Context>,
) -> BridgeResult<AioJoinableQueue<T>> {
    resolve(ctx).joinable_queue(maxsize)
}

pub fn aio_simple_queue<T: Send + 'static>(
    ctx: Option<&Context>,
) -> BridgeResult<AioSimpleQueue<T>> {
    resolve(ctx).simple_queue()
}

pub fn aio_pool(workers: Option<usize>, ctx: Option<&Context>) -> BridgeResult<AioPool> {
    resolve(ctx).pool(workers)
}

pub fn aio_process(spec: ProcessSpec, ctx: Option<&Context>) -> BridgeResult<AioProcess> {
    resolve(ctx).process(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::AsyncQueue;
    use crate::context::{get_context, StartMethod};
    use crate::locks::HoldState;

    #[tokio::test]
    async fn test_context_builds_wrappers() {
        let ctx = get_context(Some(StartMethod::Spawn)).unwrap();

        let lock = ctx.lock().unwrap();
        assert!(lock.acquire(true, None).unwrap());
        assert_eq!(lock.state(), HoldState::HeldForeground);
        lock.release(false).unwrap();

        let queue = ctx.queue::<u8>(Some(1)).unwrap();
        queue.async_put(1, None).await.unwrap();
        assert!(queue.full());

        let process = ctx.process(ProcessSpec::new("true")).unwrap();
        assert_eq!(process.start_method(), StartMethod::Spawn);
    }

    #[test]
    fn test_free_functions_use_default_context() {
        let sem = aio_bounded_semaphore(2, None).unwrap();
        assert_eq!(sem.get_value(), 2);
        assert!(aio_barrier(0, None).is_err());
        assert_eq!(aio_pool(Some(1), None).unwrap().workers(), 1);
    }
}
