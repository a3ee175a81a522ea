/*!
 * aiobridge
 *
 * Async-friendly wrappers around blocking synchronization, queue, pool,
 * process and connection primitives. Every blocking call is offloaded to a
 * per-wrapper worker pool and surfaced as a future; the synchronous API stays
 * available unchanged.
 *
 * # Layout
 *
 * - `executor`: lazily started offload engine and its handles
 * - `capability`: descriptors and the traits providing `async_*` methods
 * - `sync`, `queue`: local blocking delegates
 * - `locks`: lock wrappers with the thread-affinity state machine
 * - `pool`, `process`, `connection`: the remaining bridges
 * - `managers`: primitives shared across processes through a manager
 * - `context`: start-method selection and wrapper factories
 */

pub mod capability;
pub mod connection;
pub mod context;
pub mod core;
pub mod executor;
pub mod locks;
pub mod managers;
pub mod monitoring;
pub mod pool;
pub mod process;
pub mod queue;
pub mod sync;

// Re-exports
pub use capability::{Bridge, Capability, ResolvedCapability};
pub use connection::{
    aio_pipe, async_wait, pipe, wait, Address, AioConnection, AioListener, Connection, Listener,
};
pub use context::{
    aio_barrier, aio_bounded_semaphore, aio_condition, aio_event, aio_joinable_queue, aio_lock,
    aio_pool, aio_process, aio_queue, aio_rlock, aio_semaphore, aio_simple_queue, get_context,
    Context, StartMethod,
};
pub use crate::core::{BridgeConfig, BridgeError, BridgeResult, DelegateError, TransportError};
pub use executor::{Executor, OffloadHandle, Transfer};
pub use locks::{
    AcquiredGuard, AioBarrier, AioBoundedSemaphore, AioCondition, AioEvent, AioLock, AioRLock,
    AioSemaphore, HoldState,
};
pub use managers::{Manager, ManagerServer};
pub use monitoring::init_tracing;
pub use pool::{AioPool, AsyncResult, TaskPool};
pub use process::{AioProcess, ChildProcess, ProcessSpec};
pub use queue::{AioJoinableQueue, AioQueue, AioSimpleQueue};

/// Traits needed to call the sync and async APIs
pub mod prelude {
    pub use crate::capability::{
        AsyncAccept, AsyncAcquire, AsyncCondition, AsyncConnection, AsyncJoin, AsyncJoinableQueue,
        AsyncQueue, AsyncWait, Bridge,
    };
    pub use crate::executor::Transfer;
    pub use crate::sync::traits::{
        Accept, Acquire, ConditionVar, ConnectionOps, Join, JoinableQueueOps, QueueOps, Wait,
    };
}
