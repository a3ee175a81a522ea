/*!
 * Delegate Traits
 *
 * The blocking surfaces a wrapper can offload. Local primitives and manager
 * stubs implement the same traits, so a wrapper never knows which one it holds.
 */

use crate::core::errors::BridgeResult;
use std::time::Duration;

/// Lock-like primitive: mutex, recursive mutex, semaphore
pub trait Acquire: Send + Sync + 'static {
    /// Returns `Ok(false)` when a non-blocking or timed attempt fails
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool>;

    fn release(&self) -> BridgeResult<()>;
}

/// Primitive exposing a single blocking wait: event, barrier
pub trait Wait: Send + Sync + 'static {
    type Output: Send + 'static;

    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<Self::Output>;
}

/// Condition variable bound to its own lock
pub trait ConditionVar: Acquire {
    /// Release the lock, wait for a notification, reacquire
    ///
    /// Returns `Ok(false)` on timeout.
    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<bool>;

    /// Wait until `predicate` holds, returning its final value
    fn wait_for<P>(&self, predicate: P, timeout: Option<Duration>) -> BridgeResult<bool>
    where
        P: FnMut() -> bool;

    fn notify(&self, n: usize) -> BridgeResult<()>;

    fn notify_all(&self) -> BridgeResult<()>;
}

/// FIFO queue of `T`
pub trait QueueOps<T>: Send + Sync + 'static {
    fn put(&self, item: T, block: bool, timeout: Option<Duration>) -> BridgeResult<()>;

    fn get(&self, block: bool, timeout: Option<Duration>) -> BridgeResult<T>;

    fn qsize(&self) -> BridgeResult<usize>;

    fn put_nowait(&self, item: T) -> BridgeResult<()> {
        self.put(item, false, None)
    }

    fn get_nowait(&self) -> BridgeResult<T> {
        self.get(false, None)
    }
}

/// Queue that tracks unfinished items
pub trait JoinableQueueOps<T>: QueueOps<T> {
    fn task_done(&self) -> BridgeResult<()>;

    /// Block until every item put has been marked done
    fn join(&self) -> BridgeResult<()>;
}

/// Something that finishes: child process, task pool
pub trait Join: Send + Sync + 'static {
    /// Returns `Ok(false)` if `timeout` elapsed first
    fn join(&self, timeout: Option<Duration>) -> BridgeResult<bool>;
}

/// Byte-message connection endpoint
pub trait ConnectionOps: Send + Sync + 'static {
    fn send_bytes(&self, payload: &[u8]) -> BridgeResult<()>;

    fn recv_bytes(&self) -> BridgeResult<Vec<u8>>;

    /// Whether a message can be received without blocking
    fn poll(&self, timeout: Option<Duration>) -> BridgeResult<bool>;
}

/// Listener accepting connections
pub trait Accept: Send + Sync + 'static {
    type Conn: Send + 'static;

    fn accept(&self) -> BridgeResult<Self::Conn>;
}
