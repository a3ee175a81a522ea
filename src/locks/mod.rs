/*!
 * Lock Bridges
 *
 * Async-capable wrappers for the synchronization delegates:
 * - Acquirers (`AioLock`, `AioRLock`, `AioSemaphore`, `AioBoundedSemaphore`)
 *   and `AioCondition` run the thread-affinity state machine
 * - Waiters (`AioEvent`, `AioBarrier`) only offload `wait`
 *
 * Every wrapper runs a single offload worker, so an offloaded acquire and
 * its offloaded release execute on the same OS thread.
 */

mod acquirer;
mod condition;
mod guard;
mod state;
mod waiter;

pub use acquirer::{AioAcquirer, AioBoundedSemaphore, AioLock, AioRLock, AioSemaphore};
pub use condition::AioCondition;
pub use guard::AcquiredGuard;
pub use state::{HoldState, LockStateMachine};
pub use waiter::{AioBarrier, AioEvent, AioWaiter};
