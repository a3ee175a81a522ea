/*!
 * Queues
 *
 * Local FIFO delegates and their async-capable bridges.
 */

mod aio;
mod local;

pub use aio::{AioJoinableQueue, AioQueue, AioQueueBridge, AioSimpleQueue, QueueKind};
pub use local::{JoinableQueue, Queue, SimpleQueue};
