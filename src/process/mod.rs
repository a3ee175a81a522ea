/*!
 * Child Processes
 *
 * `ChildProcess` runs a program described by a [`ProcessSpec`] and records the
 * context's start method, which the child sees in `AIOBRIDGE_START_METHOD`.
 * `AioProcess` awaits its exit.
 */

mod aio;
mod child;

pub use aio::AioProcess;
pub use child::{ChildProcess, ProcessSpec, START_METHOD_ENV};
