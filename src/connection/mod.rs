/*!
 * Connections
 *
 * Framed message endpoints: pipes, listeners and clients over Unix sockets or
 * TCP, with async-capable bridges.
 */

mod aio;
mod conn;
mod listener;
mod stream;

pub use aio::{aio_pipe, async_wait, AioConnection, AioListener};
pub use conn::{pipe, wait, Connection};
pub use listener::Listener;
pub use stream::Address;
