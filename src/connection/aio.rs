/*!
 * Connection Bridges
 *
 * `AioConnection` offloads send, receive and poll through
 * [`AsyncConnection`]; `AioListener` offloads `accept` and hands back an
 * `AioConnection`.
 */

use super::conn::{self, Connection};
use super::listener::Listener;
use super::stream::Address;
use crate::capability::{AsyncAccept, AsyncConnection, Bridge, Capability, CONNECTION, LISTENER};
use crate::core::errors::BridgeResult;
use crate::executor::{Executor, OffloadHandle, Transfer};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

pub struct AioConnection {
    delegate: Arc<Connection>,
    executor: Executor,
}

impl AioConnection {
    pub fn from_arc(delegate: Arc<Connection>) -> Self {
        Self {
            delegate,
            executor: Executor::for_capability(&CONNECTION),
        }
    }

    pub fn connect(address: &Address) -> BridgeResult<Self> {
        Ok(Connection::connect(address)?.into())
    }
}

impl From<Connection> for AioConnection {
    fn from(delegate: Connection) -> Self {
        Self::from_arc(Arc::new(delegate))
    }
}

impl Bridge for AioConnection {
    type Delegate = Connection;

    const CAPABILITY: &'static Capability = &CONNECTION;

    fn delegate(&self) -> &Arc<Connection> {
        &self.delegate
    }

    fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl AsyncConnection for AioConnection {}

impl Deref for AioConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.delegate
    }
}

impl Clone for AioConnection {
    fn clone(&self) -> Self {
        Self::from_arc(Arc::clone(&self.delegate))
    }
}

impl Transfer for AioConnection {
    fn prepare_for_transfer(&self) {
        self.executor.prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.executor.resume_after_transfer();
    }
}

impl fmt::Debug for AioConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AioConnection").field(&self.delegate).finish()
    }
}

/// A connected pair of async-capable endpoints
pub fn aio_pipe(duplex: bool) -> BridgeResult<(AioConnection, AioConnection)> {
    let (a, b) = conn::pipe(duplex)?;
    Ok((a.into(), b.into()))
}

/// Offloaded [`wait`](conn::wait), run on the first connection's workers
pub fn async_wait(
    connections: &[AioConnection],
    timeout: Option<Duration>,
) -> impl Future<Output = BridgeResult<Vec<usize>>> + Send {
    let delegates: Vec<Arc<Connection>> =
        connections.iter().map(|c| Arc::clone(c.delegate())).collect();
    let handle = match connections.first() {
        Some(first) => first.executor().submit(move || {
            let refs: Vec<&Connection> = delegates.iter().map(Arc::as_ref).collect();
            conn::wait(&refs, timeout)
        }),
        None => OffloadHandle::ready(Ok(Ok(Vec::new()))),
    };
    async move { handle.await? }
}

pub struct AioListener {
    delegate: Arc<Listener>,
    executor: Executor,
}

impl AioListener {
    pub fn bind(address: &Address) -> BridgeResult<Self> {
        Ok(Self {
            delegate: Arc::new(Listener::bind(address)?),
            executor: Executor::for_capability(&LISTENER),
        })
    }
}

impl Bridge for AioListener {
    type Delegate = Listener;

    const CAPABILITY: &'static Capability = &LISTENER;

    fn delegate(&self) -> &Arc<Listener> {
        &self.delegate
    }

    fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl AsyncAccept for AioListener {
    type Accepted = AioConnection;
}

impl Deref for AioListener {
    type Target = Listener;

    fn deref(&self) -> &Listener {
        &self.delegate
    }
}

impl fmt::Debug for AioListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AioListener").field(&self.delegate).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::traits::ConnectionOps;
    use pretty_assertions::assert_eq;
    use std::net::SocketAddr;

    #[tokio::test]
    async fn test_async_send_recv() {
        let (a, b) = aio_pipe(true).unwrap();
        let receiving = b.async_recv::<(String, u32)>();
        a.async_send(&("hello".to_string(), 5u32)).await.unwrap();
        assert_eq!(receiving.await.unwrap(), ("hello".to_string(), 5));

        a.async_send_bytes(b"bytes".to_vec()).await.unwrap();
        assert_eq!(b.async_poll(Some(Duration::from_secs(1))).await, Ok(true));
        assert_eq!(b.async_recv_bytes().await.unwrap(), b"bytes".to_vec());
    }

    #[tokio::test]
    async fn test_async_wait() {
        let (a1, _b1) = aio_pipe(true).unwrap();
        let (a2, b2) = aio_pipe(true).unwrap();
        assert_eq!(async_wait(&[], None).await, Ok(vec![]));

        let waiting = async_wait(&[a1.clone(), a2.clone()], Some(Duration::from_secs(2)));
        b2.send_bytes(b"ping").unwrap();
        assert_eq!(waiting.await, Ok(vec![1]));
    }

    #[tokio::test]
    async fn test_async_accept() {
        let loopback = Address::Tcp(SocketAddr::from(([127, 0, 0, 1], 0)));
        let listener = AioListener::bind(&loopback).unwrap();
        let accepting = listener.async_accept();

        let client = AioConnection::connect(listener.address()).unwrap();
        let server = accepting.await.unwrap();

        client.async_send(&"over tcp").await.unwrap();
        assert_eq!(server.async_recv::<String>().await.unwrap(), "over tcp");
    }
}
