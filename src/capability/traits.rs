/*!
 * Offloaded Operations
 *
 * One trait per capability. Each method offloads the matching delegate call
 * through [`Bridge::offload`] and resolves to its result. A wrapper that needs
 * different behavior defines an inherent method of the same name instead of
 * implementing the trait.
 */

use super::Bridge;
use crate::core::codec;
use crate::core::errors::BridgeResult;
use crate::sync::traits::{
    Accept, Acquire, ConditionVar, ConnectionOps, Join, JoinableQueueOps, QueueOps, Wait,
};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;

/// `async_acquire` / `async_release` without local state tracking
///
/// Used by manager proxies; the manager owns the real primitive.
pub trait AsyncAcquire: Bridge {
    fn async_acquire(
        &self,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<bool>> + Send
    where
        Self::Delegate: Acquire,
    {
        let handle = self.offload(move |d| d.acquire(blocking, timeout));
        async move { handle.await? }
    }

    fn async_release(&self) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self::Delegate: Acquire,
    {
        let handle = self.offload(|d| d.release());
        async move { handle.await? }
    }
}

pub trait AsyncWait: Bridge {
    fn async_wait(
        &self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<<Self::Delegate as Wait>::Output>> + Send
    where
        Self::Delegate: Wait,
    {
        let handle = self.offload(move |d| d.wait(timeout));
        async move { handle.await? }
    }
}

/// Condition variable waits and notifications
///
/// None of these change the wrapper's hold state.
pub trait AsyncCondition: Bridge {
    fn async_wait(
        &self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<bool>> + Send
    where
        Self::Delegate: ConditionVar,
    {
        let handle = self.offload(move |d| d.wait(timeout));
        async move { handle.await? }
    }

    fn async_wait_for<P>(
        &self,
        predicate: P,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<bool>> + Send
    where
        Self::Delegate: ConditionVar,
        P: FnMut() -> bool + Send + 'static,
    {
        let handle = self.offload(move |d| d.wait_for(predicate, timeout));
        async move { handle.await? }
    }

    fn async_notify(&self, n: usize) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self::Delegate: ConditionVar,
    {
        let handle = self.offload(move |d| d.notify(n));
        async move { handle.await? }
    }

    fn async_notify_all(&self) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self::Delegate: ConditionVar,
    {
        let handle = self.offload(|d| d.notify_all());
        async move { handle.await? }
    }
}

pub trait AsyncQueue<T: Send + 'static>: Bridge {
    fn async_get(&self, timeout: Option<Duration>) -> impl Future<Output = BridgeResult<T>> + Send
    where
        Self::Delegate: QueueOps<T>,
    {
        let handle = self.offload(move |q| q.get(true, timeout));
        async move { handle.await? }
    }

    fn async_put(
        &self,
        item: T,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self::Delegate: QueueOps<T>,
    {
        let handle = self.offload(move |q| q.put(item, true, timeout));
        async move { handle.await? }
    }
}

pub trait AsyncJoinableQueue<T: Send + 'static>: AsyncQueue<T> {
    fn async_join(&self) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self::Delegate: JoinableQueueOps<T>,
    {
        let handle = self.offload(|q| q.join());
        async move { handle.await? }
    }
}

pub trait AsyncJoin: Bridge {
    fn async_join(
        &self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<bool>> + Send
    where
        Self::Delegate: Join,
    {
        let handle = self.offload(move |d| d.join(timeout));
        async move { handle.await? }
    }
}

pub trait AsyncConnection: Bridge {
    fn async_send_bytes(&self, payload: Vec<u8>) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self::Delegate: ConnectionOps,
    {
        let handle = self.offload(move |c| c.send_bytes(&payload));
        async move { handle.await? }
    }

    fn async_recv_bytes(&self) -> impl Future<Output = BridgeResult<Vec<u8>>> + Send
    where
        Self::Delegate: ConnectionOps,
    {
        let handle = self.offload(|c| c.recv_bytes());
        async move { handle.await? }
    }

    /// Encode on the calling thread, send on a worker
    fn async_send<M>(&self, message: &M) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self::Delegate: ConnectionOps,
        M: Serialize,
    {
        let encoded = codec::encode(message);
        let handle = encoded.map(|payload| self.offload(move |c| c.send_bytes(&payload)));
        async move { handle?.await? }
    }

    fn async_recv<M>(&self) -> impl Future<Output = BridgeResult<M>> + Send
    where
        Self::Delegate: ConnectionOps,
        M: DeserializeOwned + Send + 'static,
    {
        let handle = self.offload(|c| c.recv_bytes());
        async move {
            let payload = handle.await??;
            Ok(codec::decode(&payload)?)
        }
    }

    fn async_poll(
        &self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<bool>> + Send
    where
        Self::Delegate: ConnectionOps,
    {
        let handle = self.offload(move |c| c.poll(timeout));
        async move { handle.await? }
    }
}

pub trait AsyncAccept: Bridge {
    /// What an accepted connection is handed back as
    type Accepted: Send + 'static;

    fn async_accept(&self) -> impl Future<Output = BridgeResult<Self::Accepted>> + Send
    where
        Self::Delegate: Accept,
        Self::Accepted: From<<Self::Delegate as Accept>::Conn>,
    {
        let handle = self.offload(|l| l.accept());
        async move { Ok(handle.await??.into()) }
    }
}
