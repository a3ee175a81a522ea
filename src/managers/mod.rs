/*!
 * Managers
 *
 * Primitives hosted by a manager and shared with other OS processes.
 *
 * # Layers
 *
 * - `protocol`: request/response frames over TCP
 * - `server`: registry of hosted objects, one thread per client channel
 * - `stub`: blocking RPC handles implementing the delegate traits
 * - `proxy`: async wrappers offloading stub calls
 * - `manager`: start, connect, shut down, create objects
 *
 * Proxies serialize as their stub and can be handed to another process,
 * which reconnects on first use.
 */

mod manager;
mod protocol;
mod proxy;
mod server;
mod stub;

pub use manager::Manager;
pub use protocol::{ObjectId, PrimitiveKind, Request, Response, Value};
pub use proxy::{AcquirerProxy, BarrierProxy, ConditionProxy, EventProxy, Proxy, QueueProxy};
pub use server::ManagerServer;
pub use stub::{AcquirerStub, BarrierStub, ConditionStub, EventStub, ProxyStub, QueueStub, Stub};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        AsyncAcquire, AsyncCondition, AsyncJoinableQueue, AsyncQueue, AsyncWait,
    };
    use crate::core::codec;
    use crate::core::errors::DelegateError;
    use crate::sync::traits::{Acquire, JoinableQueueOps, QueueOps};
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_queue_proxy_async_round_trip() {
        let manager = Manager::start().unwrap();
        let queue = manager.joinable_queue::<BTreeMap<String, Vec<i32>>>(None).unwrap();

        let mut item = BTreeMap::new();
        item.insert("primes".to_string(), vec![2, 3, 5]);
        queue.async_put(item.clone(), None).await.unwrap();
        assert_eq!(queue.async_get(None).await.unwrap(), item);

        queue.task_done().unwrap();
        queue.async_join().await.unwrap();
    }

    #[tokio::test]
    async fn test_acquirer_proxy_async_acquire_release() {
        let manager = Manager::start().unwrap();
        let lock = manager.lock().unwrap();

        assert_eq!(lock.async_acquire(true, None).await, Ok(true));
        assert_eq!(lock.locked(), Ok(true));
        assert_eq!(lock.async_acquire(false, None).await, Ok(false));
        lock.async_release().await.unwrap();
        assert_eq!(lock.locked(), Ok(false));

        let err = lock.async_release().await.unwrap_err();
        assert_eq!(err.delegate(), Some(&DelegateError::ReleaseUnlocked));
    }

    #[tokio::test]
    async fn test_condition_proxy_notify() {
        let manager = Manager::start().unwrap();
        let cond = manager.condition().unwrap();
        let notifier = cond.clone();

        cond.async_acquire(true, None).await.unwrap();
        let waiting = cond.async_wait(Some(Duration::from_secs(5)));
        let notify = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            notifier.async_acquire(true, None).await.unwrap();
            notifier.async_notify_all().await.unwrap();
            notifier.async_release().await.unwrap();
        });

        assert_eq!(waiting.await, Ok(true));
        cond.async_release().await.unwrap();
        notify.await.unwrap();
    }

    #[tokio::test]
    async fn test_event_and_barrier_proxies() {
        let manager = Manager::start().unwrap();

        let event = manager.event().unwrap();
        assert_eq!(event.async_wait(Some(Duration::from_millis(10))).await, Ok(false));
        event.set().unwrap();
        assert_eq!(event.async_wait(None).await, Ok(true));

        let barrier = manager.barrier(2, None).unwrap();
        let other = barrier.clone();
        let (a, b) = tokio::join!(barrier.async_wait(None), other.async_wait(None));
        let mut indices = vec![a.unwrap(), b.unwrap()];
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_async_call_method() {
        let manager = Manager::start().unwrap();
        let sem = manager.bounded_semaphore(3).unwrap();

        let value = sem.async_call_method("get_value", Vec::new(), Vec::new()).await;
        assert_eq!(value, Ok(Value::Int(3)));

        let err = sem.async_call_method("frobnicate", Vec::new(), Vec::new()).await.unwrap_err();
        assert!(matches!(err.delegate(), Some(DelegateError::NoSuchMethod { .. })));
    }

    #[test]
    fn test_proxy_transfer_by_serialization() {
        let manager = Manager::start().unwrap();
        let queue = manager.queue::<String>(Some(4)).unwrap();
        queue.put("across".to_string(), true, None).unwrap();

        let bytes = codec::encode(&queue).unwrap();
        let copy: QueueProxy<String> = codec::decode(&bytes).unwrap();
        assert_eq!(copy.get(true, Some(Duration::from_secs(1))), Ok("across".to_string()));

        assert!(codec::decode::<EventProxy>(&bytes).is_err());
    }

    #[test]
    fn test_shutdown_and_join() {
        let manager = Manager::start().unwrap();
        let event = manager.event().unwrap();
        assert!(manager.is_local());

        manager.shutdown().unwrap();
        assert_eq!(manager.join(Some(Duration::from_secs(5))), Ok(true));
        assert!(!manager.is_local());

        // The server thread is gone; new channels are refused
        let fresh = event.clone();
        assert!(fresh.is_set().unwrap_err().is_transport());
    }

    #[test]
    fn test_dispose_removes_object() {
        let manager = Manager::start().unwrap();
        let lock = manager.rlock().unwrap();
        let id = lock.proxy_stub().id();

        lock.dispose().unwrap();
        let err = lock.acquire(true, None).unwrap_err();
        assert_eq!(err.delegate(), Some(&DelegateError::NotFound(id)));
    }
}
