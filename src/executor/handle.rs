/*!
 * Offload Handle
 * Suspension point resolved by a worker thread or a completion callback
 */

use crate::core::errors::{BridgeError, BridgeResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

enum HandleState<T> {
    Pending(oneshot::Receiver<BridgeResult<T>>),
    Ready(Option<BridgeResult<T>>),
}

/// Future returned by every offloaded call
///
/// Resolves to the call's return value, or to the error it raised on the
/// worker. Dropping the handle does not stop the underlying call.
#[must_use = "offloaded calls run regardless; await the handle to observe the result"]
pub struct OffloadHandle<T> {
    state: HandleState<T>,
}

impl<T> OffloadHandle<T> {
    pub(crate) fn pending(rx: oneshot::Receiver<BridgeResult<T>>) -> Self {
        Self {
            state: HandleState::Pending(rx),
        }
    }

    /// An already-resolved handle
    ///
    /// Keeps the calling convention uniform when a call completes synchronously.
    pub fn ready(result: BridgeResult<T>) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }

    /// A handle resolved by an external completion callback
    pub fn completion() -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Resolver { tx: Some(tx) }, Self::pending(rx))
    }
}

// The result is moved out by value, never pinned
impl<T> Unpin for OffloadHandle<T> {}

impl<T> Future for OffloadHandle<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            HandleState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                // Sender dropped without a result: the worker never ran the job
                Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::EngineShutdown)),
                Poll::Pending => Poll::Pending,
            },
            HandleState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or(Err(BridgeError::Panicked("handle polled after completion".into()))),
            ),
        }
    }
}

/// Completion side of an [`OffloadHandle`]
///
/// Resolves or rejects the handle exactly once; later calls are ignored.
pub struct Resolver<T> {
    tx: Option<oneshot::Sender<BridgeResult<T>>>,
}

impl<T> Resolver<T> {
    pub fn resolve(&mut self, value: T) {
        self.complete(Ok(value));
    }

    pub fn reject(&mut self, error: impl Into<BridgeError>) {
        self.complete(Err(error.into()));
    }

    pub fn complete(&mut self, result: BridgeResult<T>) {
        if let Some(tx) = self.tx.take() {
            // Receiver gone means the caller stopped waiting
            let _ = tx.send(result);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.tx.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::DelegateError;

    #[tokio::test]
    async fn test_ready_handle() {
        let handle = OffloadHandle::ready(Ok(5));
        assert_eq!(handle.await, Ok(5));
    }

    #[tokio::test]
    async fn test_completion_resolves_once() {
        let (mut resolver, handle) = OffloadHandle::completion();
        resolver.resolve(1);
        resolver.reject(DelegateError::Empty);
        assert!(resolver.is_completed());
        assert_eq!(handle.await, Ok(1));
    }

    #[tokio::test]
    async fn test_dropped_resolver_reports_shutdown() {
        let (resolver, handle) = OffloadHandle::<u8>::completion();
        drop(resolver);
        assert_eq!(handle.await, Err(BridgeError::EngineShutdown));
    }
}
