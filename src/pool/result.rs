/*!
 * Task Results
 *
 * `AsyncResult` is the blocking handle returned by `apply_async`/`map_async`.
 * `Gather` collects the chunk results of a map into one ordered vector.
 */

use crate::core::errors::{BridgeError, BridgeResult, DelegateError};
use crate::sync::wait_while;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

struct Slot<R> {
    outcome: Mutex<Option<BridgeResult<R>>>,
    ready: Condvar,
}

/// Pending result of a pool task
pub struct AsyncResult<R> {
    slot: Arc<Slot<R>>,
}

impl<R: Send + 'static> AsyncResult<R> {
    pub(crate) fn new() -> (Self, Completer<R>) {
        let slot = Arc::new(Slot {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        });
        (
            Self {
                slot: Arc::clone(&slot),
            },
            Completer { slot },
        )
    }

    pub fn ready(&self) -> bool {
        self.slot.outcome.lock().is_some()
    }

    /// Whether the task finished without failing
    ///
    /// `None` while it is still running.
    pub fn successful(&self) -> Option<bool> {
        self.slot.outcome.lock().as_ref().map(|r| r.is_ok())
    }

    /// Block until the task finishes, up to `timeout`
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut outcome = self.slot.outcome.lock();
        wait_while(&self.slot.ready, &mut outcome, timeout, |o| o.is_none())
    }

    /// Block for the task's value
    ///
    /// Fails with `DelegateError::Timeout` if `timeout` elapses first; the
    /// result can still be collected later.
    pub fn get(&self, timeout: Option<Duration>) -> BridgeResult<R> {
        let mut outcome = self.slot.outcome.lock();
        if !wait_while(&self.slot.ready, &mut outcome, timeout, |o| o.is_none()) {
            return Err(DelegateError::Timeout("pool task".into()).into());
        }
        outcome.take().unwrap_or_else(|| {
            Err(DelegateError::InvalidOperation("result already collected".into()).into())
        })
    }
}

impl<R> fmt::Debug for AsyncResult<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("ready", &self.slot.outcome.lock().is_some())
            .finish()
    }
}

/// Filling side of an [`AsyncResult`]
pub(crate) struct Completer<R> {
    slot: Arc<Slot<R>>,
}

impl<R> Completer<R> {
    pub(crate) fn complete(self, result: BridgeResult<R>) {
        *self.slot.outcome.lock() = Some(result);
        self.slot.ready.notify_all();
    }
}

type OnSuccess<R> = Box<dyn FnOnce(Vec<R>) + Send>;
type OnError = Box<dyn FnOnce(BridgeError) + Send>;

struct GatherState<R> {
    chunks: Vec<Option<Vec<R>>>,
    remaining: usize,
    on_success: Option<OnSuccess<R>>,
    on_error: Option<OnError>,
}

/// Ordered collector for the chunks of one map call
///
/// Fires `on_success` with the flattened values once every chunk is in, or
/// `on_error` with the first failure. Exactly one of them runs.
pub(crate) struct Gather<R> {
    state: Mutex<GatherState<R>>,
}

impl<R: Send + 'static> Gather<R> {
    pub(crate) fn new(
        chunks: usize,
        on_success: impl FnOnce(Vec<R>) + Send + 'static,
        on_error: impl FnOnce(BridgeError) + Send + 'static,
    ) -> Arc<Self> {
        let gather = Arc::new(Self {
            state: Mutex::new(GatherState {
                chunks: (0..chunks).map(|_| None).collect(),
                remaining: chunks,
                on_success: Some(Box::new(on_success)),
                on_error: Some(Box::new(on_error)),
            }),
        });
        if chunks == 0 {
            gather.finish_if_done();
        }
        gather
    }

    pub(crate) fn chunk_done(&self, index: usize, values: Vec<R>) {
        {
            let mut state = self.state.lock();
            if state.on_success.is_none() {
                return;
            }
            if let Some(slot) = state.chunks.get_mut(index) {
                if slot.replace(values).is_none() {
                    state.remaining -= 1;
                }
            }
        }
        self.finish_if_done();
    }

    pub(crate) fn chunk_failed(&self, error: BridgeError) {
        let on_error = {
            let mut state = self.state.lock();
            state.on_success = None;
            state.on_error.take()
        };
        if let Some(on_error) = on_error {
            on_error(error);
        }
    }

    fn finish_if_done(&self) {
        let ready = {
            let mut state = self.state.lock();
            if state.remaining > 0 {
                return;
            }
            state.on_error = None;
            let values: Vec<R> = state.chunks.drain(..).flatten().flatten().collect();
            state.on_success.take().map(|cb| (cb, values))
        };
        // Callbacks run outside the lock
        if let Some((on_success, values)) = ready {
            on_success(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_result_wait_and_get() {
        let (result, completer) = AsyncResult::<u32>::new();
        assert!(!result.ready());
        assert_eq!(result.successful(), None);
        assert!(!result.wait(Some(Duration::from_millis(5))));
        assert!(matches!(
            result.get(Some(Duration::from_millis(5))),
            Err(BridgeError::Delegate(DelegateError::Timeout(_)))
        ));

        let setter = thread::spawn(move || completer.complete(Ok(9)));
        assert!(result.wait(None));
        setter.join().unwrap();
        assert_eq!(result.successful(), Some(true));
        assert_eq!(result.get(None), Ok(9));
    }

    #[test]
    fn test_gather_orders_chunks() {
        let (result, completer) = AsyncResult::<Vec<u32>>::new();
        let gather = Gather::new(
            3,
            move |values| completer.complete(Ok(values)),
            |_| panic!("no chunk fails"),
        );

        gather.chunk_done(2, vec![5]);
        gather.chunk_done(0, vec![1, 2]);
        assert!(!result.ready());
        gather.chunk_done(1, vec![3, 4]);
        assert_eq!(result.get(None), Ok(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_gather_reports_first_error_once() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        let gather: Arc<Gather<u32>> = Gather::new(
            2,
            |_| panic!("must not succeed"),
            move |e| seen.lock().push(e),
        );

        gather.chunk_failed(DelegateError::TaskFailed("first".into()).into());
        gather.chunk_failed(DelegateError::TaskFailed("second".into()).into());
        gather.chunk_done(1, vec![1]);
        gather.chunk_done(0, vec![2]);

        assert_eq!(
            *errors.lock(),
            vec![BridgeError::from(DelegateError::TaskFailed("first".into()))]
        );
    }
}
