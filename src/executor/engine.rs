/*!
 * Offload Engine
 * Bounded worker-thread pool hosting blocking calls
 */

use super::handle::OffloadHandle;
use crate::core::errors::{BridgeError, BridgeResult};
use crate::core::limits::{MAX_POOL_WORKERS, OFFLOAD_THREAD_PREFIX};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(0);

/// Fixed-size pool of worker threads fed through a flume channel
///
/// Jobs run in submission order per worker; with several workers, two jobs
/// submitted back to back may overlap.
pub struct OffloadEngine {
    sender: Mutex<Option<flume::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
    pending: Arc<AtomicUsize>,
}

impl OffloadEngine {
    /// Spawn `size` workers (clamped to 1..=MAX_POOL_WORKERS)
    pub fn new(size: usize) -> BridgeResult<Self> {
        let size = size.clamp(1, MAX_POOL_WORKERS);
        let (tx, rx) = flume::unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            match spawn_worker(rx.clone()) {
                Ok(handle) => workers.push(handle),
                Err(e) if workers.is_empty() => return Err(BridgeError::WorkerSpawn(e.to_string())),
                Err(e) => {
                    warn!(
                        error = %e,
                        spawned = workers.len(),
                        requested = size,
                        "Offload pool started short"
                    );
                    break;
                }
            }
        }

        let worker_ids = workers.iter().map(|h| h.thread().id()).collect();
        debug!(workers = workers.len(), "Offload engine started");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            worker_ids,
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Run `op` on a worker thread
    pub fn submit<F, R>(&self, op: F) -> OffloadHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let pending = Arc::clone(&self.pending);

        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(op))
                .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())));
            pending.fetch_sub(1, Ordering::AcqRel);
            // Receiver gone means the caller stopped waiting; the call still ran
            let _ = tx.send(outcome);
        });

        if self.enqueue(job) {
            OffloadHandle::pending(rx)
        } else {
            OffloadHandle::ready(Err(BridgeError::EngineShutdown))
        }
    }

    /// Run `op` on a worker thread and block the current thread until it is done
    ///
    /// Called from one of this engine's own workers, `op` runs inline: that is
    /// already a worker thread, and queueing behind itself would deadlock a
    /// single-worker pool.
    pub fn run_blocking<F, R>(&self, op: F) -> BridgeResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_worker_thread() {
            return panic::catch_unwind(AssertUnwindSafe(op))
                .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())));
        }

        let (tx, rx) = flume::bounded(1);
        let pending = Arc::clone(&self.pending);

        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(op))
                .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())));
            pending.fetch_sub(1, Ordering::AcqRel);
            let _ = tx.send(outcome);
        });

        if !self.enqueue(job) {
            return Err(BridgeError::EngineShutdown);
        }

        rx.recv().unwrap_or(Err(BridgeError::EngineShutdown))
    }

    /// Stop accepting jobs
    ///
    /// Jobs already queued still run. With `wait`, blocks until every worker
    /// has drained the queue and exited.
    pub fn shutdown(&self, wait: bool) {
        let sender = self.sender.lock().take();
        if sender.is_none() && !wait {
            return;
        }
        drop(sender);

        debug!(wait, pending = self.pending(), "Offload engine shutting down");

        if wait {
            let handles = std::mem::take(&mut *self.workers.lock());
            let current = thread::current().id();
            for handle in handles {
                if handle.thread().id() == current {
                    continue;
                }
                if handle.join().is_err() {
                    warn!("Offload worker exited by panic");
                }
            }
        }
    }

    /// Stop accepting jobs and run `on_drained` once every queued job is done
    ///
    /// Returns immediately; a reaper thread waits for the workers. A later
    /// `shutdown(true)` waits for the reaper as well.
    pub fn shutdown_then<F>(&self, on_drained: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.sender.lock().take());

        let mut workers = self.workers.lock();
        let handles = std::mem::take(&mut *workers);
        let current = thread::current().id();

        let reaper = thread::Builder::new()
            .name(format!("{}-reaper", OFFLOAD_THREAD_PREFIX))
            .spawn(move || {
                for handle in handles {
                    if handle.thread().id() != current && handle.join().is_err() {
                        warn!("Offload worker exited by panic");
                    }
                }
                on_drained();
            });

        match reaper {
            Ok(handle) => workers.push(handle),
            Err(e) => warn!(error = %e, "Failed to start offload reaper; drain callback skipped"),
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Number of worker threads
    #[inline]
    pub fn workers(&self) -> usize {
        self.worker_ids.len()
    }

    /// Jobs submitted but not yet finished
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    #[inline]
    fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_ids.contains(&current)
    }

    fn enqueue(&self, job: Job) -> bool {
        let sender = match self.sender.lock().as_ref() {
            Some(sender) => sender.clone(),
            None => return false,
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }
}

fn spawn_worker(rx: flume::Receiver<Job>) -> std::io::Result<JoinHandle<()>> {
    let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
    thread::Builder::new()
        .name(format!("{}-{}", OFFLOAD_THREAD_PREFIX, id))
        .spawn(move || {
            while let Ok(job) = rx.recv() {
                job();
            }
            debug!(worker = id, "Offload worker exiting");
        })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_runs_on_worker() {
        let engine = OffloadEngine::new(2).unwrap();
        let caller = thread::current().id();

        let worker = engine.submit(|| thread::current().id()).await.unwrap();
        assert_ne!(worker, caller);
        assert!(engine.worker_ids.contains(&worker));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let engine = OffloadEngine::new(1).unwrap();
        let result = engine.submit(|| -> u32 { panic!("delegate exploded") }).await;
        assert_eq!(result, Err(BridgeError::Panicked("delegate exploded".into())));

        // Worker survives the panic
        assert_eq!(engine.submit(|| 3).await, Ok(3));
    }

    #[test]
    fn test_run_blocking() {
        let engine = OffloadEngine::new(1).unwrap();
        let caller = thread::current().id();
        let ran_on = engine.run_blocking(|| thread::current().id()).unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn test_run_blocking_from_worker_runs_inline() {
        let engine = Arc::new(OffloadEngine::new(1).unwrap());
        let inner = Arc::clone(&engine);

        let (outer_id, inner_id) = engine
            .run_blocking(move || {
                let outer = thread::current().id();
                let nested = inner.run_blocking(|| thread::current().id()).unwrap();
                (outer, nested)
            })
            .unwrap();
        assert_eq!(outer_id, inner_id);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_jobs() {
        let engine = OffloadEngine::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let counter = Arc::clone(&counter);
                engine.submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst)
                })
            })
            .collect();

        engine.shutdown(true);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(engine.pending(), 0);

        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let late = engine.submit(|| 1).await;
        assert_eq!(late, Err(BridgeError::EngineShutdown));
    }

    #[tokio::test]
    async fn test_shutdown_then_runs_after_drain() {
        let engine = OffloadEngine::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen_at_drain = Arc::new(AtomicUsize::new(usize::MAX));

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            let _ = engine.submit(move || {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let (counter_at, seen) = (Arc::clone(&counter), Arc::clone(&seen_at_drain));
        engine.shutdown_then(move || {
            seen.store(counter_at.load(Ordering::SeqCst), Ordering::SeqCst)
        });
        assert!(engine.is_shutdown());

        engine.shutdown(true);
        assert_eq!(seen_at_drain.load(Ordering::SeqCst), 4);
    }
}
