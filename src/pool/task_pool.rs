/*!
 * Task Pool
 *
 * Fixed set of worker threads running submitted closures.
 *
 * # Lifecycle
 *
 * - Running: accepts `apply`/`map`/`starmap` calls
 * - Closed: no new work; workers finish the queue, then exit
 * - Terminated: no new work; queued tasks fail with `TaskFailed` and workers
 *   exit after their current task
 *
 * `join` is only valid once the pool is closed or terminated. A panicking task
 * fails its own result and leaves the worker running.
 */

use super::result::{AsyncResult, Gather};
use super::StarFn;
use crate::core::config::BridgeConfig;
use crate::core::errors::{BridgeError, BridgeResult, DelegateError};
use crate::core::limits::{MAP_CHUNKS_PER_WORKER, MAX_POOL_WORKERS, TASK_POOL_THREAD_PREFIX};
use crate::executor::panic_message;
use crate::sync::traits::Join;
use crate::sync::wait_while;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Job receives `true` when the pool was terminated before it could run
type Task = Box<dyn FnOnce(bool) + Send + 'static>;

static NEXT_POOL_WORKER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Running,
    Closed,
    Terminated,
}

struct Shared {
    alive: Mutex<usize>,
    all_exited: Condvar,
    terminated: AtomicBool,
}

pub struct TaskPool {
    sender: Mutex<Option<flume::Sender<Task>>>,
    state: Mutex<PoolState>,
    shared: Arc<Shared>,
    workers: usize,
}

impl TaskPool {
    /// Pool of `workers` threads; `None` uses the configured default
    pub fn new(workers: Option<usize>) -> BridgeResult<Self> {
        let requested = workers
            .unwrap_or(BridgeConfig::global().default_pool_workers)
            .clamp(1, MAX_POOL_WORKERS);
        let (tx, rx) = flume::unbounded::<Task>();
        let shared = Arc::new(Shared {
            alive: Mutex::new(0),
            all_exited: Condvar::new(),
            terminated: AtomicBool::new(false),
        });

        let mut spawned = 0;
        for _ in 0..requested {
            match spawn_pool_worker(rx.clone(), Arc::clone(&shared)) {
                Ok(()) => spawned += 1,
                Err(e) if spawned == 0 => return Err(BridgeError::WorkerSpawn(e.to_string())),
                Err(e) => {
                    warn!(error = %e, spawned, requested, "Task pool started short");
                    break;
                }
            }
        }
        debug!(workers = spawned, "Task pool started");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            state: Mutex::new(PoolState::Running),
            shared,
            workers: spawned,
        })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }

    /// Worker threads that have not exited yet
    pub fn alive(&self) -> usize {
        *self.shared.alive.lock()
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Run `f` on a worker and block for its value
    pub fn apply<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.apply_async(f)?.get(None)
    }

    pub fn apply_async<F, R>(&self, f: F) -> BridgeResult<AsyncResult<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result, completer) = AsyncResult::new();
        let completer = Arc::new(Mutex::new(Some(completer)));
        let on_error = Arc::clone(&completer);

        self.apply_async_with(
            f,
            move |value| {
                if let Some(c) = completer.lock().take() {
                    c.complete(Ok(value));
                }
            },
            move |error| {
                if let Some(c) = on_error.lock().take() {
                    c.complete(Err(error));
                }
            },
        )?;
        Ok(result)
    }

    /// Run `f` on a worker; exactly one of the callbacks fires on that worker
    ///
    /// A panic in `f`, or termination of the pool before `f` ran, reaches
    /// `on_error` as `DelegateError::TaskFailed`.
    pub fn apply_async_with<F, R, S, E>(&self, f: F, on_success: S, on_error: E) -> BridgeResult<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        S: FnOnce(R) + Send + 'static,
        E: FnOnce(BridgeError) + Send + 'static,
    {
        self.enqueue(Box::new(move |terminated: bool| {
            if terminated {
                on_error(task_failed("pool terminated before the task ran"));
                return;
            }
            match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => on_success(value),
                Err(payload) => on_error(task_failed(&panic_message(payload.as_ref()))),
            }
        }))
    }

    /// Apply `f` to every item, preserving order
    ///
    /// Items are split into chunks of `chunksize`; without one, each worker
    /// gets about `MAP_CHUNKS_PER_WORKER` chunks.
    pub fn map<F, A, R>(
        &self,
        f: F,
        items: Vec<A>,
        chunksize: Option<usize>,
    ) -> BridgeResult<Vec<R>>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
        A: Send + 'static,
        R: Send + 'static,
    {
        self.map_async(f, items, chunksize)?.get(None)
    }

    pub fn map_async<F, A, R>(
        &self,
        f: F,
        items: Vec<A>,
        chunksize: Option<usize>,
    ) -> BridgeResult<AsyncResult<Vec<R>>>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
        A: Send + 'static,
        R: Send + 'static,
    {
        let (result, completer) = AsyncResult::new();
        let completer = Arc::new(Mutex::new(Some(completer)));
        let on_error = Arc::clone(&completer);

        self.map_async_with(
            f,
            items,
            chunksize,
            move |values| {
                if let Some(c) = completer.lock().take() {
                    c.complete(Ok(values));
                }
            },
            move |error| {
                if let Some(c) = on_error.lock().take() {
                    c.complete(Err(error));
                }
            },
        )?;
        Ok(result)
    }

    /// Callback form of [`map_async`](Self::map_async)
    ///
    /// Callbacks fire on the worker that finishes the last chunk, or the first
    /// failing one.
    pub fn map_async_with<F, A, R, S, E>(
        &self,
        f: F,
        items: Vec<A>,
        chunksize: Option<usize>,
        on_success: S,
        on_error: E,
    ) -> BridgeResult<()>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
        A: Send + 'static,
        R: Send + 'static,
        S: FnOnce(Vec<R>) + Send + 'static,
        E: FnOnce(BridgeError) + Send + 'static,
    {
        if self.state() != PoolState::Running {
            return Err(not_running());
        }

        let chunksize = chunksize
            .filter(|&c| c > 0)
            .unwrap_or_else(|| default_chunksize(items.len(), self.workers));
        let chunks = split_chunks(items, chunksize);
        let gather = Gather::new(chunks.len(), on_success, on_error);
        let f = Arc::new(f);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let done = Arc::clone(&gather);
            let failed = Arc::clone(&gather);
            self.apply_async_with(
                move || chunk.into_iter().map(|item| (*f)(item)).collect::<Vec<R>>(),
                move |values| done.chunk_done(index, values),
                move |error| failed.chunk_failed(error),
            )?;
        }
        Ok(())
    }

    /// Like `map`, with each item unpacked into the arguments of `f`
    pub fn starmap<F, Args>(
        &self,
        f: F,
        items: Vec<Args>,
        chunksize: Option<usize>,
    ) -> BridgeResult<Vec<F::Output>>
    where
        F: StarFn<Args>,
        Args: Send + 'static,
    {
        self.map(move |args: Args| f.call_star(args), items, chunksize)
    }

    pub fn starmap_async<F, Args>(
        &self,
        f: F,
        items: Vec<Args>,
        chunksize: Option<usize>,
    ) -> BridgeResult<AsyncResult<Vec<F::Output>>>
    where
        F: StarFn<Args>,
        Args: Send + 'static,
    {
        self.map_async(move |args: Args| f.call_star(args), items, chunksize)
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Accept no new tasks; queued ones still run
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state == PoolState::Running {
            *state = PoolState::Closed;
        }
        drop(self.sender.lock().take());
        debug!("Task pool closed");
    }

    /// Stop now: queued tasks fail, running ones finish on their own
    pub fn terminate(&self) {
        *self.state.lock() = PoolState::Terminated;
        self.shared.terminated.store(true, Ordering::Release);
        drop(self.sender.lock().take());
        debug!("Task pool terminated");
    }

    fn enqueue(&self, task: Task) -> BridgeResult<()> {
        let sender = self.sender.lock().clone().ok_or_else(not_running)?;
        sender.send(task).map_err(|_| not_running())
    }
}

impl Join for TaskPool {
    /// Wait for every worker to exit
    fn join(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        if self.state() == PoolState::Running {
            return Err(
                DelegateError::InvalidOperation("join() called on a running pool".into()).into(),
            );
        }
        let mut alive = self.shared.alive.lock();
        Ok(wait_while(&self.shared.all_exited, &mut alive, timeout, |n| *n > 0))
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.workers)
            .field("state", &self.state())
            .field("alive", &self.alive())
            .finish()
    }
}

fn spawn_pool_worker(rx: flume::Receiver<Task>, shared: Arc<Shared>) -> std::io::Result<()> {
    let id = NEXT_POOL_WORKER.fetch_add(1, Ordering::Relaxed);
    *shared.alive.lock() += 1;

    let spawned = thread::Builder::new()
        .name(format!("{}-{}", TASK_POOL_THREAD_PREFIX, id))
        .spawn({
            let shared = Arc::clone(&shared);
            move || {
                while let Ok(task) = rx.recv() {
                    task(shared.terminated.load(Ordering::Acquire));
                }
                let mut alive = shared.alive.lock();
                *alive -= 1;
                if *alive == 0 {
                    shared.all_exited.notify_all();
                }
                debug!(worker = id, "Pool worker exiting");
            }
        });

    if spawned.is_err() {
        *shared.alive.lock() -= 1;
    }
    spawned.map(drop)
}

fn default_chunksize(len: usize, workers: usize) -> usize {
    let chunks = workers.max(1) * MAP_CHUNKS_PER_WORKER;
    len.div_ceil(chunks).max(1)
}

fn split_chunks<A>(items: Vec<A>, chunksize: usize) -> Vec<Vec<A>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunksize));
    let mut current = Vec::with_capacity(chunksize);
    for item in items {
        current.push(item);
        if current.len() == chunksize {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(chunksize)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn task_failed(reason: &str) -> BridgeError {
    DelegateError::TaskFailed(reason.to_string()).into()
}

fn not_running() -> BridgeError {
    DelegateError::InvalidOperation("pool is not running".into()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_runs_on_pool_thread() {
        let pool = TaskPool::new(Some(2)).unwrap();
        let name = pool
            .apply(|| thread::current().name().map(str::to_string))
            .unwrap()
            .unwrap_or_default();
        assert!(name.starts_with(TASK_POOL_THREAD_PREFIX));
    }

    #[test]
    fn test_map_preserves_order() {
        let pool = TaskPool::new(Some(3)).unwrap();
        let squares = pool.map(|x: u64| x * x, (0..50).collect(), Some(4)).unwrap();
        assert_eq!(squares, (0..50).map(|x| x * x).collect::<Vec<_>>());

        let empty: Vec<u64> = pool.map(|x: u64| x, Vec::new(), None).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_starmap_unpacks_tuples() {
        let pool = TaskPool::new(Some(2)).unwrap();
        let sums = pool
            .starmap(|a: i32, b: i32| a + b, vec![(1, 2), (3, 4), (5, 6)], None)
            .unwrap();
        assert_eq!(sums, vec![3, 7, 11]);
    }

    #[test]
    fn test_panicking_task_fails_its_result() {
        let pool = TaskPool::new(Some(1)).unwrap();
        let result = pool.apply(|| -> u32 { panic!("bad input") });
        assert_eq!(result, Err(DelegateError::TaskFailed("bad input".into()).into()));
        assert_eq!(pool.apply(|| 1), Ok(1));
    }

    #[test]
    fn test_close_then_join() {
        let pool = TaskPool::new(Some(2)).unwrap();
        assert!(pool.join(None).is_err());

        let slow = pool
            .apply_async(|| {
                thread::sleep(Duration::from_millis(20));
                "done"
            })
            .unwrap();
        pool.close();
        assert!(pool.apply(|| ()).is_err());

        assert_eq!(pool.join(Some(Duration::from_secs(2))), Ok(true));
        assert_eq!(pool.alive(), 0);
        assert_eq!(slow.get(None), Ok("done"));
    }

    #[test]
    fn test_terminate_fails_queued_tasks() {
        let pool = TaskPool::new(Some(1)).unwrap();
        let (release, gate) = flume::bounded::<()>(0);
        let (started_tx, started) = flume::bounded::<()>(1);

        let running = pool
            .apply_async(move || {
                let _ = started_tx.send(());
                gate.recv().is_ok()
            })
            .unwrap();
        let queued = pool.apply_async(|| 2).unwrap();
        started.recv().unwrap();
        pool.terminate();
        assert_eq!(pool.state(), PoolState::Terminated);

        release.send(()).unwrap();
        assert_eq!(running.get(None), Ok(true));
        assert!(matches!(
            queued.get(None),
            Err(BridgeError::Delegate(DelegateError::TaskFailed(_)))
        ));
        assert_eq!(pool.join(Some(Duration::from_secs(2))), Ok(true));
    }

    #[test]
    fn test_chunking() {
        assert_eq!(split_chunks((1..=5).collect(), 2), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(default_chunksize(0, 4), 1);
        assert_eq!(default_chunksize(100, 4), 7);
    }
}
