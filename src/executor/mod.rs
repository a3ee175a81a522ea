/*!
 * Executor
 *
 * Per-wrapper holder of a lazily started [`OffloadEngine`].
 *
 * # Lifecycle
 *
 * - Unstarted until the first offloaded call
 * - Running once an engine exists; the pool size comes from the wrapper
 *   type's resolved capability
 * - Shut down after an explicit `shutdown`; later calls fail with
 *   `BridgeError::EngineShutdown`
 *
 * A transfer copy never carries the engine across: the receiving side starts
 * its own on first use.
 */

mod engine;
mod handle;

pub use engine::OffloadEngine;
pub(crate) use engine::panic_message;
pub use handle::{OffloadHandle, Resolver};

use crate::capability::Capability;
use crate::core::errors::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use std::sync::Arc;

enum Slot {
    Unstarted,
    Running(Arc<OffloadEngine>),
    /// Keeps the engine so a later `shutdown(true)` can still wait for it
    ShutDown(Option<Arc<OffloadEngine>>),
}

/// Lazily started offload engine owned by one wrapper
pub struct Executor {
    pool_workers: usize,
    slot: Mutex<Slot>,
}

impl Executor {
    pub fn new(pool_workers: usize) -> Self {
        Self {
            pool_workers,
            slot: Mutex::new(Slot::Unstarted),
        }
    }

    /// Executor sized for a capability's resolved pool
    pub fn for_capability(capability: &'static Capability) -> Self {
        Self::new(capability.resolve().pool_workers)
    }

    #[inline]
    pub fn pool_workers(&self) -> usize {
        self.pool_workers
    }

    /// The running engine, starting it if needed
    pub fn engine(&self) -> BridgeResult<Arc<OffloadEngine>> {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Running(engine) => Ok(Arc::clone(engine)),
            Slot::ShutDown(_) => Err(BridgeError::EngineShutdown),
            Slot::Unstarted => {
                let engine = Arc::new(OffloadEngine::new(self.pool_workers)?);
                *slot = Slot::Running(Arc::clone(&engine));
                Ok(engine)
            }
        }
    }

    pub fn submit<F, R>(&self, op: F) -> OffloadHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match self.engine() {
            Ok(engine) => engine.submit(op),
            Err(e) => OffloadHandle::ready(Err(e)),
        }
    }

    pub fn run_blocking<F, R>(&self, op: F) -> BridgeResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.engine()?.run_blocking(op)
    }

    /// Shut the engine down
    ///
    /// Queued calls still run. `wait` blocks until they have finished.
    pub fn shutdown(&self, wait: bool) {
        if let Some(engine) = self.stop() {
            engine.shutdown(wait);
        }
    }

    /// Shut the engine down without blocking; `on_drained` runs once every
    /// queued call has finished (immediately if the engine never started)
    pub fn shutdown_then<F>(&self, on_drained: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.stop() {
            Some(engine) if !engine.is_shutdown() => engine.shutdown_then(on_drained),
            Some(engine) => {
                engine.shutdown(true);
                on_drained();
            }
            None => on_drained(),
        }
    }

    fn stop(&self) -> Option<Arc<OffloadEngine>> {
        let mut slot = self.slot.lock();
        let engine = match &*slot {
            Slot::Running(engine) => Some(Arc::clone(engine)),
            Slot::ShutDown(engine) => engine.clone(),
            Slot::Unstarted => None,
        };
        *slot = Slot::ShutDown(engine.clone());
        engine
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Running(_))
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        matches!(*self.slot.lock(), Slot::ShutDown(_))
    }

    /// Drop this holder's engine reference ahead of a transfer
    ///
    /// The engine itself keeps running for any other holder.
    pub fn prepare_for_transfer(&self) {
        *self.slot.lock() = Slot::Unstarted;
    }

    /// Reset after a transfer; the next offloaded call starts a new engine
    pub fn resume_after_transfer(&self) {
        *self.slot.lock() = Slot::Unstarted;
    }
}

impl Clone for Executor {
    fn clone(&self) -> Self {
        Self::new(self.pool_workers)
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.slot.lock() {
            Slot::Unstarted => "unstarted",
            Slot::Running(_) => "running",
            Slot::ShutDown(_) => "shut_down",
        };
        f.debug_struct("Executor")
            .field("pool_workers", &self.pool_workers)
            .field("state", &state)
            .finish()
    }
}

/// Explicit hook pair run around moving a wrapper to another process or thread
pub trait Transfer {
    fn prepare_for_transfer(&self);
    fn resume_after_transfer(&self);
}
