/*!
 * Capabilities
 *
 * Declarative descriptors naming the blocking operations a wrapper type
 * offloads, and the pool size its engine runs with.
 *
 * # Resolution
 *
 * A capability may compose others. Resolving one yields:
 * - Operations: its own first, then each composed capability depth-first,
 *   duplicates dropped
 * - Pool size: its own if set, else the first composed capability that sets
 *   one (depth-first), else `BridgeConfig::default_pool_workers`
 *
 * The offloaded methods themselves live on the traits in [`traits`]; a wrapper
 * opts in with an empty `impl`.
 */

pub mod traits;

pub use traits::{
    AsyncAccept, AsyncAcquire, AsyncCondition, AsyncConnection, AsyncJoin, AsyncJoinableQueue,
    AsyncQueue, AsyncWait,
};

use crate::core::config::BridgeConfig;
use crate::core::errors::BridgeResult;
use crate::core::limits::LOCK_POOL_WORKERS;
use crate::executor::{Executor, OffloadHandle};
use std::sync::Arc;

/// Capability descriptor
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    pub name: &'static str,
    pub operations: &'static [&'static str],
    pub pool_workers: Option<usize>,
    pub composes: &'static [&'static Capability],
}

/// A capability with its composition flattened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCapability {
    pub name: &'static str,
    pub operations: Vec<&'static str>,
    pub pool_workers: usize,
}

impl Capability {
    pub const fn new(name: &'static str, operations: &'static [&'static str]) -> Self {
        Self {
            name,
            operations,
            pool_workers: None,
            composes: &[],
        }
    }

    pub const fn with_pool_workers(mut self, workers: usize) -> Self {
        self.pool_workers = Some(workers);
        self
    }

    pub const fn composing(mut self, composes: &'static [&'static Capability]) -> Self {
        self.composes = composes;
        self
    }

    pub fn resolve(&self) -> ResolvedCapability {
        let mut operations = Vec::new();
        self.collect_operations(&mut operations);

        let pool_workers = self
            .find_pool_workers()
            .unwrap_or_else(|| BridgeConfig::global().default_pool_workers);

        ResolvedCapability {
            name: self.name,
            operations,
            pool_workers,
        }
    }

    /// Whether `operation` is offloaded by this capability or one it composes
    pub fn supports(&self, operation: &str) -> bool {
        self.operations.contains(&operation)
            || self.composes.iter().any(|c| c.supports(operation))
    }

    fn collect_operations(&self, out: &mut Vec<&'static str>) {
        for op in self.operations {
            if !out.contains(op) {
                out.push(op);
            }
        }
        for composed in self.composes {
            composed.collect_operations(out);
        }
    }

    fn find_pool_workers(&self) -> Option<usize> {
        self.pool_workers
            .or_else(|| self.composes.iter().find_map(|c| c.find_pool_workers()))
    }
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

pub const LOCK: Capability =
    Capability::new("lock", &["acquire", "release"]).with_pool_workers(LOCK_POOL_WORKERS);

pub const WAITER: Capability =
    Capability::new("waiter", &["wait"]).with_pool_workers(LOCK_POOL_WORKERS);

pub const CONDITION: Capability =
    Capability::new("condition", &["wait_for", "notify", "notify_all"])
        .with_pool_workers(LOCK_POOL_WORKERS)
        .composing(&[&LOCK, &WAITER]);

pub const QUEUE: Capability = Capability::new("queue", &["get", "put"]);

pub const JOINABLE_QUEUE: Capability =
    Capability::new("joinable_queue", &["join"]).composing(&[&QUEUE]);

pub const POOL: Capability = Capability::new("pool", &["join"]);

pub const PROCESS: Capability = Capability::new("process", &["join"]);

pub const CONNECTION: Capability =
    Capability::new("connection", &["recv", "poll", "send", "send_bytes", "recv_bytes"]);

pub const LISTENER: Capability = Capability::new("listener", &["accept"]);

pub const PROXY: Capability = Capability::new("proxy", &["call_method"]);

pub const QUEUE_PROXY: Capability =
    Capability::new("queue_proxy", &[]).composing(&[&PROXY, &JOINABLE_QUEUE]);

pub const ACQUIRER_PROXY: Capability =
    Capability::new("acquirer_proxy", &[]).composing(&[&PROXY, &LOCK]);

pub const CONDITION_PROXY: Capability =
    Capability::new("condition_proxy", &["wait", "wait_for"]).composing(&[&ACQUIRER_PROXY]);

pub const WAITER_PROXY: Capability =
    Capability::new("waiter_proxy", &[]).composing(&[&PROXY, &WAITER]);

// =============================================================================
// BRIDGE
// =============================================================================

/// A wrapper: one delegate plus the executor its offloaded calls run on
pub trait Bridge: Send + Sync {
    type Delegate: Send + Sync + 'static;

    const CAPABILITY: &'static Capability;

    fn delegate(&self) -> &Arc<Self::Delegate>;

    fn executor(&self) -> &Executor;

    /// Run `op` against the delegate on a worker thread
    fn offload<F, R>(&self, op: F) -> OffloadHandle<R>
    where
        F: FnOnce(&Self::Delegate) -> R + Send + 'static,
        R: Send + 'static,
    {
        let delegate = Arc::clone(self.delegate());
        self.executor().submit(move || op(&delegate))
    }

    /// Run `op` against the delegate on a worker thread, blocking the caller
    fn run_in_thread<F, R>(&self, op: F) -> BridgeResult<R>
    where
        F: FnOnce(&Self::Delegate) -> R + Send + 'static,
        R: Send + 'static,
    {
        let delegate = Arc::clone(self.delegate());
        self.executor().run_blocking(move || op(&delegate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: Capability = Capability::new("base", &["get", "put"]);
    const SIZED: Capability = Capability::new("sized", &["put", "join"]).with_pool_workers(3);
    const OTHER: Capability = Capability::new("other", &["close"]).with_pool_workers(7);
    const COMPOSED: Capability =
        Capability::new("composed", &["drain"]).composing(&[&BASE, &SIZED, &OTHER]);

    #[test]
    fn test_operations_are_unioned_in_order() {
        let resolved = COMPOSED.resolve();
        assert_eq!(resolved.operations, vec!["drain", "get", "put", "join", "close"]);
        assert!(COMPOSED.supports("close"));
        assert!(!COMPOSED.supports("recv"));
    }

    #[test]
    fn test_first_composed_pool_size_wins() {
        assert_eq!(COMPOSED.resolve().pool_workers, 3);
    }

    #[test]
    fn test_explicit_pool_size_wins() {
        const EXPLICIT: Capability = Capability::new("explicit", &[])
            .with_pool_workers(2)
            .composing(&[&OTHER]);
        assert_eq!(EXPLICIT.resolve().pool_workers, 2);
    }

    #[test]
    fn test_global_default_pool_size() {
        assert_eq!(
            BASE.resolve().pool_workers,
            BridgeConfig::global().default_pool_workers
        );
    }

    #[test]
    fn test_builtin_descriptors() {
        assert_eq!(CONDITION.resolve().pool_workers, 1);
        assert_eq!(
            CONDITION.resolve().operations,
            vec!["wait_for", "notify", "notify_all", "acquire", "release", "wait"]
        );
        assert_eq!(JOINABLE_QUEUE.resolve().operations, vec!["join", "get", "put"]);
        assert_eq!(ACQUIRER_PROXY.resolve().pool_workers, 1);
    }
}
