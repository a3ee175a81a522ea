/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for every bridge operation
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Result type for operations performed directly on a delegate primitive
pub type DelegateResult<T> = Result<T, DelegateError>;

/// Failures raised by the wrapped primitive itself
///
/// Serializable so that a manager process can ship the exact error back to the
/// caller, where it is reconstructed unchanged.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum DelegateError {
    #[error("Cannot release un-acquired lock")]
    #[diagnostic(
        code(delegate::release_unlocked),
        help("The lock is not currently held. Check acquire/release pairing.")
    )]
    ReleaseUnlocked,

    #[error("Lock is owned by another thread: {0}")]
    #[diagnostic(
        code(delegate::not_owner),
        help("Recursive locks and conditions must be released by the thread that acquired them.")
    )]
    NotOwner(String),

    #[error("Semaphore released too many times (limit {limit})")]
    #[diagnostic(
        code(delegate::value_exceeded),
        help("A bounded semaphore cannot be released beyond its initial value.")
    )]
    ValueExceeded { limit: usize },

    #[error("Barrier is broken")]
    #[diagnostic(
        code(delegate::broken_barrier),
        help("A waiter timed out or the barrier was aborted or reset. Call reset() to reuse it.")
    )]
    BrokenBarrier,

    #[error("Queue is empty")]
    #[diagnostic(code(delegate::empty))]
    Empty,

    #[error("Queue is full")]
    #[diagnostic(code(delegate::full))]
    Full,

    #[error("Resource closed: {0}")]
    #[diagnostic(code(delegate::closed), help("The resource was closed and cannot be used again."))]
    Closed(String),

    #[error("Invalid operation: {0}")]
    #[diagnostic(code(delegate::invalid_operation))]
    InvalidOperation(String),

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(delegate::invalid_argument))]
    InvalidArgument(String),

    #[error("Object {kind} has no method '{method}'")]
    #[diagnostic(
        code(delegate::no_such_method),
        help("The manager does not expose this method for the requested object kind.")
    )]
    NoSuchMethod { kind: String, method: String },

    #[error("Object {0} not found")]
    #[diagnostic(code(delegate::not_found), help("The object may have been disposed."))]
    NotFound(u64),

    #[error("Timed out waiting for {0}")]
    #[diagnostic(code(delegate::timeout))]
    Timeout(String),

    #[error("Task failed: {0}")]
    #[diagnostic(code(delegate::task_failed))]
    TaskFailed(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(delegate::io))]
    Io(String),
}

impl From<std::io::Error> for DelegateError {
    fn from(err: std::io::Error) -> Self {
        DelegateError::Io(err.to_string())
    }
}

/// Failures of the channel to a manager process
///
/// Kept distinct from [`DelegateError`]: these say nothing about the primitive,
/// only that the manager or the connection to it is unavailable.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Failed to connect to manager at {address}: {reason}")]
    #[diagnostic(
        code(transport::connect),
        help("Check that the manager was started and that the address is reachable.")
    )]
    Connect { address: String, reason: String },

    #[error("Channel I/O failed: {0}")]
    #[diagnostic(code(transport::io))]
    Io(String),

    #[error("Frame encoding failed: {0}")]
    #[diagnostic(code(transport::codec))]
    Codec(String),

    #[error("Frame of {len} bytes exceeds limit of {limit} bytes")]
    #[diagnostic(code(transport::frame_too_large))]
    FrameTooLarge { len: usize, limit: usize },

    #[error("Channel closed by peer")]
    #[diagnostic(code(transport::closed), help("The manager process may have shut down."))]
    Closed,

    #[error("Protocol violation: {0}")]
    #[diagnostic(code(transport::protocol))]
    Protocol(String),
}

/// Unified bridge error
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum BridgeError {
    #[error("Ownership violation: {0}")]
    #[diagnostic(
        code(bridge::ownership_violation),
        help("Release through the same path that acquired, or pass force_background_thread = true.")
    )]
    OwnershipViolation(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Delegate(#[from] DelegateError),

    #[error("Transport error: {0}")]
    #[diagnostic(transparent)]
    Transport(#[from] TransportError),

    #[error("Offload engine is shut down")]
    #[diagnostic(
        code(bridge::engine_shutdown),
        help("The wrapper's worker pool was shut down explicitly. Create a new wrapper.")
    )]
    EngineShutdown,

    #[error("Failed to start offload worker: {0}")]
    #[diagnostic(
        code(bridge::worker_spawn),
        help("The OS refused to create a thread. Check process thread limits.")
    )]
    WorkerSpawn(String),

    #[error("Offloaded call panicked: {0}")]
    #[diagnostic(code(bridge::panicked))]
    Panicked(String),

    #[error("Context error: {0}")]
    #[diagnostic(
        code(bridge::context),
        help("The requested start method is not available on this platform.")
    )]
    Context(String),
}

impl BridgeError {
    #[inline]
    pub fn is_ownership_violation(&self) -> bool {
        matches!(self, BridgeError::OwnershipViolation(_))
    }

    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }

    /// The delegate-level error, if this is one
    #[inline]
    pub fn delegate(&self) -> Option<&DelegateError> {
        match self {
            BridgeError::Delegate(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Delegate(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegate_error_survives_bincode() {
        let err = DelegateError::ValueExceeded { limit: 2 };
        let bytes = bincode::serialize(&err).unwrap();
        let back: DelegateError = bincode::deserialize(&bytes).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn test_error_kinds_are_distinguishable() {
        let remote: BridgeError = DelegateError::BrokenBarrier.into();
        let channel: BridgeError = TransportError::Closed.into();

        assert!(remote.delegate().is_some());
        assert!(!remote.is_transport());
        assert!(channel.is_transport());
        assert!(channel.delegate().is_none());
    }
}
