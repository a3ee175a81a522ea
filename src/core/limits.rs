/*!
 * Limits and Constants
 *
 * Centralized location for bridge-wide limits, thresholds, and defaults.
 * Values marked [PERF] trade latency for CPU usage.
 */

use std::time::Duration;

// =============================================================================
// OFFLOAD ENGINE
// =============================================================================

/// Pool size used by lock-like wrappers
/// Offloaded acquire and release must land on the same OS thread
pub const LOCK_POOL_WORKERS: usize = 1;

/// Upper bound on any configured pool size
pub const MAX_POOL_WORKERS: usize = 256;

/// Worker thread name prefix
pub const OFFLOAD_THREAD_PREFIX: &str = "aiobridge-offload";

// =============================================================================
// TASK POOL
// =============================================================================

/// Worker thread name prefix for the task pool delegate
pub const TASK_POOL_THREAD_PREFIX: &str = "aiobridge-pool";

/// Chunks per worker when no chunksize is given to map()
pub const MAP_CHUNKS_PER_WORKER: usize = 4;

// =============================================================================
// POLLING BACKOFF
// =============================================================================

/// Retries spent on spin hints before yielding
/// [PERF] Most child exits and socket polls resolve well within this window
pub const BACKOFF_SPIN_RETRIES: u32 = 15;

/// Retries spent yielding before sleeping
pub const BACKOFF_YIELD_RETRIES: u32 = 99;

/// Sleep interval once the backoff reaches its last phase
pub const BACKOFF_SLEEP: Duration = Duration::from_millis(5);

// =============================================================================
// MANAGER / TRANSPORT
// =============================================================================

/// Maximum size of a single frame (16MB)
/// [SECURITY] Protects the reader from allocating on a corrupt length prefix
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes (u32, big endian)
pub const FRAME_HEADER_LEN: usize = 4;

/// Default connect timeout for manager channels
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default manager bind address (ephemeral loopback port)
pub const DEFAULT_MANAGER_BIND: &str = "127.0.0.1:0";

/// Server thread name prefix
pub const MANAGER_THREAD_PREFIX: &str = "aiobridge-manager";
