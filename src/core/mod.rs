/*!
 * Core Module
 * Error types, limits, configuration, framing and polling helpers
 */

pub mod backoff;
pub mod codec;
pub mod config;
pub mod errors;
pub mod limits;

// Re-export for convenience
pub use config::BridgeConfig;
pub use errors::*;
