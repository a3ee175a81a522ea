/*!
 * Monitoring
 * Tracing subscriber setup and spans
 */

pub mod tracer;

pub use tracer::{init_tracing, CallSpan};
