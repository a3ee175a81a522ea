/*!
 * Tracing
 * Subscriber setup and spans for remote calls
 */

use std::time::Instant;
use tracing::{debug, info, span, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - AIOBRIDGE_TRACE_JSON: Enable JSON output (default: false)
///
/// Logs go to stderr. Does nothing if a global subscriber is already installed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("AIOBRIDGE_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span around one manager round trip
///
/// Logs the call's duration and outcome at debug level when dropped.
pub struct CallSpan {
    span: tracing::Span,
    start: Instant,
    method: String,
    failed: bool,
}

impl CallSpan {
    pub fn new(kind: &str, object: u64, method: &str) -> Self {
        let span = span!(
            Level::DEBUG,
            "manager_call",
            kind = kind,
            object = object,
            method = method,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            method: method.to_string(),
            failed: false,
        }
    }

    pub fn record_error(&mut self, error: &dyn std::fmt::Display) {
        self.failed = true;
        self.span.record("result", "error");
        let _entered = self.span.enter();
        debug!(method = %self.method, error = %error, "manager call failed");
    }
}

impl Drop for CallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        if !self.failed {
            self.span.record("result", "ok");
        }
        self.span.record("duration_us", duration.as_micros() as u64);

        let _entered = self.span.enter();
        debug!(
            method = %self.method,
            duration_us = duration.as_micros() as u64,
            "manager call completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_call_span_records_failure() {
        init_tracing();
        let mut span = CallSpan::new("lock", 1, "release");
        span.record_error(&"cannot release un-acquired lock");
        assert!(span.failed);
    }
}
