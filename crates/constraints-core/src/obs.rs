//! Structured observability hooks for the request lifecycle.
//!
//! This module provides:
//! - Request-scoped tracing spans via `RequestSpan`
//! - Emission functions for lifecycle events: received, completed, panic,
//!   timeout, fatal
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::info;
use uuid::Uuid;

/// Request-scoped tracing span, tagged with a fresh request id.
///
/// Handling a line awaits the sandbox, so the span is attached with
/// [`tracing::Instrument`] rather than entered:
///
/// ```ignore
/// let span = RequestSpan::new();
/// handle(line).instrument(span.span()).await;
/// ```
pub struct RequestSpan {
    request_id: Uuid,
    span: tracing::Span,
}

impl Default for RequestSpan {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestSpan {
    pub fn new() -> Self {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("constraints.request", request_id = %request_id);
        Self { request_id, span }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

/// Emit event: a line was read and classified.
pub fn emit_request_received(kind: &str, bytes: usize) {
    info!(event = "request.received", kind = %kind, bytes = bytes);
}

/// Emit event: a response was written.
pub fn emit_request_completed(marker: &str, duration_ms: u64) {
    info!(event = "request.completed", marker = %marker, duration_ms = duration_ms);
}

/// Emit event: compilation produced diagnostics.
pub fn emit_diagnostics(count: usize) {
    info!(event = "request.diagnostics", count = count);
}

/// Emit event: execution hit the wall-clock limit.
pub fn emit_timeout(limit_ms: u64) {
    tracing::warn!(event = "request.timeout", limit_ms = limit_ms);
}

/// Emit event: a request failed locally; the loop continues.
pub fn emit_request_panic(error: &dyn std::fmt::Display) {
    tracing::warn!(event = "request.panic", error = %error);
}

/// Emit event: the fatal guard fired; the process is about to exit.
pub fn emit_fatal(description: &str) {
    tracing::error!(event = "service.fatal", description = %description);
}

/// Emit event: a fixed library unit was loaded.
pub fn emit_library_loaded(file: &str, bytes: usize, sha256: &str) {
    info!(event = "library.loaded", file = %file, bytes = bytes, sha256 = %sha256);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_span_ids_are_unique() {
        let a = RequestSpan::new();
        let b = RequestSpan::new();
        assert_ne!(a.request_id(), b.request_id());
    }
}
