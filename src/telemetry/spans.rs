//! Span helpers for runs, levels and actions.

use tracing::Span;
use uuid::Uuid;

/// Span covering one `run_pending` call.
pub fn start_run_span(session: &Uuid, pending: usize) -> Span {
    tracing::info_span!(
        "lifecycle.run",
        "lifecycle.session" = %session,
        "lifecycle.pending" = pending,
        "lifecycle.failed" = tracing::field::Empty,
    )
}

/// Record how many actions failed once the run is over.
pub fn record_run_failures(span: &Span, failed: usize) {
    span.record("lifecycle.failed", failed);
}

/// Span covering one level barrier.
pub fn start_level_span(level: u32, size: usize) -> Span {
    tracing::debug_span!(
        "lifecycle.level",
        "lifecycle.level" = level,
        "lifecycle.size" = size,
    )
}

/// Span wrapping a single action's execution.
pub fn start_action_span(id: &str, level: u32) -> Span {
    tracing::debug_span!(
        "lifecycle.action",
        "lifecycle.id" = id,
        "lifecycle.level" = level,
    )
}

/// Span covering one document scan.
pub fn start_scan_span(session: &Uuid, candidates: usize) -> Span {
    tracing::info_span!(
        "lifecycle.scan",
        "lifecycle.session" = %session,
        "lifecycle.candidates" = candidates,
    )
}
