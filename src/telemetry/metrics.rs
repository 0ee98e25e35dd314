//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"script-lifecycle"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("script-lifecycle")
}

/// Counter: registration calls.
/// Labels: `result` ("created" | "replaced" | "rejected" | "unresolved").
pub fn registrations() -> Counter<u64> {
    meter()
        .u64_counter("lifecycle.registrations")
        .with_description("Number of registration calls")
        .build()
}

/// Counter: settled actions.
/// Labels: `outcome` ("succeeded" | "failed" | "panicked" | "timed_out").
pub fn actions_settled() -> Counter<u64> {
    meter()
        .u64_counter("lifecycle.actions.settled")
        .with_description("Number of settled actions")
        .build()
}

/// Counter: script elements handled by the scanner.
/// Labels: `result` ("evaluated" | "failed" | "opted_out" | "empty").
pub fn scripts_scanned() -> Counter<u64> {
    meter()
        .u64_counter("lifecycle.scripts.scanned")
        .with_description("Number of script elements handled by the scanner")
        .build()
}

/// Histogram: level barrier duration in milliseconds.
/// Labels: `level`.
pub fn level_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("lifecycle.level.duration_ms")
        .with_description("Time from launching a level to its last action settling")
        .with_unit("ms")
        .build()
}
