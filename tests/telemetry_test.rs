//! Integration tests for telemetry initialization and span helpers.

use std::io::Write;
use std::sync::{Arc, Mutex};

use script_lifecycle::event::EventKind;
use script_lifecycle::telemetry::{TelemetryConfig, init_telemetry, metrics, spans};
use script_lifecycle::{Config, Coordinator};
use tracing_subscriber::layer::SubscriberExt;
use uuid::Uuid;

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Register a blank id under a thread-local subscriber and return what it printed.
fn console_output(debug: bool) -> (String, Coordinator) {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(move || writer.clone()),
    );
    let _guard = tracing::subscriber::set_default(subscriber);

    let c = Coordinator::new(Config {
        debug: Some(debug),
        ..Config::default()
    });
    c.register_sync("", || Ok(()), 0);
    (capture.contents(), c)
}

#[test]
fn telemetry_initializes_from_config() {
    // A global subscriber can only be set once per process; a second call
    // returning Err is acceptable here.
    let _ = init_telemetry(TelemetryConfig::from(&Config::default()));
    assert!(init_telemetry(TelemetryConfig::default()).is_err());
}

#[test]
fn spans_and_metrics_are_usable_without_a_provider() {
    let session = Uuid::new_v4();
    let run = spans::start_run_span(&session, 3);
    spans::record_run_failures(&run, 1);
    let _level = spans::start_level_span(0, 3);
    let _action = spans::start_action_span("hero", 0);
    let _scan = spans::start_scan_span(&session, 2);

    metrics::registrations().add(1, &[]);
    metrics::actions_settled().add(1, &[]);
    metrics::scripts_scanned().add(1, &[]);
    metrics::level_duration_ms().record(1.5, &[]);
}

#[tokio::test]
async fn diagnostics_log_through_tracing_when_enabled() {
    let _ = init_telemetry(TelemetryConfig::default());
    let c = Coordinator::new(Config {
        debug: Some(true),
        ..Config::default()
    });
    c.register_sync("", || Ok(()), 0);
    c.register_sync("a", || anyhow::bail!("logged, not thrown"), "missing");
    let report = c.run_pending().await;
    assert_eq!(report.failed().len(), 1);
    assert_eq!(c.failures().len(), 3, "rejected id, unknown reference, failed action");
}

#[test]
fn enabled_diagnostics_reach_the_console() {
    let (output, _) = console_output(true);
    assert!(output.contains("registration rejected"), "got {output:?}");
    assert!(output.contains("WARN"));
}

#[test]
fn disabled_diagnostics_are_recorded_but_not_printed() {
    let (output, c) = console_output(false);
    assert!(output.is_empty(), "got {output:?}");
    assert!(
        c.events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::InvalidRegistration { .. }))
    );
}
