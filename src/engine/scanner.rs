//! Document rescans.
//!
//! Finds script elements the session has not handled yet, activates them
//! through the script host, and marks them processed so later scans skip
//! them.

use std::panic::{AssertUnwindSafe, catch_unwind};

use opentelemetry::KeyValue;
use serde::Serialize;

use super::{Coordinator, RunReport};
use crate::document::{Document, Element};
use crate::event::{EventKind, SkipReason};
use crate::telemetry::{metrics, spans};

/// Value written to the processed marker.
const PROCESSED_VALUE: &str = "true";

/// What a single `refresh` call did. Indices point into the document as it
/// was during the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub evaluated: Vec<usize>,
    pub failed: Vec<usize>,
    pub opted_out: Vec<usize>,
    pub empty: Vec<usize>,
    /// Present when the scan ran pending work afterwards.
    pub run: Option<RunReport>,
}

impl ScanReport {
    /// Elements marked processed by this scan.
    pub fn processed(&self) -> usize {
        self.evaluated.len() + self.failed.len() + self.opted_out.len() + self.empty.len()
    }
}

impl Coordinator {
    /// Scan `document` for new script elements, activate them, then run
    /// pending work when `auto_run` is set.
    ///
    /// A failing script is reported and marked processed like any other;
    /// it never stops the scan. Calling this repeatedly only touches
    /// elements added since the previous call.
    pub async fn refresh(&self, document: &mut Document, auto_run: bool) -> ScanReport {
        self.observe_host(&document.host);

        let mut report = self.scan(document);
        if auto_run {
            report.run = Some(self.run_pending().await);
        }
        report
    }

    /// Indices of script elements the next scan would handle.
    pub fn unprocessed_scripts(&self, document: &Document) -> Vec<usize> {
        document
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| self.is_candidate(el))
            .map(|(i, _)| i)
            .collect()
    }

    fn is_candidate(&self, element: &Element) -> bool {
        let config = &self.inner.config;
        element.is_script()
            && !element.has_attribute(&config.processed_attribute)
            && config.is_script_type(element.attribute("type"))
    }

    fn scan(&self, document: &mut Document) -> ScanReport {
        let candidates = self.unprocessed_scripts(document);
        let span = spans::start_scan_span(&self.inner.session, candidates.len());
        let _enter = span.enter();

        let config = &self.inner.config;
        let mut report = ScanReport::default();

        for index in candidates {
            let element = &mut document.elements[index];

            if element.has_attribute(&config.skip_attribute) {
                element.set_attribute(&config.processed_attribute, PROCESSED_VALUE);
                self.skipped(index, SkipReason::OptedOut);
                report.opted_out.push(index);
                continue;
            }

            let source = element.text.trim();
            if source.is_empty() {
                element.set_attribute(&config.processed_attribute, PROCESSED_VALUE);
                self.skipped(index, SkipReason::Empty);
                report.empty.push(index);
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| {
                self.inner.host.evaluate(source, self)
            }));
            element.set_attribute(&config.processed_attribute, PROCESSED_VALUE);

            let error = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => Some(
                    payload
                        .downcast_ref::<&str>()
                        .map(|s| format!("panicked: {s}"))
                        .or_else(|| {
                            payload
                                .downcast_ref::<String>()
                                .map(|s| format!("panicked: {s}"))
                        })
                        .unwrap_or_else(|| "panicked".to_string()),
                ),
            };

            match error {
                None => {
                    self.emit(EventKind::ScriptEvaluated { index });
                    metrics::scripts_scanned().add(1, &[KeyValue::new("result", "evaluated")]);
                    report.evaluated.push(index);
                }
                Some(error) => {
                    self.emit(EventKind::EvaluationFailed { index, error });
                    metrics::scripts_scanned().add(1, &[KeyValue::new("result", "failed")]);
                    report.failed.push(index);
                }
            }
        }

        report
    }

    fn skipped(&self, index: usize, reason: SkipReason) {
        let label = match reason {
            SkipReason::OptedOut => "opted_out",
            SkipReason::Empty => "empty",
        };
        metrics::scripts_scanned().add(1, &[KeyValue::new("result", label)]);
        self.emit(EventKind::ScriptSkipped { index, reason });
    }
}
