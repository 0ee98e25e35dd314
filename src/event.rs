//! Structured diagnostics emitted by the coordinator.
//!
//! Every diagnostic lands in the session's event log with a monotonic
//! sequence number, whether or not console output is enabled. Tests and
//! debug overlays read the log; `tracing` output is the console's view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Outcome, WorkId};

/// A structured diagnostic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Registered {
        id: WorkId,
        level: u32,
        replaced: bool,
    },
    InvalidRegistration {
        id: String,
        reason: String,
    },
    UnresolvedLevelReference {
        id: WorkId,
        reference: String,
    },
    RunStarted {
        pending: usize,
        levels: Vec<u32>,
    },
    NothingPending,
    LevelStarted {
        level: u32,
        size: usize,
    },
    LevelSettled {
        level: u32,
        duration_ms: u64,
    },
    ActionSettled {
        id: WorkId,
        level: u32,
        duration_ms: u64,
    },
    ActionFailed {
        id: WorkId,
        level: u32,
        outcome: Outcome,
    },
    RunFinished {
        executed: usize,
        failed: usize,
    },
    /// A run was dropped before launching every level; `released` claimed
    /// entries went back to pending.
    RunInterrupted {
        released: usize,
    },
    ScriptSkipped {
        index: usize,
        reason: SkipReason,
    },
    ScriptEvaluated {
        index: usize,
    },
    EvaluationFailed {
        index: usize,
        error: String,
    },
}

/// Why the scanner did not evaluate a script element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Carries the skip-on-refresh marker.
    OptedOut,
    /// Text is empty after trimming.
    Empty,
}

impl EventKind {
    /// Diagnostics that describe a contained failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventKind::InvalidRegistration { .. }
                | EventKind::UnresolvedLevelReference { .. }
                | EventKind::ActionFailed { .. }
                | EventKind::EvaluationFailed { .. }
        )
    }

    /// Write this event to the console through `tracing`.
    pub fn log(&self) {
        use tracing::{debug, info, warn};

        match self {
            EventKind::Registered {
                id,
                level,
                replaced,
            } => debug!(%id, level, replaced, "registered"),
            EventKind::InvalidRegistration { id, reason } => {
                warn!(id = %id, %reason, "registration rejected")
            }
            EventKind::UnresolvedLevelReference { id, reference } => {
                warn!(%id, %reference, "unknown level reference, falling back to level 0")
            }
            EventKind::RunStarted { pending, levels } => {
                info!(pending, ?levels, "running pending work")
            }
            EventKind::NothingPending => debug!("nothing pending"),
            EventKind::LevelStarted { level, size } => debug!(level, size, "level started"),
            EventKind::LevelSettled { level, duration_ms } => {
                debug!(level, duration_ms, "level settled")
            }
            EventKind::ActionSettled {
                id,
                level,
                duration_ms,
            } => debug!(%id, level, duration_ms, "action settled"),
            EventKind::ActionFailed { id, level, outcome } => {
                warn!(%id, level, %outcome, "action failed")
            }
            EventKind::RunFinished { executed, failed } => {
                info!(executed, failed, "run finished")
            }
            EventKind::RunInterrupted { released } => {
                warn!(released, "run dropped mid-way, unlaunched work left pending")
            }
            EventKind::ScriptSkipped { index, reason } => {
                debug!(index, ?reason, "script skipped")
            }
            EventKind::ScriptEvaluated { index } => debug!(index, "script evaluated"),
            EventKind::EvaluationFailed { index, error } => {
                warn!(index, %error, "script evaluation failed")
            }
        }
    }
}
