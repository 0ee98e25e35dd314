//! Level-ordered execution of pending work.
//!
//! Every action of a level is spawned at once; the next level starts only
//! after the last one settles. Each action runs in its own task, so an error,
//! a panic or a timeout is contained to that action.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{Instrument, warn};

use super::Coordinator;
use crate::event::EventKind;
use crate::model::{Action, Outcome, WorkId};
use crate::registry::Claimed;
use crate::telemetry::{metrics, spans};

/// How one action settled during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub id: WorkId,
    pub level: u32,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

/// What a single `run_pending` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Levels executed, ascending.
    pub levels: Vec<u32>,
    /// Settlements in the order they happened.
    pub settled: Vec<Settlement>,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }

    pub fn executed(&self) -> Vec<WorkId> {
        self.settled.iter().map(|s| s.id.clone()).collect()
    }

    pub fn failed(&self) -> Vec<WorkId> {
        self.settled
            .iter()
            .filter(|s| !s.outcome.is_success())
            .map(|s| s.id.clone())
            .collect()
    }
}

impl Coordinator {
    /// Run every pending item, level by level.
    ///
    /// Calls are serialized: a call made while another is running waits for
    /// it, then runs whatever is still pending. Items registered during a run
    /// are left for the next call. An action must not await `run_pending`
    /// (or an auto-running `refresh`) itself: the run it belongs to holds the
    /// lock until that action settles.
    ///
    /// Dropping the returned future mid-run is safe. Actions already launched
    /// keep running and settle themselves; claimed items of later levels go
    /// back to pending for the next call.
    pub async fn run_pending(&self) -> RunReport {
        let _running = self.inner.run_lock.lock().await;

        let claimed = self.state().registry.claim_pending();
        if claimed.is_empty() {
            self.emit(EventKind::NothingPending);
            return RunReport::default();
        }

        let pending = claimed.len();
        let mut unlaunched = Unlaunched {
            coordinator: self.clone(),
            entries: claimed
                .iter()
                .map(|c| (c.id.clone(), c.generation))
                .collect(),
        };
        let mut plan: BTreeMap<u32, Vec<Claimed>> = BTreeMap::new();
        for item in claimed {
            plan.entry(item.level).or_default().push(item);
        }

        let mut report = RunReport {
            levels: plan.keys().copied().collect(),
            settled: Vec::with_capacity(pending),
        };
        self.emit(EventKind::RunStarted {
            pending,
            levels: report.levels.clone(),
        });

        let span = spans::start_run_span(&self.inner.session, pending);
        async {
            for (level, group) in plan {
                self.run_level(level, group, &mut unlaunched, &mut report)
                    .await;
            }
        }
        .instrument(span.clone())
        .await;

        let failed = report.failed().len();
        spans::record_run_failures(&span, failed);
        self.emit(EventKind::RunFinished {
            executed: report.settled.len(),
            failed,
        });
        report
    }

    /// Launch one level and wait for all of it to settle.
    ///
    /// Each action gets a detached wrapper task that settles it in the
    /// registry and then reports back over a channel, so settling does not
    /// depend on this future being polled to the end.
    async fn run_level(
        &self,
        level: u32,
        group: Vec<Claimed>,
        unlaunched: &mut Unlaunched,
        report: &mut RunReport,
    ) {
        let size = group.len();
        self.emit(EventKind::LevelStarted { level, size });
        let started = Instant::now();
        let timeout = self.inner.config.action_timeout();

        async {
            let (tx, mut rx) = mpsc::unbounded_channel::<Settlement>();
            let mut outstanding: HashMap<WorkId, u64> = HashMap::with_capacity(size);

            for Claimed {
                id,
                action,
                generation,
                ..
            } in group
            {
                unlaunched.entries.remove(&id);
                outstanding.insert(id.clone(), generation);

                let span = spans::start_action_span(id.as_str(), level);
                let coordinator = self.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let inner = tokio::spawn(invoke(action, timeout).instrument(span));
                    let outcome = match inner.await {
                        Ok(outcome) => outcome,
                        Err(e) => outcome_from_join_error(e),
                    };
                    let settlement =
                        coordinator.settle(id, level, generation, outcome, started.elapsed());
                    // The run may have been dropped; the registry is already settled.
                    let _ = tx.send(settlement);
                });
            }
            drop(tx);

            while let Some(settlement) = rx.recv().await {
                outstanding.remove(&settlement.id);
                report.settled.push(settlement);
            }

            // Channel closed with wrappers unaccounted for: they were torn down
            // (runtime shutdown) before settling.
            for (id, generation) in outstanding {
                warn!(%id, level, "action wrapper ended before settling");
                let outcome = Outcome::Failed {
                    error: "task cancelled before settling".to_string(),
                };
                report
                    .settled
                    .push(self.settle(id, level, generation, outcome, started.elapsed()));
            }
        }
        .instrument(spans::start_level_span(level, size))
        .await;

        let elapsed = started.elapsed();
        metrics::level_duration_ms().record(
            elapsed.as_secs_f64() * 1000.0,
            &[KeyValue::new("level", i64::from(level))],
        );
        self.emit(EventKind::LevelSettled {
            level,
            duration_ms: millis(elapsed),
        });
    }

    fn settle(
        &self,
        id: WorkId,
        level: u32,
        generation: u64,
        outcome: Outcome,
        elapsed: Duration,
    ) -> Settlement {
        let duration_ms = millis(elapsed);
        let current = self.state().registry.settle(&id, generation);
        if !current {
            tracing::debug!(%id, "re-registered while running, left pending");
        }

        metrics::actions_settled().add(1, &[KeyValue::new("outcome", outcome.label())]);
        let kind = if outcome.is_success() {
            EventKind::ActionSettled {
                id: id.clone(),
                level,
                duration_ms,
            }
        } else {
            EventKind::ActionFailed {
                id: id.clone(),
                level,
                outcome: outcome.clone(),
            }
        };
        self.emit(kind);

        Settlement {
            id,
            level,
            outcome,
            duration_ms,
        }
    }
}

/// Claimed entries whose level has not been launched yet. Dropped with the
/// run; whatever is left goes back to pending.
struct Unlaunched {
    coordinator: Coordinator,
    entries: HashMap<WorkId, u64>,
}

impl Drop for Unlaunched {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let released = {
            let mut state = self.coordinator.state();
            self.entries
                .drain()
                .filter(|(id, generation)| state.registry.release(id, *generation))
                .count()
        };
        self.coordinator
            .emit(EventKind::RunInterrupted { released });
    }
}

async fn invoke(action: Action, timeout: Option<Duration>) -> Outcome {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, action()).await {
            Ok(result) => result,
            Err(_) => {
                return Outcome::TimedOut {
                    after_ms: millis(limit),
                };
            }
        },
        None => action().await,
    };

    match result {
        Ok(()) => Outcome::Succeeded,
        Err(e) => Outcome::Failed {
            error: format!("{e:#}"),
        },
    }
}

fn outcome_from_join_error(e: JoinError) -> Outcome {
    if e.is_panic() {
        let payload = e.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Outcome::Panicked { message }
    } else {
        Outcome::Failed {
            error: format!("task cancelled: {e}"),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
