//! The coordinator: one page session's registry, event log and settings.
//!
//! All registry mutations go through here. The scheduler (`run_pending`)
//! and the scanner (`refresh`) live in the submodules as further `impl`
//! blocks on [`Coordinator`].

pub mod scanner;
pub mod scheduler;

pub use scanner::ScanReport;
pub use scheduler::{RunReport, Settlement};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use opentelemetry::KeyValue;
use uuid::Uuid;

use crate::config::Config;
use crate::event::{Event, EventKind};
use crate::model::{Action, LevelSpec, Status, WorkId, WorkInfo, action, sync_action};
use crate::registry::{Registration, Registry};
use crate::script::{ModuleCatalog, ScriptHost};
use crate::telemetry::metrics;

/// Session context. Cheap to clone; clones share the same session, so
/// actions and script modules can hold one and register more work.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    session: Uuid,
    config: Config,
    host: Arc<dyn ScriptHost>,
    state: Mutex<Shared>,
    /// Serializes `run_pending` calls.
    run_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Shared {
    registry: Registry,
    events: Vec<Event>,
    next_seq: u64,
    /// Set by `set_diagnostics`; beats both config and host detection.
    diagnostics_override: Option<bool>,
    /// Last observed document host matched a staging suffix.
    staging_host: bool,
}

impl Shared {
    fn record(&mut self, kind: EventKind) -> Event {
        self.next_seq += 1;
        let event = Event {
            seq: self.next_seq,
            timestamp: Utc::now(),
            kind,
        };
        self.events.push(event.clone());
        event
    }
}

impl Coordinator {
    /// New session with an empty [`ModuleCatalog`] as script host.
    pub fn new(config: Config) -> Self {
        Self::with_host(config, ModuleCatalog::new())
    }

    pub fn with_host(config: Config, host: impl ScriptHost + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: Uuid::new_v4(),
                config,
                host: Arc::new(host),
                state: Mutex::new(Shared::default()),
                run_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register an async unit of work. See [`Coordinator::register_action`].
    pub fn register<F, Fut>(
        &self,
        id: impl Into<String>,
        f: F,
        level: impl Into<LevelSpec>,
    ) -> Option<Registration>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_action(id, action(f), level)
    }

    /// Register a synchronous unit of work.
    pub fn register_sync<F>(
        &self,
        id: impl Into<String>,
        f: F,
        level: impl Into<LevelSpec>,
    ) -> Option<Registration>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_action(id, sync_action(f), level)
    }

    /// Insert or overwrite `id` and reset it to pending.
    ///
    /// A blank or padded id is rejected with an `InvalidRegistration`
    /// diagnostic and `None`. An unknown `After` reference resolves to level 0
    /// with an `UnresolvedLevelReference` diagnostic. Nothing runs here.
    pub fn register_action(
        &self,
        id: impl Into<String>,
        action: Action,
        level: impl Into<LevelSpec>,
    ) -> Option<Registration> {
        let raw = id.into();
        let level = level.into();

        let id = match WorkId::new(raw.clone()) {
            Ok(id) => id,
            Err(e) => {
                self.emit(EventKind::InvalidRegistration {
                    id: raw,
                    reason: e.to_string(),
                });
                metrics::registrations().add(1, &[KeyValue::new("result", "rejected")]);
                return None;
            }
        };

        let (registration, events) = {
            let mut state = self.state();
            let registration = state.registry.register(id, action, level);
            let mut events = Vec::with_capacity(2);
            if let Some(reference) = &registration.unresolved {
                events.push(state.record(EventKind::UnresolvedLevelReference {
                    id: registration.id.clone(),
                    reference: reference.clone(),
                }));
            }
            events.push(state.record(EventKind::Registered {
                id: registration.id.clone(),
                level: registration.level,
                replaced: registration.replaced,
            }));
            (registration, events)
        };
        self.log(&events);

        let result = if registration.unresolved.is_some() {
            "unresolved"
        } else if registration.replaced {
            "replaced"
        } else {
            "created"
        };
        metrics::registrations().add(1, &[KeyValue::new("result", result)]);

        Some(registration)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Registered ids in first-registration order.
    pub fn ids(&self) -> Vec<WorkId> {
        self.state().registry.ids()
    }

    /// Ids whose action has settled since their last registration.
    pub fn completed_ids(&self) -> Vec<WorkId> {
        self.state().registry.completed_ids()
    }

    pub fn pending_ids(&self) -> Vec<WorkId> {
        self.state().registry.pending_ids()
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.state().registry.is_completed(id)
    }

    pub fn status_of(&self, id: &str) -> Option<Status> {
        self.state().registry.status_of(id)
    }

    pub fn level_of(&self, id: &str) -> Option<u32> {
        self.state().registry.level_of(id)
    }

    pub fn get(&self, id: &str) -> Option<WorkInfo> {
        self.state().registry.get(id)
    }

    pub fn len(&self) -> usize {
        self.state().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().registry.is_empty()
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Full event log of this session.
    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Events with `seq` greater than `since_seq`.
    pub fn events_since(&self, since_seq: u64) -> Vec<Event> {
        self.state()
            .events
            .iter()
            .filter(|e| e.seq > since_seq)
            .cloned()
            .collect()
    }

    /// Contained failures recorded so far: rejected registrations, unknown
    /// level references, failed actions and failed script evaluations.
    pub fn failures(&self) -> Vec<Event> {
        self.state()
            .events
            .iter()
            .filter(|e| e.kind.is_failure())
            .cloned()
            .collect()
    }

    /// Turn console diagnostics on or off for the rest of the session.
    pub fn set_diagnostics(&self, enabled: bool) {
        self.state().diagnostics_override = Some(enabled);
    }

    /// Runtime override, then explicit config, then staging-host detection.
    pub fn diagnostics_enabled(&self) -> bool {
        let state = self.state();
        state
            .diagnostics_override
            .or(self.inner.config.debug)
            .unwrap_or(state.staging_host)
    }

    /// Remember the page host for staging detection.
    pub fn observe_host(&self, host: &str) {
        let staging = self.inner.config.is_staging_host(host);
        self.state().staging_host = staging;
    }

    fn emit(&self, kind: EventKind) {
        let event = self.state().record(kind);
        self.log(std::slice::from_ref(&event));
    }

    fn log(&self, events: &[Event]) {
        if self.diagnostics_enabled() {
            for event in events {
                event.kind.log();
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("session", &self.inner.session)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
