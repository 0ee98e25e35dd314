//! Registry of work items and their resolved levels.
//!
//! Pure data plus mutation rules. The registry never runs anything; the
//! scheduler claims pending entries from it and settles them afterwards.

use std::collections::HashMap;

use chrono::Utc;

use crate::model::{Action, LevelSpec, Status, WorkId, WorkInfo, WorkItem};

/// What a single `register` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: WorkId,
    pub level: u32,
    /// An entry with the same id existed and was overwritten.
    pub replaced: bool,
    /// The `After` reference that could not be resolved, if any.
    pub unresolved: Option<String>,
}

/// An entry claimed by a run, detached from the registry lock.
#[derive(Clone)]
pub(crate) struct Claimed {
    pub id: WorkId,
    pub action: Action,
    pub level: u32,
    pub generation: u64,
}

/// Identifier -> work item, plus the level index used to resolve
/// `After` references.
#[derive(Default)]
pub struct Registry {
    items: HashMap<WorkId, WorkItem>,
    /// First-registration order. Entries are never removed.
    order: Vec<WorkId>,
    level_index: HashMap<WorkId, u32>,
    next_generation: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `id`. Overwriting resets the status to pending.
    pub fn register(&mut self, id: WorkId, action: Action, level: LevelSpec) -> Registration {
        let (resolved, unresolved) = match self.resolve_level(&id, &level) {
            Some(level) => (level, None),
            None => match level {
                LevelSpec::After(reference) => (0, Some(reference)),
                LevelSpec::Index(level) => (level, None),
            },
        };

        self.next_generation += 1;
        let item = WorkItem {
            id: id.clone(),
            action,
            level: resolved,
            status: Status::Pending,
            generation: self.next_generation,
            registered_at: Utc::now(),
        };

        let replaced = self.items.insert(id.clone(), item).is_some();
        if !replaced {
            self.order.push(id.clone());
        }
        self.level_index.insert(id.clone(), resolved);

        Registration {
            id,
            level: resolved,
            replaced,
            unresolved,
        }
    }

    /// Resolve a requested level for `id`. `None` means an `After` reference
    /// names nothing known; a reference to `id` itself counts as unknown.
    pub fn resolve_level(&self, id: &WorkId, level: &LevelSpec) -> Option<u32> {
        match level {
            LevelSpec::Index(level) => Some(*level),
            LevelSpec::After(reference) if reference == id.as_str() => None,
            LevelSpec::After(reference) => self
                .level_index
                .get(reference.as_str())
                .map(|level| level.saturating_add(1)),
        }
    }

    pub fn get(&self, id: &str) -> Option<WorkInfo> {
        self.items.get(id).map(WorkInfo::from)
    }

    pub fn level_of(&self, id: &str) -> Option<u32> {
        self.level_index.get(id).copied()
    }

    pub fn status_of(&self, id: &str) -> Option<Status> {
        self.items.get(id).map(|item| item.status)
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.status_of(id).is_some_and(Status::is_completed)
    }

    /// All registered ids, in first-registration order.
    pub fn ids(&self) -> Vec<WorkId> {
        self.order.clone()
    }

    pub fn completed_ids(&self) -> Vec<WorkId> {
        self.ids_with(|status| status.is_completed())
    }

    pub fn pending_ids(&self) -> Vec<WorkId> {
        self.ids_with(|status| status == Status::Pending)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn ids_with(&self, pred: impl Fn(Status) -> bool) -> Vec<WorkId> {
        self.order
            .iter()
            .filter(|id| self.items.get(*id).is_some_and(|item| pred(item.status)))
            .cloned()
            .collect()
    }

    /// Mark every pending entry as running and hand back what a run needs.
    pub(crate) fn claim_pending(&mut self) -> Vec<Claimed> {
        let mut claimed = Vec::new();
        for id in &self.order {
            let Some(item) = self.items.get_mut(id) else {
                continue;
            };
            if item.status != Status::Pending {
                continue;
            }
            item.status = Status::Running;
            claimed.push(Claimed {
                id: item.id.clone(),
                action: item.action.clone(),
                level: item.level,
                generation: item.generation,
            });
        }
        claimed
    }

    /// Settle a claimed entry. Returns false (and leaves the entry alone) when
    /// it was re-registered after being claimed.
    pub(crate) fn settle(&mut self, id: &WorkId, generation: u64) -> bool {
        match self.items.get_mut(id) {
            Some(item) if item.generation == generation => {
                item.status = Status::Settled;
                true
            }
            _ => false,
        }
    }

    /// Hand a claimed entry that never launched back to pending. Ignored when
    /// the entry was re-registered or is no longer running.
    pub(crate) fn release(&mut self, id: &WorkId, generation: u64) -> bool {
        match self.items.get_mut(id) {
            Some(item) if item.generation == generation && item.status == Status::Running => {
                item.status = Status::Pending;
                true
            }
            _ => false,
        }
    }
}
