//! Core data model.
//!
//! A work item is a named unit of page logic. It has identity (a [`WorkId`]),
//! an action to run, a resolved level, and an execution status.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifier of a registered unit of work. Never empty, never padded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkId(String);

impl WorkId {
    /// Validate and wrap an identifier. Surrounding whitespace is rejected
    /// rather than trimmed so `"a"` and `" a"` never alias.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() || id.trim() != id {
            return Err(Error::InvalidId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for WorkId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<WorkId> for String {
    fn from(id: WorkId) -> Self {
        id.0
    }
}

impl std::borrow::Borrow<str> for WorkId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// Requested level at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelSpec {
    /// Explicit ordering bucket.
    Index(u32),
    /// Exactly one level after the named item's resolved level.
    After(String),
}

impl Default for LevelSpec {
    fn default() -> Self {
        LevelSpec::Index(0)
    }
}

impl From<u32> for LevelSpec {
    fn from(level: u32) -> Self {
        LevelSpec::Index(level)
    }
}

impl From<&str> for LevelSpec {
    fn from(id: &str) -> Self {
        LevelSpec::After(id.to_string())
    }
}

impl From<String> for LevelSpec {
    fn from(id: String) -> Self {
        LevelSpec::After(id)
    }
}

impl From<&WorkId> for LevelSpec {
    fn from(id: &WorkId) -> Self {
        LevelSpec::After(id.as_str().to_string())
    }
}

impl std::fmt::Display for LevelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelSpec::Index(level) => write!(f, "{level}"),
            LevelSpec::After(id) => write!(f, "after:{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Execution status of a registered item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Registered, waiting for the next run.
    Pending,
    /// Picked up by a run that has not settled it yet.
    Running,
    /// Ran to success or failure. Terminal until re-registered.
    Settled,
}

impl Status {
    pub fn is_completed(self) -> bool {
        self == Status::Settled
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Settled => "settled",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Future returned by an action.
pub type ActionFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// A zero-argument unit of work. Invoked at most once per registration.
pub type Action = Arc<dyn Fn() -> ActionFuture + Send + Sync + 'static>;

/// Box an async closure into an [`Action`].
pub fn action<F, Fut>(f: F) -> Action
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as ActionFuture)
}

/// Box a synchronous closure into an [`Action`]. The body runs inside the
/// spawned task, so a panic there is contained like any other failure.
pub fn sync_action<F>(f: F) -> Action
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move || {
        let f = Arc::clone(&f);
        Box::pin(async move { f() }) as ActionFuture
    })
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A registered unit of work, owned by the registry.
#[derive(Clone)]
pub struct WorkItem {
    pub id: WorkId,
    pub action: Action,
    /// Resolved level.
    pub level: u32,
    pub status: Status,
    /// Bumped on every re-registration. A run only settles the generation it
    /// started.
    pub generation: u64,
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("status", &self.status)
            .field("generation", &self.generation)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a work item for introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkInfo {
    pub id: WorkId,
    pub level: u32,
    pub status: Status,
    pub registered_at: DateTime<Utc>,
}

impl From<&WorkItem> for WorkInfo {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            level: item.level,
            status: item.status,
            registered_at: item.registered_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a single action settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { error: String },
    Panicked { message: String },
    TimedOut { after_ms: u64 },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed { .. } => "failed",
            Outcome::Panicked { .. } => "panicked",
            Outcome::TimedOut { .. } => "timed_out",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed { error } => write!(f, "failed: {error}"),
            Outcome::Panicked { message } => write!(f, "panicked: {message}"),
            Outcome::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_id_rejects_blank_and_padded() {
        assert!(WorkId::new("").is_err());
        assert!(WorkId::new("   ").is_err());
        assert!(WorkId::new(" hero").is_err());
        assert_eq!(WorkId::new("hero").unwrap().as_str(), "hero");
    }

    #[test]
    fn level_spec_conversions() {
        assert_eq!(LevelSpec::from(2), LevelSpec::Index(2));
        assert_eq!(LevelSpec::from("nav"), LevelSpec::After("nav".into()));
        assert_eq!(LevelSpec::default(), LevelSpec::Index(0));
    }

    #[test]
    fn level_spec_deserializes_number_or_reference() {
        let n: LevelSpec = serde_json::from_str("3").unwrap();
        let r: LevelSpec = serde_json::from_str("\"slider\"").unwrap();
        assert_eq!(n, LevelSpec::Index(3));
        assert_eq!(r, LevelSpec::After("slider".into()));
    }
}
