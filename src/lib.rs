//! # script-lifecycle
//!
//! Coordinates independently authored page scripts. Each script registers
//! named units of work with an ordering level; the coordinator runs them level
//! by level and re-scans the document after DOM updates so newly injected
//! scripts get activated too.
//!
//! The three public operations live on [`engine::Coordinator`]:
//! `register`, `run_pending` and `refresh`.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;
pub mod script;
pub mod telemetry;

pub use config::Config;
pub use document::{Document, Element};
pub use engine::{Coordinator, RunReport, ScanReport};
pub use error::{Error, Result};
pub use model::{LevelSpec, Status, WorkId};
pub use script::{ModuleCatalog, ScriptHost};
