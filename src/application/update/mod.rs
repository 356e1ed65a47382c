//! Rebuild engine: single-entity updates, per-instance tasks, the worker
//! pool running them and the orchestrator sequencing everything.

mod error;
mod orchestrator;
mod pool;
pub mod single;
mod support;
pub mod task;

pub use error::{CacheUpdateError, ErrorCollector, FailureClass, UpdateFailure};
pub use orchestrator::{CacheUpdateOrchestrator, PhaseReport, PhaseStatus, RebuildOutcome};
pub use pool::{PoolError, PoolReport};

use crate::application::repos::ContentStore;
use crate::cache::{CacheConfig, ContentCache};

/// Everything a sequential update needs; borrowed for one phase.
pub struct UpdateContext<'a> {
    pub store: &'a dyn ContentStore,
    pub cache: &'a ContentCache,
    pub errors: &'a ErrorCollector,
    pub config: &'a CacheConfig,
}
