//! Per-instance tasks for the parallel phases.
//!
//! A task carries nothing but an identifier. It opens its own storage
//! session on the worker that runs it, loads everything it needs
//! (`initialize`), closes the session, and aggregates into a local cache
//! (`execute`) that the pool merges into the shared target.

mod offering;
mod procedure;

pub use offering::{LoadedOffering, OfferingTask};
pub use procedure::{LoadedProcedure, ProcedureTask};

use crate::application::repos::{ContentStore, StoreSession};
use crate::cache::{CacheConfig, ContentCache};
use crate::domain::types::EntityKind;

use super::error::CacheUpdateError;

/// Unit of work bound to exactly one entity instance.
pub trait UpdateTask: Send + Sync {
    fn entity_kind(&self) -> EntityKind;

    fn identifier(&self) -> &str;

    /// Builds the instance's contribution into a fresh cache.
    fn run(
        &self,
        store: &dyn ContentStore,
        config: &CacheConfig,
    ) -> Result<ContentCache, CacheUpdateError>;
}

/// Opens a session for the calling thread, hands it to `initialize` and
/// drops it before returning.
fn with_session<T>(
    store: &dyn ContentStore,
    kind: EntityKind,
    identifier: &str,
    initialize: impl FnOnce(&mut dyn StoreSession) -> Result<T, CacheUpdateError>,
) -> Result<T, CacheUpdateError> {
    let mut session = store
        .open_session()
        .map_err(|err| CacheUpdateError::new(kind, Some(identifier), "open_session", err))?;
    initialize(session.as_mut())
}

/// Runs `execute` against a fresh local cache.
fn build_local(
    execute: impl FnOnce(&ContentCache) -> Result<(), CacheUpdateError>,
) -> Result<ContentCache, CacheUpdateError> {
    let cache = ContentCache::new();
    execute(&cache)?;
    Ok(cache)
}
