//! Rebuild trigger and publish policy around the orchestrator.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::{RepoError, SnapshotRepo};
use crate::application::update::{
    CacheUpdateError, CacheUpdateOrchestrator, PhaseReport, RebuildOutcome,
};
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::cache::{CacheMerger, CacheSnapshot, ContentCache, DegradedPolicy, SnapshotHandle};

const SOURCE: &str = "application::controller";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("a content cache rebuild is already running")]
    RebuildInProgress,
    #[error("failed to restore the persisted content cache")]
    Restore(#[source] RepoError),
}

#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub rebuild_id: Uuid,
    /// Generation of the published snapshot; `None` when the previous one
    /// was retained.
    pub generation: Option<u64>,
    pub degraded: bool,
    pub errors: Vec<CacheUpdateError>,
    pub phases: Vec<PhaseReport>,
    pub duration: Duration,
}

impl RebuildReport {
    pub fn published(&self) -> bool {
        self.generation.is_some()
    }
}

struct RebuildGuard<'a>(&'a AtomicBool);

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the published snapshot and decides what gets published.
///
/// Readers go through [`ContentCacheController::snapshot`] (or a cloned
/// [`SnapshotHandle`]) and never see a cache that is still being built.
pub struct ContentCacheController {
    orchestrator: CacheUpdateOrchestrator,
    snapshots: Arc<SnapshotHandle>,
    threads: NonZeroUsize,
    policy: DegradedPolicy,
    /// Last rebuilt or restored cache, before auxiliaries are folded in.
    base: RwLock<Arc<ContentCache>>,
    auxiliaries: RwLock<Vec<(String, Arc<ContentCache>)>>,
    /// Held from changing `base` or `auxiliaries` until the result is
    /// published, so the newest snapshot always reflects both.
    publish_lock: Mutex<()>,
    persistence: Option<Arc<dyn SnapshotRepo>>,
    rebuilding: AtomicBool,
}

impl ContentCacheController {
    pub fn new(orchestrator: CacheUpdateOrchestrator) -> Self {
        let config = orchestrator.config();
        let threads = config.threads_non_zero();
        let policy = config.degraded_policy;
        Self {
            orchestrator,
            snapshots: Arc::new(SnapshotHandle::new()),
            threads,
            policy,
            base: RwLock::new(Arc::new(ContentCache::new())),
            auxiliaries: RwLock::new(Vec::new()),
            publish_lock: Mutex::new(()),
            persistence: None,
            rebuilding: AtomicBool::new(false),
        }
    }

    pub fn with_persistence(mut self, repo: Arc<dyn SnapshotRepo>) -> Self {
        self.persistence = Some(repo);
        self
    }

    pub fn policy(&self) -> DegradedPolicy {
        self.policy
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.snapshots.load()
    }

    pub fn snapshots(&self) -> Arc<SnapshotHandle> {
        Arc::clone(&self.snapshots)
    }

    /// Runs a full rebuild on the calling thread and applies the degraded
    /// policy. Concurrent calls are rejected rather than queued.
    pub fn rebuild(&self) -> Result<RebuildReport, ControllerError> {
        let _guard = self.begin_rebuild()?;
        let RebuildOutcome {
            rebuild_id,
            cache,
            errors,
            phases,
            duration,
        } = self.orchestrator.rebuild(self.threads);
        let degraded = !errors.is_empty();

        let generation = if degraded && self.policy == DegradedPolicy::RetainPrevious {
            warn!(
                failures = errors.len(),
                retained = self.snapshots.generation(),
                "Degraded content cache rebuild; keeping previous snapshot"
            );
            None
        } else {
            self.persist(&cache);
            let publishing = mutex_lock(&self.publish_lock, SOURCE, "rebuild");
            *rw_write(&self.base, SOURCE, "rebuild") = cache;
            Some(self.publish_current(&publishing))
        };

        Ok(RebuildReport {
            rebuild_id,
            generation,
            degraded,
            errors,
            phases,
            duration,
        })
    }

    /// Adds (or replaces, by name) a cache folded into every published
    /// snapshot, and republishes immediately.
    pub fn register_auxiliary(&self, name: impl Into<String>, cache: ContentCache) -> u64 {
        let name = name.into();
        let publishing = mutex_lock(&self.publish_lock, SOURCE, "register_auxiliary");
        {
            let mut auxiliaries = rw_write(&self.auxiliaries, SOURCE, "register_auxiliary");
            auxiliaries.retain(|(existing, _)| *existing != name);
            info!(auxiliary = %name, "Registered auxiliary content cache");
            auxiliaries.push((name, Arc::new(cache)));
        }
        self.publish_current(&publishing)
    }

    /// Publishes the persisted snapshot, if any. Returns its generation.
    pub fn restore(&self) -> Result<Option<u64>, ControllerError> {
        let Some(repo) = &self.persistence else {
            return Ok(None);
        };
        let Some(image) = repo.load().map_err(ControllerError::Restore)? else {
            info!("No persisted content cache to restore");
            return Ok(None);
        };
        let restored = Arc::new(ContentCache::from_image(image));
        let publishing = mutex_lock(&self.publish_lock, SOURCE, "restore");
        *rw_write(&self.base, SOURCE, "restore") = restored;
        let generation = self.publish_current(&publishing);
        drop(publishing);
        info!(generation, "Restored persisted content cache");
        Ok(Some(generation))
    }

    fn begin_rebuild(&self) -> Result<RebuildGuard<'_>, ControllerError> {
        self.rebuilding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ControllerError::RebuildInProgress)?;
        Ok(RebuildGuard(&self.rebuilding))
    }

    /// Callers prove they hold `publish_lock` by passing its guard.
    fn publish_current(&self, _publishing: &MutexGuard<'_, ()>) -> u64 {
        let base = Arc::clone(&*rw_read(&self.base, SOURCE, "publish"));
        let auxiliaries = rw_read(&self.auxiliaries, SOURCE, "publish");
        let cache = if auxiliaries.is_empty() {
            base
        } else {
            let merged = CacheMerger.merge_all(
                std::iter::once(base.as_ref())
                    .chain(auxiliaries.iter().map(|(_, auxiliary)| auxiliary.as_ref())),
            );
            Arc::new(merged)
        };
        self.snapshots.publish(cache)
    }

    fn persist(&self, cache: &ContentCache) {
        let Some(repo) = &self.persistence else {
            return;
        };
        if let Err(err) = repo.save(&cache.image()) {
            warn!(error = %err, "Failed to persist content cache snapshot");
        }
    }
}
