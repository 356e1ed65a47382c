//! Atomically swapped published snapshots.

use std::ops::Deref;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwap;
use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;

use super::content::ContentCache;
use super::lock::mutex_lock;
use super::readable::ReadableCache;

const SOURCE: &str = "cache::snapshot";
const METRIC_SNAPSHOT_GENERATION: &str = "sos_cache_snapshot_generation";

/// An immutable, published content cache.
///
/// Dereferences to [`ReadableCache`] only, so holders cannot mutate it.
#[derive(Debug)]
pub struct CacheSnapshot {
    generation: u64,
    published_at: OffsetDateTime,
    cache: Arc<ContentCache>,
}

impl CacheSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn published_at(&self) -> OffsetDateTime {
        self.published_at
    }

    pub fn cache(&self) -> &dyn ReadableCache {
        self.cache.as_ref()
    }
}

impl Deref for CacheSnapshot {
    type Target = dyn ReadableCache;

    fn deref(&self) -> &Self::Target {
        self.cache.as_ref()
    }
}

/// Holds the current snapshot; readers never block and never observe a
/// snapshot that is still being built.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: ArcSwap<CacheSnapshot>,
    generation: AtomicU64,
    publish_lock: Mutex<()>,
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHandle {
    /// Starts with an empty snapshot at generation 0.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(CacheSnapshot {
                generation: 0,
                published_at: OffsetDateTime::now_utc(),
                cache: Arc::new(ContentCache::new()),
            }),
            generation: AtomicU64::new(0),
            publish_lock: Mutex::new(()),
        }
    }

    pub fn load(&self) -> Arc<CacheSnapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replaces the current snapshot and returns its generation.
    pub fn publish(&self, cache: Arc<ContentCache>) -> u64 {
        let _guard = mutex_lock(&self.publish_lock, SOURCE, "publish");
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.current.store(Arc::new(CacheSnapshot {
            generation,
            published_at: OffsetDateTime::now_utc(),
            cache,
        }));
        gauge!(METRIC_SNAPSHOT_GENERATION).set(generation as f64);
        info!(generation, "Published content cache snapshot");
        generation
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::types::EntityKind;

    use super::*;

    #[test]
    fn starts_empty_at_generation_zero() {
        let handle = SnapshotHandle::new();
        let snapshot = handle.load();
        assert_eq!(snapshot.generation(), 0);
        assert!(snapshot.offerings().is_empty());
    }

    #[test]
    fn readers_keep_their_snapshot_across_publishes() {
        let handle = SnapshotHandle::new();
        let first = ContentCache::new();
        first.add_entity(EntityKind::Offering, "A");
        assert_eq!(handle.publish(Arc::new(first)), 1);
        let held = handle.load();

        let second = ContentCache::new();
        second.add_entity(EntityKind::Offering, "B");
        assert_eq!(handle.publish(Arc::new(second)), 2);

        assert!(held.contains(EntityKind::Offering, "A"));
        assert!(!held.contains(EntityKind::Offering, "B"));
        assert!(handle.load().contains(EntityKind::Offering, "B"));
        assert_eq!(handle.generation(), 2);
    }
}
