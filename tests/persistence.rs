mod common;

use std::sync::Arc;

use sos_cache::application::controller::{ContentCacheController, ControllerError};
use sos_cache::application::repos::{RepoError, SnapshotRepo};
use sos_cache::application::update::CacheUpdateOrchestrator;
use sos_cache::cache::{CacheConfig, ContentCache, DegradedPolicy, ReadableCache};
use sos_cache::domain::geometry::Geometry;
use sos_cache::domain::types::EntityKind;
use sos_cache::infra::memory::{ContentArchive, MemoryStore};
use sos_cache::infra::persistence::FileSnapshotRepo;
use tempfile::TempDir;
use time::macros::datetime;

use common::{ScriptedStore, dataset, feature, offering, procedure, property};

fn archive() -> ContentArchive {
    ContentArchive {
        offerings: vec![offering("A")],
        procedures: vec![procedure("p1")],
        observable_properties: vec![property("temp")],
        features: vec![feature("f1", Some(Geometry::point(4326, 7.0, 52.0)))],
        datasets: vec![dataset(
            1,
            "A",
            "p1",
            "temp",
            Some(("f1", Geometry::point(4326, 7.0, 52.0))),
            Some(datetime!(2024-01-01 00:00 UTC)),
            Some(datetime!(2024-01-31 00:00 UTC)),
        )],
        ..ContentArchive::default()
    }
}

fn controller(store: Arc<ScriptedStore>, repo: Arc<FileSnapshotRepo>) -> ContentCacheController {
    let config = CacheConfig {
        degraded_policy: DegradedPolicy::RetainPrevious,
        ..CacheConfig::default()
    };
    ContentCacheController::new(CacheUpdateOrchestrator::new(store, config)).with_persistence(repo)
}

#[test]
fn published_rebuild_survives_a_restart() {
    let dir = TempDir::new().expect("temp dir");
    let repo = Arc::new(FileSnapshotRepo::new(dir.path().join("cache/snapshot.json")));

    let first = controller(Arc::new(ScriptedStore::new(archive())), Arc::clone(&repo));
    first.rebuild().expect("rebuild");
    let rebuilt = first.snapshot().image();
    assert!(repo.path().exists());

    let store = Arc::new(ScriptedStore::new(archive()));
    let restarted = controller(Arc::clone(&store), Arc::clone(&repo));
    assert_eq!(restarted.restore().expect("restore"), Some(1));
    assert_eq!(store.sessions_opened(), 0);

    let restored = restarted.snapshot();
    assert_eq!(restored.image(), rebuilt);
    assert!(restored.contains(EntityKind::FeatureOfInterest, "f1"));
    assert_eq!(
        restored.offering_phenomenon_time("A"),
        rebuilt.offering_phenomenon_times.get("A").copied()
    );
}

#[test]
fn retained_degraded_rebuild_is_not_persisted() {
    let dir = TempDir::new().expect("temp dir");
    let repo = Arc::new(FileSnapshotRepo::new(dir.path().join("snapshot.json")));
    let store = Arc::new(ScriptedStore::new(archive()));
    let controller = controller(Arc::clone(&store), Arc::clone(&repo));

    controller.rebuild().expect("clean rebuild");
    let persisted = repo.load().expect("load").expect("snapshot saved");

    store.set_fail_features(true);
    let report = controller.rebuild().expect("degraded rebuild");
    assert!(report.degraded);
    assert_eq!(report.generation, None);
    assert_eq!(repo.load().expect("load"), Some(persisted));
}

#[test]
fn missing_snapshot_restores_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let repo = Arc::new(FileSnapshotRepo::new(dir.path().join("absent.json")));
    let controller = controller(Arc::new(ScriptedStore::new(archive())), repo);
    assert_eq!(controller.restore().expect("restore"), None);
    assert_eq!(controller.snapshot().generation(), 0);
}

#[test]
fn corrupt_snapshot_is_an_integrity_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, b"{ not json").expect("write");
    let repo = Arc::new(FileSnapshotRepo::new(&path));

    let controller = controller(Arc::new(ScriptedStore::new(archive())), repo);
    match controller.restore() {
        Err(ControllerError::Restore(RepoError::Integrity { .. })) => {}
        other => panic!("expected integrity error, got {other:?}"),
    }
    assert_eq!(controller.snapshot().generation(), 0);
}

#[test]
fn saved_image_loads_back_unchanged() {
    let dir = TempDir::new().expect("temp dir");
    let repo = FileSnapshotRepo::new(dir.path().join("snapshot.json"));

    let controller = ContentCacheController::new(CacheUpdateOrchestrator::new(
        Arc::new(MemoryStore::new(archive())),
        CacheConfig::default(),
    ));
    controller.rebuild().expect("rebuild");
    let image = controller.snapshot().image();
    repo.save(&image).expect("save");
    assert_eq!(repo.load().expect("load"), Some(image.clone()));

    let from_image = ContentCache::from_image(image.clone());
    assert_eq!(from_image.image(), image);
}
