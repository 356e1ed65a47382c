//! File-backed home of the published cache image.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::application::repos::{RepoError, SnapshotRepo};
use crate::cache::CacheImage;

/// Stores the image as JSON. Writes go to a temporary file in the same
/// directory which then replaces the target, so a reader never observes a
/// partially written snapshot.
#[derive(Debug, Clone)]
pub struct FileSnapshotRepo {
    path: PathBuf,
}

impl FileSnapshotRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl SnapshotRepo for FileSnapshotRepo {
    fn save(&self, image: &CacheImage) -> Result<(), RepoError> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent).map_err(RepoError::from_persistence)?;

        let payload = serde_json::to_vec(image).map_err(RepoError::from_persistence)?;
        let mut staged = NamedTempFile::new_in(parent).map_err(RepoError::from_persistence)?;
        staged
            .write_all(&payload)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(RepoError::from_persistence)?;
        staged
            .persist(&self.path)
            .map_err(|err| RepoError::from_persistence(err.error))?;

        debug!(path = %self.path.display(), bytes = payload.len(), "Persisted content cache");
        Ok(())
    }

    fn load(&self) -> Result<Option<CacheImage>, RepoError> {
        let payload = match fs::read(&self.path) {
            Ok(payload) => payload,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(RepoError::from_persistence(err)),
        };
        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|err| RepoError::Integrity {
                message: format!("corrupt snapshot `{}`: {err}", self.path.display()),
            })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::cache::ContentCache;
    use crate::domain::types::EntityKind;

    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let repo = FileSnapshotRepo::new(dir.path().join("absent.json"));
        assert_eq!(repo.load().expect("load"), None);
    }

    #[test]
    fn corrupt_file_is_an_integrity_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        fs::write(&path, b"{not json").expect("write");
        let err = FileSnapshotRepo::new(path).load().expect_err("corrupt");
        assert!(matches!(err, RepoError::Integrity { .. }));
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempdir().expect("tempdir");
        let repo = FileSnapshotRepo::new(dir.path().join("nested/state/cache.json"));
        let cache = ContentCache::new();
        cache.add_entity(EntityKind::Offering, "o1");
        repo.save(&cache.image()).expect("save");
        assert_eq!(repo.load().expect("load"), Some(cache.image()));
    }
}
