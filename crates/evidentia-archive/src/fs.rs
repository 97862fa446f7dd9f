//! Filesystem `ContentStore`.
//!
//! Each disk name maps to a root directory; a location's path is resolved
//! beneath that root.  Paths that would escape the root are refused.

use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use tracing::debug;

use evidentia_contracts::{
    archive::StorageLocation,
    error::{EvResult, EvidentiaError},
};
use evidentia_core::traits::ContentStore;

#[derive(Debug, Clone, Default)]
pub struct FsContentStore {
    roots: HashMap<String, PathBuf>,
}

impl FsContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `disk` to the directory `root`.
    pub fn with_disk(mut self, disk: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(disk.into(), root.into());
        self
    }

    fn resolve(&self, location: &StorageLocation) -> EvResult<PathBuf> {
        let root = self
            .roots
            .get(&location.disk)
            .ok_or_else(|| EvidentiaError::ConfigError {
                reason: format!("no root directory configured for disk '{}'", location.disk),
            })?;

        let relative = Path::new(&location.path);
        let safe = !location.path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(EvidentiaError::InvalidInput {
                reason: format!("storage path '{}' escapes its disk", location.path),
            });
        }
        Ok(root.join(relative))
    }
}

fn io_error(action: &str, location: &StorageLocation, e: std::io::Error) -> EvidentiaError {
    EvidentiaError::Storage {
        reason: format!("failed to {action} {location}: {e}"),
    }
}

impl ContentStore for FsContentStore {
    fn read(&self, location: &StorageLocation) -> EvResult<Vec<u8>> {
        let path = self.resolve(location)?;
        fs::read(&path).map_err(|e| io_error("read", location, e))
    }

    /// Writes to a sibling temp file and renames it into place, so a reader
    /// never sees a partial copy.
    fn write(&self, location: &StorageLocation, content: &[u8]) -> EvResult<()> {
        let path = self.resolve(location)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("create directory for", location, e))?;
        }
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);

        fs::write(&staging, content).map_err(|e| io_error("write", location, e))?;
        fs::rename(&staging, &path).map_err(|e| io_error("commit", location, e))?;
        debug!(location = %location, bytes = content.len(), "content written");
        Ok(())
    }

    fn delete(&self, location: &StorageLocation) -> EvResult<()> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", location, e)),
        }
    }

    fn exists(&self, location: &StorageLocation) -> EvResult<bool> {
        Ok(self.resolve(location)?.is_file())
    }
}
