//! Persisted camera list.
//!
//! The whole registry is written as one JSON snapshot after every mutation
//! and read back at startup. Writes are full overwrites, so two processes
//! sharing a state directory race with last-writer-wins semantics.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::camera::{Camera, CameraDefinition, CameraId, Source};
use crate::error::StoreError;
use crate::registry::CameraRegistry;

/// Fixed namespace the snapshot is stored under
pub const SNAPSHOT_FILE: &str = "monitoring_cameras.json";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCamera {
    pub id: CameraId,
    pub name: String,
    pub source: Source,
    /// Streaming when saved; such cameras are reattached on restore
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub auto_start: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub next_id: u64,
    pub cameras: Vec<SavedCamera>,
}

impl Snapshot {
    pub fn capture(registry: &CameraRegistry) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            next_id: registry.next_id(),
            cameras: registry
                .list()
                .iter()
                .map(|c| SavedCamera {
                    id: c.id,
                    name: c.name.clone(),
                    source: c.source.clone(),
                    active: c.is_active(),
                    auto_start: c.auto_start,
                })
                .collect(),
        }
    }

    /// Rebuild cameras in Idle state. Returns them with the ids that were active.
    /// A repeated id keeps its first camera; later ones are dropped.
    pub fn into_cameras(self) -> (Vec<Camera>, Vec<CameraId>, u64) {
        let mut seen = HashSet::new();
        let mut resume = Vec::new();
        let mut cameras = Vec::with_capacity(self.cameras.len());
        for saved in self.cameras {
            if !seen.insert(saved.id) {
                warn!(camera = %saved.id, name = %saved.name, "dropping saved camera with duplicate id");
                continue;
            }
            if saved.active {
                resume.push(saved.id);
            }
            cameras.push(Camera::new(
                saved.id,
                CameraDefinition::new(saved.name, saved.source, saved.auto_start),
            ));
        }
        (cameras, resume, self.next_id)
    }
}

/// Storage boundary for the snapshot. The backing store lives outside the core.
pub trait SnapshotStore {
    /// `Ok(None)` when nothing has been saved yet
    fn load(&self) -> Result<Option<Snapshot>, StoreError>;
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Snapshot kept as a JSON file in a state directory
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            path: directory.as_ref().join(SNAPSHOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        // Write beside the target and rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// In-memory store shared with the test through `Rc`
    #[derive(Clone, Default)]
    pub struct MemoryStore {
        pub saved: Rc<RefCell<Option<Snapshot>>>,
        pub saves: Rc<RefCell<usize>>,
        pub fail_load: bool,
        pub fail_save: bool,
    }

    impl SnapshotStore for MemoryStore {
        fn load(&self) -> Result<Option<Snapshot>, StoreError> {
            if self.fail_load {
                return Err(StoreError::Io {
                    path: PathBuf::from("memory"),
                    source: std::io::Error::other("load failed"),
                });
            }
            Ok(self.saved.borrow().clone())
        }

        fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
            if self.fail_save {
                return Err(StoreError::Io {
                    path: PathBuf::from("memory"),
                    source: std::io::Error::other("disk full"),
                });
            }
            *self.saves.borrow_mut() += 1;
            *self.saved.borrow_mut() = Some(snapshot.clone());
            Ok(())
        }
    }
}
