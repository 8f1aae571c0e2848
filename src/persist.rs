//! Task persistence.
//!
//! The registry reports task lifecycle changes to a [`TaskPersister`] and
//! hands it whole [`RegistrySnapshot`]s to store. [`FilePersister`] keeps
//! the snapshot and per-task thumbnails under one directory:
//!
//! ```text
//! <dir>/tasks.snapshot.json
//! <dir>/recent_images/<task>_task_thumbnail.png
//! ```
//!
//! Stacks are not persisted; restored tasks come back detached.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PersistConfig;
use crate::error::{Error, Result};
use crate::lock;
use crate::task::{Task, TaskId};

pub const SNAPSHOT_SCHEMA_VERSION: &str = "taskreg.tasks.v1";
pub const SNAPSHOT_FILENAME: &str = "tasks.snapshot.json";
pub const IMAGES_DIRNAME: &str = "recent_images";
const IMAGE_SUFFIX: &str = "_task_thumbnail.png";

/// Every task known to a registry at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl RegistrySnapshot {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            tasks,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: RegistrySnapshot = serde_json::from_str(raw)?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(Error::InvalidArgument(format!(
                "unsupported snapshot schema {} (expected {})",
                snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION
            )));
        }
        Ok(snapshot)
    }
}

pub trait TaskPersister: Send {
    fn notify_task_created(&mut self, task: TaskId);

    /// `flush` asks for the change to reach storage soon rather than with
    /// the next batch.
    fn notify_task_changed(&mut self, task: TaskId, flush: bool);

    fn notify_task_removed(&mut self, task: TaskId);

    fn save_image(&mut self, task: TaskId, image: &[u8]) -> Result<()>;

    fn get_image(&self, task: TaskId) -> Result<Option<Vec<u8>>>;

    fn remove_image(&mut self, task: TaskId) -> Result<()>;

    fn write_snapshot(&mut self, _snapshot: &RegistrySnapshot) -> Result<()> {
        Ok(())
    }

    fn read_snapshot(&self) -> Result<Option<RegistrySnapshot>> {
        Ok(None)
    }

    /// Whether changes are waiting for [`TaskPersister::write_snapshot`].
    fn has_pending_changes(&self) -> bool {
        false
    }
}

/// Persister that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersister;

impl TaskPersister for NoopPersister {
    fn notify_task_created(&mut self, _task: TaskId) {}

    fn notify_task_changed(&mut self, _task: TaskId, _flush: bool) {}

    fn notify_task_removed(&mut self, _task: TaskId) {}

    fn save_image(&mut self, _task: TaskId, _image: &[u8]) -> Result<()> {
        Ok(())
    }

    fn get_image(&self, _task: TaskId) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn remove_image(&mut self, _task: TaskId) -> Result<()> {
        Ok(())
    }
}

/// Persister backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FilePersister {
    dir: PathBuf,
    lock_timeout_ms: u64,
    dirty: BTreeSet<TaskId>,
    flush_requested: bool,
}

impl FilePersister {
    pub fn new(dir: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout_ms,
            dirty: BTreeSet::new(),
            flush_requested: false,
        }
    }

    /// `config.dir` resolved against `base` when relative.
    pub fn from_config(base: &Path, config: &PersistConfig) -> Self {
        let dir = if config.dir.is_absolute() {
            config.dir.clone()
        } else {
            base.join(&config.dir)
        };
        Self::new(dir, config.lock_timeout_ms)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILENAME)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.join(IMAGES_DIRNAME)
    }

    pub fn image_path(&self, task: TaskId) -> PathBuf {
        self.images_dir().join(format!("{}{}", task.get(), IMAGE_SUFFIX))
    }

    /// Tasks changed since the last snapshot write.
    pub fn dirty_tasks(&self) -> Vec<TaskId> {
        self.dirty.iter().copied().collect()
    }

    pub fn flush_requested(&self) -> bool {
        self.flush_requested
    }
}

impl TaskPersister for FilePersister {
    fn notify_task_created(&mut self, task: TaskId) {
        self.dirty.insert(task);
    }

    fn notify_task_changed(&mut self, task: TaskId, flush: bool) {
        self.dirty.insert(task);
        self.flush_requested |= flush;
    }

    fn notify_task_removed(&mut self, task: TaskId) {
        self.dirty.insert(task);
    }

    fn save_image(&mut self, task: TaskId, image: &[u8]) -> Result<()> {
        lock::write_atomic_locked(self.image_path(task), image, self.lock_timeout_ms)
    }

    fn get_image(&self, task: TaskId) -> Result<Option<Vec<u8>>> {
        let path = self.image_path(task);
        if !path.exists() {
            return Ok(None);
        }
        lock::read_locked(path, self.lock_timeout_ms)
    }

    fn remove_image(&mut self, task: TaskId) -> Result<()> {
        let path = self.image_path(task);
        if !path.exists() {
            return Ok(());
        }
        lock::remove_locked(path, self.lock_timeout_ms)
    }

    fn write_snapshot(&mut self, snapshot: &RegistrySnapshot) -> Result<()> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        lock::write_atomic_locked(self.snapshot_path(), &data, self.lock_timeout_ms)?;
        tracing::debug!(
            path = %self.snapshot_path().display(),
            tasks = snapshot.tasks.len(),
            "wrote task snapshot"
        );
        self.dirty.clear();
        self.flush_requested = false;
        Ok(())
    }

    fn read_snapshot(&self) -> Result<Option<RegistrySnapshot>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let Some(data) = lock::read_locked(&path, self.lock_timeout_ms)? else {
            return Ok(None);
        };
        let raw = String::from_utf8(data)
            .map_err(|e| Error::OperationFailed(format!("snapshot is not UTF-8: {e}")))?;
        RegistrySnapshot::from_json(&raw).map(Some)
    }

    fn has_pending_changes(&self) -> bool {
        !self.dirty.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_paths_use_task_id() {
        let persister = FilePersister::new("/tmp/state", 100);
        assert_eq!(
            persister.image_path(TaskId::new(12)),
            PathBuf::from("/tmp/state/recent_images/12_task_thumbnail.png")
        );
    }

    #[test]
    fn relative_dir_resolves_against_base() {
        let config = PersistConfig::default();
        let persister = FilePersister::from_config(Path::new("/work"), &config);
        assert_eq!(persister.dir(), Path::new("/work/.taskreg"));
    }

    #[test]
    fn images_round_trip_and_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut persister = FilePersister::new(dir.path(), 1000);
        let task = TaskId::new(4);

        assert!(persister.get_image(task).expect("get").is_none());
        persister.save_image(task, b"png-bytes").expect("save");
        assert_eq!(
            persister.get_image(task).expect("get").as_deref(),
            Some(&b"png-bytes"[..])
        );
        persister.remove_image(task).expect("remove");
        assert!(persister.get_image(task).expect("get").is_none());
    }

    #[test]
    fn snapshot_write_clears_dirty_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut persister = FilePersister::new(dir.path(), 1000);
        persister.notify_task_changed(TaskId::new(1), true);
        assert!(persister.has_pending_changes());
        assert!(persister.flush_requested());

        persister
            .write_snapshot(&RegistrySnapshot::new(Vec::new()))
            .expect("write");
        assert!(!persister.has_pending_changes());
        let loaded = persister.read_snapshot().expect("read").expect("snapshot");
        assert!(loaded.tasks.is_empty());
    }

    #[test]
    fn unknown_schema_rejected() {
        let raw = r#"{"schema_version":"other.v9","generated_at":"2024-01-01T00:00:00Z","tasks":[]}"#;
        let err = RegistrySnapshot::from_json(raw).expect_err("schema");
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
