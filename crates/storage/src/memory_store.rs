//! [`MemoryStore`] adapters.
//!
//! Both adapters serialise `persist` behind a single-writer lock held for the
//! whole read-modify-write, so concurrent runs sharing one store never lose
//! each other's upserts. Share a store between runs through an `Arc`; two
//! store instances over the same file do not coordinate.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{MemoryError, MemoryRecord, MemoryStore, MemoryUpdate};
use tokio::sync::Mutex;

use crate::atomic::write_atomic;

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// Memory record stored as a JSON document on disk.
#[derive(Debug)]
pub struct FileMemoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_record(&self) -> Result<MemoryRecord, MemoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(MemoryRecord::empty()),
            Ok(raw) => MemoryRecord::from_document(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no memory record yet; starting empty");
                Ok(MemoryRecord::empty())
            }
            Err(e) => Err(MemoryError::Io(format!("{}: {e}", self.path.display()))),
        }
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn load(&self) -> Result<MemoryRecord, MemoryError> {
        self.read_record().await
    }

    async fn persist(&self, update: &MemoryUpdate) -> Result<MemoryRecord, MemoryError> {
        let _guard = self.write_lock.lock().await;

        // A corrupt record is reported, never overwritten.
        let mut record = self.read_record().await?;
        if !record.apply(update) {
            return Ok(record);
        }

        let document = record.to_document()?;
        write_atomic(&self.path, document.as_bytes())
            .await
            .map_err(|e| MemoryError::Io(format!("{}: {e}", self.path.display())))?;

        tracing::debug!(
            path = %self.path.display(),
            topics = record.past_topics().len(),
            hooks = record.past_hooks().len(),
            "memory record persisted"
        );
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Memory record held in process memory; same semantics as [`FileMemoryStore`]
/// without the disk.
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    record: Mutex<MemoryRecord>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: MemoryRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }

    /// Copy of the current record.
    pub async fn snapshot(&self) -> MemoryRecord {
        self.record.lock().await.clone()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn load(&self) -> Result<MemoryRecord, MemoryError> {
        Ok(self.record.lock().await.clone())
    }

    async fn persist(&self, update: &MemoryUpdate) -> Result<MemoryRecord, MemoryError> {
        let mut record = self.record.lock().await;
        record.apply(update);
        Ok(record.clone())
    }
}
