//! Writes workflow output and failure records as JSON documents.

use std::path::{Path, PathBuf};

use pipeline::{FailureRecord, WorkflowOutput};
use serde::Serialize;

use crate::atomic::write_atomic;
use crate::StorageError;

/// Writes one document per run into an output directory.
///
/// Successful runs land in `<workflow-id>.json`; failed runs in
/// `failed-<workflow-id>.json`, or `rejected-<timestamp>.json` when the input
/// was refused before a run id existed.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write_output(&self, output: &WorkflowOutput) -> Result<PathBuf, StorageError> {
        let path = self.dir.join(format!("{}.json", output.workflow_id));
        self.write_document(&path, output).await?;
        Ok(path)
    }

    pub async fn write_failure(&self, failure: &FailureRecord) -> Result<PathBuf, StorageError> {
        let name = match failure.workflow_id {
            Some(id) => format!("failed-{id}.json"),
            None => format!(
                "rejected-{}.json",
                failure.timestamp.as_datetime().format("%Y%m%dT%H%M%S%.3fZ")
            ),
        };
        let path = self.dir.join(name);
        self.write_document(&path, failure).await?;
        Ok(path)
    }

    async fn write_document<T: Serialize>(
        &self,
        path: &Path,
        document: &T,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(document)?;
        write_atomic(path, &body)
            .await
            .map_err(|source| StorageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), "workflow record written");
        Ok(())
    }
}
