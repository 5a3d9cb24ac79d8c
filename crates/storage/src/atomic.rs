//! Crash-safe whole-file replacement.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// Sibling path the new content is staged in before the swap.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `content` to a temporary sibling, syncs it, then renames it over
/// `path`. A crash at any point leaves either the old file or the new one,
/// never a torn write.
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(path);
    let result = async {
        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&staging, path).await
    }
    .await;

    if result.is_err() {
        // Best effort; the original error is returned.
        let _ = tokio::fs::remove_file(&staging).await;
    }
    result
}
