//! Filesystem helpers for crash-safe file replacement.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StorageResult;

/// Sibling temp path used while replacing `path`: `<path>.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace `path` with `contents` atomically.
///
/// The bytes are written and flushed to `<path>.tmp` in the same directory,
/// then renamed over the target, so readers see either the old file or the
/// new one and never a partial write. Missing parent directories are
/// created.
pub async fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> StorageResult<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp = temp_path(path);
    if let Err(e) = write_then_rename(&tmp, path, contents).await {
        // Leave no stray temp file behind on failure
        let _ = fs::remove_file(&tmp).await;
        tracing::error!(
            "Failed to replace {} via {}: {}",
            path.display(),
            tmp.display(),
            e
        );
        return Err(e.into());
    }

    tracing::debug!("Atomically replaced {}", path.display());
    Ok(())
}

async fn write_then_rename(tmp: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp, path).await
}

/// Read a file, mapping "does not exist" to `None`.
pub async fn read_if_exists(path: impl AsRef<Path>) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path.as_ref()).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
