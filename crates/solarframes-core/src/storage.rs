//! Filesystem helpers shared by the dataset cache, the CLI and the fetch
//! executor.
//!
//! All async disk access goes through here so every failure carries the
//! operation and path, and a missing path is always [`StorageError::NotFound`]:
//!
//! - [`write_atomic`] writes a payload with write-then-rename semantics so a
//!   reader never observes a partially written cache artifact.
//! - [`write_file`] writes straight into the target (downloaded images).
//! - [`read_all_bytes`] reads a whole file.
//! - [`ensure_dir_all`] creates a directory tree and tolerates concurrent
//!   creation by sibling tasks.

mod error;

use std::{
    io,
    path::{Path, PathBuf},
};

use snafu::IntoError;
use tokio::{fs, io::AsyncWriteExt};

pub use error::{StorageError, StorageOp};
use error::{IoSnafu, NotFoundSnafu};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Map an `io::Error` from `op` on `path` into a [`StorageError`].
fn classify(op: StorageOp, path: &Path) -> impl FnOnce(io::Error) -> StorageError {
    let path = path.display().to_string();
    move |source| {
        if source.kind() == io::ErrorKind::NotFound {
            NotFoundSnafu { op, path }.into_error(source)
        } else {
            IoSnafu { op, path }.into_error(source)
        }
    }
}

/// Create `dir` and all of its missing parents.
///
/// Succeeds when the directory already exists, including when a sibling task
/// created it concurrently.
pub async fn ensure_dir_all(dir: &Path) -> StorageResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(classify(StorageOp::CreateDir, dir))
}

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Write `contents` to `abs` atomically.
///
/// The payload goes to `<file>.tmp` next to the target, is synced, then
/// renamed into place. Parent directories are created as needed.
pub async fn write_atomic(abs: &Path, contents: &[u8]) -> StorageResult<()> {
    if let Some(parent) = abs.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir_all(parent).await?;
    }

    let mut tmp_name = abs.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = abs.with_file_name(tmp_name);
    let mut guard = TempFileGuard {
        path: tmp_path.clone(),
        armed: true,
    };

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(classify(StorageOp::Write, &tmp_path))?;
    file.write_all(contents)
        .await
        .map_err(classify(StorageOp::Write, &tmp_path))?;
    file.sync_all()
        .await
        .map_err(classify(StorageOp::Sync, &tmp_path))?;
    drop(file);

    fs::rename(&tmp_path, abs)
        .await
        .map_err(classify(StorageOp::Rename, abs))?;
    guard.armed = false;
    Ok(())
}

/// Write `contents` to `abs`, replacing any existing file.
///
/// The parent directory must exist. A failure may leave a partial file.
pub async fn write_file(abs: &Path, contents: &[u8]) -> StorageResult<()> {
    fs::write(abs, contents)
        .await
        .map_err(classify(StorageOp::Write, abs))
}

/// Read the full contents of the file at `abs`.
pub async fn read_all_bytes(abs: &Path) -> StorageResult<Vec<u8>> {
    fs::read(abs).await.map_err(classify(StorageOp::Read, abs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn write_atomic_creates_parent_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let abs = tmp.path().join("nested/deep/cache");

        write_atomic(&abs, b"nested content").await?;

        assert_eq!(tokio::fs::read_to_string(&abs).await?, "nested content");
        Ok(())
    }

    #[tokio::test]
    async fn write_atomic_overwrites_and_leaves_no_tmp() -> TestResult {
        let tmp = TempDir::new()?;
        let abs = tmp.path().join("dates_cache_a_b");

        write_atomic(&abs, b"original").await?;
        write_atomic(&abs, b"updated").await?;

        assert_eq!(read_all_bytes(&abs).await?, b"updated");
        assert!(!tmp.path().join("dates_cache_a_b.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn missing_paths_are_not_found_with_op() -> TestResult {
        let tmp = TempDir::new()?;
        let abs = tmp.path().join("missing");

        let err = read_all_bytes(&abs).await.expect_err("expected NotFound");
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(err.op(), StorageOp::Read);
        assert_eq!(err.path(), abs.display().to_string());

        let err = write_file(&tmp.path().join("no/such/dir/x.jpg"), b"1")
            .await
            .expect_err("parent missing");
        assert_eq!(err.op(), StorageOp::Write);
        assert!(matches!(err, StorageError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn directory_in_place_of_file_is_io_error() -> TestResult {
        let tmp = TempDir::new()?;
        let err = read_all_bytes(tmp.path()).await.expect_err("is a dir");
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(err.to_string().starts_with("read "));
        Ok(())
    }

    #[tokio::test]
    async fn ensure_dir_all_is_idempotent_under_concurrency() -> TestResult {
        let tmp = TempDir::new()?;
        let dir = tmp.path().join("2024/01/02");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                tokio::spawn(async move { ensure_dir_all(&dir).await })
            })
            .collect();
        for t in tasks {
            t.await??;
        }

        assert!(dir.is_dir());
        Ok(())
    }
}
