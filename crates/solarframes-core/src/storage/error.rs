use std::{fmt, io};

use snafu::{Backtrace, prelude::*};

/// Filesystem operation that was in progress when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// Creating a directory tree.
    CreateDir,
    /// Reading a whole file.
    Read,
    /// Creating or writing a file.
    Write,
    /// Flushing a file to disk.
    Sync,
    /// Renaming a temporary file into place.
    Rename,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageOp::CreateDir => "create dir",
            StorageOp::Read => "read",
            StorageOp::Write => "write",
            StorageOp::Sync => "sync",
            StorageOp::Rename => "rename",
        })
    }
}

/// Errors from the local filesystem helpers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The path (or one of its parents) does not exist.
    #[snafu(display("{op} {path}: not found"))]
    NotFound {
        /// Operation that failed.
        op: StorageOp,
        /// Path the operation was working on.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },

    /// Any other I/O failure.
    #[snafu(display("{op} {path}: {source}"))]
    Io {
        /// Operation that failed.
        op: StorageOp,
        /// Path the operation was working on.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Where the error was raised.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Path the failing operation was working on.
    pub fn path(&self) -> &str {
        match self {
            StorageError::NotFound { path, .. } | StorageError::Io { path, .. } => path,
        }
    }

    /// Operation that failed.
    pub fn op(&self) -> StorageOp {
        match self {
            StorageError::NotFound { op, .. } | StorageError::Io { op, .. } => *op,
        }
    }
}
