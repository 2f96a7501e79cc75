//! Shard manifest model and discovery.
//!
//! A dataset directory holds exactly one `*.json` manifest in the wids
//! shard-index layout:
//!
//! ```json
//! {
//!   "__kind__": "wids-shard-index-v1",
//!   "wids_version": 1,
//!   "name": "sdoml-lite",
//!   "shardlist": [
//!     { "url": "sdoml-lite-000000.tar", "nsamples": 480 },
//!     { "url": "sdoml-lite-000001.tar", "nsamples": 480 }
//!   ]
//! }
//! ```
//!
//! Relative shard URLs resolve against the manifest's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tokio::fs;

use super::error::{
    AmbiguousManifestSnafu, ManifestJsonSnafu, NoManifestSnafu, ReadDirSnafu, ShardError,
    UnsupportedShardUrlSnafu,
};

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    /// Manifest kind tag, for example `wids-shard-index-v1`.
    #[serde(rename = "__kind__", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Manifest layout version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wids_version: Option<u32>,
    /// Optional dataset name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered list of shards; record positions run across shards in this order.
    pub shardlist: Vec<ShardEntry>,
}

/// One shard in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    /// Location of the tar shard.
    pub url: String,
    /// Number of records the shard holds.
    pub nsamples: usize,
    /// Optional shard size in bytes, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

impl ShardManifest {
    /// Parse a manifest from raw JSON bytes.
    pub fn from_json(path: &Path, bytes: &[u8]) -> Result<Self, ShardError> {
        serde_json::from_slice(bytes).context(ManifestJsonSnafu {
            path: path.display().to_string(),
        })
    }

    /// Total number of records declared across all shards.
    pub fn total_samples(&self) -> usize {
        self.shardlist.iter().map(|s| s.nsamples).sum()
    }
}

/// Resolve a shard URL from the manifest into a local path.
pub(crate) fn resolve_shard_path(manifest_dir: &Path, url: &str) -> Result<PathBuf, ShardError> {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("pipe:") {
        return UnsupportedShardUrlSnafu { url }.fail();
    }
    let local = url.strip_prefix("file://").unwrap_or(url);
    let path = Path::new(local);
    Ok(if path.is_absolute() {
        path.to_path_buf()
    } else {
        manifest_dir.join(path)
    })
}

/// Find the single `*.json` manifest in `data_dir`.
///
/// Zero candidates is [`ShardError::NoManifest`]; more than one is
/// [`ShardError::AmbiguousManifest`].
pub async fn discover_manifest(data_dir: &Path) -> Result<PathBuf, ShardError> {
    let dir = data_dir.display().to_string();
    let mut entries = fs::read_dir(data_dir)
        .await
        .context(ReadDirSnafu { dir: dir.clone() })?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .context(ReadDirSnafu { dir: dir.clone() })?
    {
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json && path.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();

    match candidates.len() {
        0 => NoManifestSnafu { dir }.fail(),
        1 => Ok(candidates.remove(0)),
        _ => AmbiguousManifestSnafu {
            dir,
            candidates: candidates
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
        }
        .fail(),
    }
}
