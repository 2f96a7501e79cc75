//! Persisted index cache.
//!
//! A built [`TemporalIndex`] is written next to the shard store as a small
//! JSON document holding the ordered date list and the date to position
//! mapping. The file name is derived from the channel list (order sensitive)
//! and a digest of the store root, the store fingerprint and the channels:
//!
//! ```text
//! <root>/dates_cache_hmi_m_aia_0171_3f9a0c2b7d41e5a8
//! ```
//!
//! The fingerprint makes a cache written for an older version of the store
//! miss instead of being served stale. A cache hit is otherwise trusted
//! without rescanning the store. The name deliberately has no `.json`
//! extension so it never competes with manifest discovery.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::prelude::*;

use super::{
    channels::ChannelSet,
    error::{CacheEncodeSnafu, CacheReadSnafu, CacheWriteSnafu, DatasetError},
    index::TemporalIndex,
};
use crate::storage::{self, StorageError};

/// Bumped whenever the cache document layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const CACHE_PREFIX: &str = "dates_cache_";
const DIGEST_HEX_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct IndexCacheFile {
    format_version: u32,
    channels: Vec<String>,
    dates: Vec<NaiveDateTime>,
    positions: BTreeMap<NaiveDateTime, usize>,
}

/// Location of the cache artifact for `channels` over a store rooted at `root`.
pub fn cache_path(root: &Path, channels: &ChannelSet, fingerprint: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(fingerprint.as_bytes());
    for name in channels.names() {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    root.join(format!(
        "{CACHE_PREFIX}{}_{}",
        channels.joined("_"),
        &digest[..DIGEST_HEX_LEN]
    ))
}

/// Load a cached index.
///
/// Returns `Ok(None)` on a miss: no file, an unreadable document, a format
/// version mismatch or a channel list mismatch. Unreadable documents are
/// logged and treated as misses so the caller rebuilds.
pub async fn load(
    path: &Path,
    channels: &ChannelSet,
) -> Result<Option<TemporalIndex>, DatasetError> {
    let bytes = match storage::read_all_bytes(path).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound { .. }) => return Ok(None),
        Err(source) => return Err(source).context(CacheReadSnafu),
    };

    let file: IndexCacheFile = match serde_json::from_slice(&bytes) {
        Ok(file) => file,
        Err(e) => {
            warn!(
                "ignoring unreadable index cache {}: {e}; rebuilding",
                path.display()
            );
            return Ok(None);
        }
    };

    if file.format_version != CACHE_FORMAT_VERSION || file.channels != channels.names() {
        warn!(
            "ignoring index cache {} (format {}, channels [{}]); rebuilding",
            path.display(),
            file.format_version,
            file.channels.join(", ")
        );
        return Ok(None);
    }

    let index = TemporalIndex::from_parts(file.dates, file.positions);
    if index.is_none() {
        warn!(
            "ignoring inconsistent index cache {}; rebuilding",
            path.display()
        );
    }
    Ok(index)
}

/// Persist `index` at `path` atomically.
pub async fn persist(
    path: &Path,
    channels: &ChannelSet,
    index: &TemporalIndex,
) -> Result<(), DatasetError> {
    let file = IndexCacheFile {
        format_version: CACHE_FORMAT_VERSION,
        channels: channels.names().to_vec(),
        dates: index.dates().to_vec(),
        positions: index.positions().clone(),
    };
    let bytes = serde_json::to_vec(&file).context(CacheEncodeSnafu)?;
    storage::write_atomic(path, &bytes)
        .await
        .context(CacheWriteSnafu)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::shard::{MemoryShardStore, ShardRecord};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn sample_index(root: &Path) -> TemporalIndex {
        let records = ["2022/11/01/0001", "2022/11/01/0016", "2022/11/01/0030"]
            .into_iter()
            .map(|k| {
                ShardRecord::new(k)
                    .with_field(".a.npy", Bytes::from_static(b"1"))
                    .with_field(".b.npy", Bytes::from_static(b"2"))
            })
            .collect();
        let store = MemoryShardStore::new(root, records);
        TemporalIndex::build(&store, &ChannelSet::new(["a", "b"]).unwrap()).unwrap()
    }

    #[test]
    fn cache_path_is_order_sensitive_and_fingerprinted() {
        let root = Path::new("/data");
        let ab = ChannelSet::new(["a", "b"]).unwrap();
        let ba = ChannelSet::new(["b", "a"]).unwrap();

        let p_ab = cache_path(root, &ab, "fp1");
        assert_eq!(p_ab, cache_path(root, &ab, "fp1"));
        assert_ne!(p_ab, cache_path(root, &ba, "fp1"));
        assert_ne!(p_ab, cache_path(root, &ab, "fp2"));

        let name = p_ab.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("dates_cache_a_b_"));
        assert_eq!(name.len(), "dates_cache_a_b_".len() + DIGEST_HEX_LEN);
        assert!(p_ab.extension().is_none());
    }

    #[tokio::test]
    async fn persist_then_load_roundtrips() -> TestResult {
        let tmp = TempDir::new()?;
        let channels = ChannelSet::new(["a", "b"])?;
        let index = sample_index(tmp.path());
        let path = cache_path(tmp.path(), &channels, "fp");

        persist(&path, &channels, &index).await?;
        let loaded = load(&path, &channels).await?.expect("cache hit");

        assert_eq!(loaded, index);
        assert_eq!(loaded.dates(), index.dates());
        assert_eq!(loaded.positions(), index.positions());
        Ok(())
    }

    #[tokio::test]
    async fn missing_or_mismatched_cache_is_a_miss() -> TestResult {
        let tmp = TempDir::new()?;
        let channels = ChannelSet::new(["a", "b"])?;
        let path = cache_path(tmp.path(), &channels, "fp");

        assert!(load(&path, &channels).await?.is_none());

        persist(&path, &channels, &sample_index(tmp.path())).await?;
        let other = ChannelSet::new(["a"])?;
        assert!(load(&path, &other).await?.is_none());

        std::fs::write(&path, b"not json")?;
        assert!(load(&path, &channels).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn cache_document_uses_iso_dates() -> TestResult {
        let tmp = TempDir::new()?;
        let channels = ChannelSet::new(["a", "b"])?;
        let path = cache_path(tmp.path(), &channels, "fp");
        persist(&path, &channels, &sample_index(tmp.path())).await?;

        let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(doc["dates"][0], "2022-11-01T00:01:00");
        assert_eq!(doc["positions"]["2022-11-01T00:16:00"], 1);
        assert_eq!(doc["format_version"], CACHE_FORMAT_VERSION);
        Ok(())
    }
}
