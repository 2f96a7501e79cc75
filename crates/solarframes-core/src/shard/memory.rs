use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{ShardRecord, ShardStore, error::ShardError};

/// A shard store backed by an in-memory vector of records.
#[derive(Debug, Clone)]
pub struct MemoryShardStore {
    root: PathBuf,
    records: Vec<ShardRecord>,
    fingerprint: String,
}

impl MemoryShardStore {
    /// Create a store rooted at `root` (used for cache placement).
    pub fn new(root: impl Into<PathBuf>, records: Vec<ShardRecord>) -> Self {
        let fingerprint = fingerprint_records(&records);
        Self {
            root: root.into(),
            records,
            fingerprint,
        }
    }

    /// All records in store order.
    pub fn records(&self) -> &[ShardRecord] {
        &self.records
    }
}

// Keys, suffixes and payload lengths; cheap enough and catches the changes
// that matter for an index (records added, removed, renamed or re-channelled).
fn fingerprint_records(records: &[ShardRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((records.len() as u64).to_le_bytes());
    for rec in records {
        hasher.update(rec.key.as_bytes());
        hasher.update([0u8]);
        for (suffix, payload) in &rec.fields {
            hasher.update(suffix.as_bytes());
            hasher.update((payload.len() as u64).to_le_bytes());
        }
        hasher.update([0xffu8]);
    }
    hex::encode(hasher.finalize())
}

impl ShardStore for MemoryShardStore {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn record(&self, index: usize) -> Result<ShardRecord, ShardError> {
        self.records
            .get(index)
            .cloned()
            .ok_or(ShardError::IndexOutOfRange {
                index,
                len: self.records.len(),
            })
    }

    fn key(&self, index: usize) -> Result<String, ShardError> {
        self.records
            .get(index)
            .map(|r| r.key.clone())
            .ok_or(ShardError::IndexOutOfRange {
                index,
                len: self.records.len(),
            })
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
