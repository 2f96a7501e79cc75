//! Shard store abstraction.
//!
//! A shard store is a random-access collection of time-keyed records. Each
//! record has a key (for example `2022/11/01/0001`) and a set of fields named
//! by suffix (for example `.aia_0171.npy`) holding raw array bytes.
//!
//! The dataset layer only depends on the [`ShardStore`] trait. Two
//! implementations live here:
//!
//! - [`MemoryShardStore`], a vector of records used for tests and embedding.
//! - [`TarShardStore`], which reads a webdataset-style manifest and seeks
//!   directly into its tar shards.

mod error;
pub mod manifest;
mod memory;
mod tar_store;

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use bytes::Bytes;

pub use error::ShardError;
pub use manifest::{ShardEntry, ShardManifest, discover_manifest};
pub use memory::MemoryShardStore;
pub use tar_store::TarShardStore;

/// One time-keyed record from a shard store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRecord {
    key: String,
    fields: BTreeMap<String, Bytes>,
}

impl ShardRecord {
    /// Create a record with no fields.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, suffix: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        self.insert_field(suffix, payload);
        self
    }

    /// Insert or replace the field stored under `suffix`.
    pub fn insert_field(&mut self, suffix: impl Into<String>, payload: impl Into<Bytes>) {
        self.fields.insert(suffix.into(), payload.into());
    }

    /// The record key (the raw timestamp string).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw payload stored under `suffix`.
    pub fn field(&self, suffix: &str) -> Option<&Bytes> {
        self.fields.get(suffix)
    }

    /// Iterate over field suffixes in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Random-access source of shard records.
///
/// Implementations are expected to iterate in chronological key order; the
/// index builder checks this and sorts when the expectation does not hold.
pub trait ShardStore: Send + Sync {
    /// Number of records in the store.
    fn len(&self) -> usize;

    /// Returns `true` when the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read record `index` including all field payloads.
    fn record(&self, index: usize) -> Result<ShardRecord, ShardError>;

    /// Key of record `index`.
    ///
    /// The default reads the whole record; stores with a catalogue should
    /// override this.
    fn key(&self, index: usize) -> Result<String, ShardError> {
        self.record(index).map(|r| r.key)
    }

    /// Field suffixes present in record `index`.
    fn field_names(&self, index: usize) -> Result<BTreeSet<String>, ShardError> {
        self.record(index)
            .map(|r| r.fields.into_keys().collect::<BTreeSet<_>>())
    }

    /// Directory the store is rooted at; index caches are written here.
    fn root(&self) -> &Path;

    /// Short digest that changes whenever the store's content changes.
    fn fingerprint(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_fields_are_sorted_and_replaceable() {
        let mut rec = ShardRecord::new("2022/11/01/0001")
            .with_field(".b.npy", Bytes::from_static(b"b"))
            .with_field(".a.npy", Bytes::from_static(b"a"));
        rec.insert_field(".b.npy", Bytes::from_static(b"bb"));

        let names: Vec<&str> = rec.field_names().collect();
        assert_eq!(names, vec![".a.npy", ".b.npy"]);
        assert_eq!(rec.field(".b.npy").map(|b| b.as_ref()), Some(&b"bb"[..]));
        assert!(rec.field(".c.npy").is_none());
    }
}
