//! Tar-backed shard store.
//!
//! Each shard is a plain tar archive whose members follow the webdataset
//! naming convention: `<key>.<suffix>`, where the key is the member path up
//! to the first `.` in its file name. Consecutive members sharing a key form
//! one record, so `2022/11/01/0001.hmi_m.npy` and `2022/11/01/0001.aia_0171.npy`
//! end up as the fields `.hmi_m.npy` and `.aia_0171.npy` of record
//! `2022/11/01/0001`.
//!
//! Opening the store catalogues every shard once (member offsets and sizes);
//! record reads then seek straight to the member data.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use log::{debug, info};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use snafu::prelude::*;

use super::{
    ShardRecord, ShardStore,
    error::{
        IndexOutOfRangeSnafu, ManifestReadSnafu, MemberPathSnafu, SampleCountMismatchSnafu,
        ShardError, ShardIoSnafu,
    },
    manifest::{ShardManifest, resolve_shard_path},
};
use crate::storage;

#[derive(Debug, Clone)]
struct MemberSpan {
    suffix: String,
    offset: u64,
    size: u64,
}

#[derive(Debug, Clone)]
struct SampleLocation {
    shard: usize,
    key: String,
    members: Vec<MemberSpan>,
}

#[derive(Debug)]
struct CataloguedShard {
    size: u64,
    samples: Vec<(String, Vec<MemberSpan>)>,
}

/// Shard store reading webdataset tar shards listed in a JSON manifest.
#[derive(Debug)]
pub struct TarShardStore {
    root: PathBuf,
    manifest_path: PathBuf,
    shards: Vec<PathBuf>,
    samples: Vec<SampleLocation>,
    fingerprint: String,
}

/// Split a member path into `(key, suffix)` following webdataset rules.
///
/// Returns `None` for members without a `.` in their file name.
fn split_member(member: &str) -> Option<(&str, &str)> {
    let name_start = member.rfind('/').map_or(0, |i| i + 1);
    let dot = member[name_start..].find('.')?;
    let split = name_start + dot;
    if split == name_start {
        // Hidden files such as `.DS_Store` carry no key.
        return None;
    }
    Some((&member[..split], &member[split..]))
}

fn catalogue_shard(path: &Path) -> Result<CataloguedShard, ShardError> {
    let path_str = path.display().to_string();
    let file = File::open(path).context(ShardIoSnafu {
        path: path_str.clone(),
    })?;
    let size = file
        .metadata()
        .context(ShardIoSnafu {
            path: path_str.clone(),
        })?
        .len();

    let mut archive = tar::Archive::new(file);
    let mut samples: Vec<(String, Vec<MemberSpan>)> = Vec::new();

    for entry in archive.entries().context(ShardIoSnafu {
        path: path_str.clone(),
    })? {
        let entry = entry.context(ShardIoSnafu {
            path: path_str.clone(),
        })?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let member_path = entry.path().context(ShardIoSnafu {
            path: path_str.clone(),
        })?;
        let member = member_path.to_str().context(MemberPathSnafu {
            path: path_str.clone(),
        })?;
        let Some((key, suffix)) = split_member(member) else {
            debug!("skipping keyless member {member} in {path_str}");
            continue;
        };

        let span = MemberSpan {
            suffix: suffix.to_string(),
            offset: entry.raw_file_position(),
            size: entry.size(),
        };
        match samples.last_mut() {
            Some((last_key, members)) if last_key.as_str() == key => members.push(span),
            _ => samples.push((key.to_string(), vec![span])),
        }
    }

    Ok(CataloguedShard { size, samples })
}

impl TarShardStore {
    /// Open the store described by the manifest at `manifest_path`.
    ///
    /// Shards are catalogued in parallel. Each shard must hold exactly the
    /// number of records its manifest entry declares.
    pub async fn open(manifest_path: &Path) -> Result<Self, ShardError> {
        let manifest_bytes = storage::read_all_bytes(manifest_path)
            .await
            .context(ManifestReadSnafu)?;
        let manifest = ShardManifest::from_json(manifest_path, &manifest_bytes)?;

        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let shards = manifest
            .shardlist
            .iter()
            .map(|entry| resolve_shard_path(&root, &entry.url))
            .collect::<Result<Vec<_>, _>>()?;

        let catalogued = shards
            .par_iter()
            .map(|path| catalogue_shard(path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut hasher = Sha256::new();
        hasher.update(&manifest_bytes);

        let mut samples = Vec::with_capacity(manifest.total_samples());
        for (shard_idx, (entry, shard)) in manifest.shardlist.iter().zip(catalogued).enumerate() {
            ensure!(
                shard.samples.len() == entry.nsamples,
                SampleCountMismatchSnafu {
                    path: shards[shard_idx].display().to_string(),
                    expected: entry.nsamples,
                    actual: shard.samples.len(),
                }
            );
            hasher.update(shard.size.to_le_bytes());
            samples.extend(
                shard
                    .samples
                    .into_iter()
                    .map(|(key, members)| SampleLocation {
                        shard: shard_idx,
                        key,
                        members,
                    }),
            );
        }

        info!(
            "opened shard store {} ({} shards, {} records)",
            manifest_path.display(),
            shards.len(),
            samples.len()
        );

        Ok(Self {
            root,
            manifest_path: manifest_path.to_path_buf(),
            shards,
            samples,
            fingerprint: hex::encode(hasher.finalize()),
        })
    }

    /// Path of the manifest this store was opened from.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Resolved shard paths in manifest order.
    pub fn shard_paths(&self) -> &[PathBuf] {
        &self.shards
    }

    fn sample(&self, index: usize) -> Result<&SampleLocation, ShardError> {
        self.samples.get(index).context(IndexOutOfRangeSnafu {
            index,
            len: self.samples.len(),
        })
    }
}

impl ShardStore for TarShardStore {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn record(&self, index: usize) -> Result<ShardRecord, ShardError> {
        let sample = self.sample(index)?;
        let path = &self.shards[sample.shard];
        let path_str = path.display().to_string();

        let mut file = File::open(path).context(ShardIoSnafu {
            path: path_str.clone(),
        })?;

        let mut record = ShardRecord::new(sample.key.clone());
        for member in &sample.members {
            file.seek(SeekFrom::Start(member.offset))
                .context(ShardIoSnafu {
                    path: path_str.clone(),
                })?;
            let mut buf = vec![0u8; member.size as usize];
            file.read_exact(&mut buf).context(ShardIoSnafu {
                path: path_str.clone(),
            })?;
            record.insert_field(member.suffix.clone(), Bytes::from(buf));
        }
        Ok(record)
    }

    fn key(&self, index: usize) -> Result<String, ShardError> {
        self.sample(index).map(|s| s.key.clone())
    }

    fn field_names(&self, index: usize) -> Result<BTreeSet<String>, ShardError> {
        self.sample(index)
            .map(|s| s.members.iter().map(|m| m.suffix.clone()).collect())
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
