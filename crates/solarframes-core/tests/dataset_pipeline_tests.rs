//! End-to-end tests over tar-backed datasets on disk.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use solarframes_core::{
    dataset::{CacheMode, ChannelSet, Dataset, DatasetError, DatasetOptions},
    error::ErrorCategory,
    npy::{DType, NpyArray},
    shard::ShardError,
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// One record: key plus `(channel, fill value)` pairs.
type Fixture<'a> = (&'a str, &'a [(&'a str, f32)]);

fn plane(fill: f32) -> Vec<u8> {
    NpyArray::from_values(vec![4, 4], &[fill; 16])
        .expect("valid plane")
        .to_npy_bytes()
}

/// Write `records` as tar shards of `per_shard` records plus an `index.json`.
fn write_dataset(dir: &Path, records: &[Fixture<'_>], per_shard: usize) -> TestResult {
    let mut shardlist = Vec::new();
    for (i, chunk) in records.chunks(per_shard).enumerate() {
        let name = format!("shard-{i:04}.tar");
        let mut builder = tar::Builder::new(File::create(dir.join(&name))?);
        for (key, channels) in chunk {
            for (channel, fill) in channels.iter() {
                let data = plane(*fill);
                let mut header = tar::Header::new_gnu();
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder.append_data(&mut header, format!("{key}.{channel}.npy"), data.as_slice())?;
            }
        }
        builder.finish()?;
        shardlist.push(serde_json::json!({ "url": name, "nsamples": chunk.len() }));
    }
    let manifest = serde_json::json!({
        "__kind__": "wids-shard-index-v1",
        "wids_version": 1,
        "name": "fixture",
        "shardlist": shardlist,
    });
    std::fs::write(dir.join("index.json"), serde_json::to_vec_pretty(&manifest)?)?;
    Ok(())
}

fn options(channels: &[&str], cache: CacheMode) -> DatasetOptions {
    DatasetOptions {
        channels: ChannelSet::new(channels.iter().copied()).expect("valid channels"),
        cache,
    }
}

const RECORDS: &[Fixture<'static>] = &[
    ("2022/11/01/0000", &[("hmi_m", 1.0), ("aia_0171", 2.0)]),
    ("2022/11/01/0014", &[("hmi_m", 3.0)]),
    ("2022/11/01/0030", &[("hmi_m", 4.0), ("aia_0171", 5.0)]),
    ("2022/11/01/0044", &[("aia_0171", 6.0), ("hmi_m", 7.0)]),
    ("2022/11/01/0100", &[("aia_0171", 8.0)]),
];

#[tokio::test]
async fn open_index_and_read_frames_from_tar_shards() -> TestResult {
    let tmp = TempDir::new()?;
    write_dataset(tmp.path(), RECORDS, 2)?;

    let ds = Dataset::open(
        tmp.path(),
        options(&["aia_0171", "hmi_m"], CacheMode::ReadWrite),
    )
    .await?;

    assert_eq!(ds.len(), 3);
    let stats = ds.stats();
    assert_eq!((stats.frames_total, stats.frames_available), (5, 3));
    assert!(!stats.from_cache);

    let (frame, date) = ds.get("2022-11-01T00:44:00")?;
    assert_eq!(date, "2022-11-01T00:44:00");
    assert_eq!(frame.shape(), [2, 4, 4]);
    assert_eq!(frame.element_type().dtype, DType::F32);
    assert_eq!(frame.value_f64(0, 3, 3), Some(6.0));
    assert_eq!(frame.value_f64(1, 0, 0), Some(7.0));

    let (first, date) = ds.get(0usize)?;
    assert_eq!(date, "2022-11-01T00:00:00");
    assert_eq!(first.value_f64(1, 2, 1), Some(1.0));

    let err = ds.get("2022-11-01T00:14:00").unwrap_err();
    assert!(matches!(err, DatasetError::DateNotIndexed { .. }));
    Ok(())
}

#[tokio::test]
async fn second_open_uses_cache_and_stays_out_of_manifest_discovery() -> TestResult {
    let tmp = TempDir::new()?;
    write_dataset(tmp.path(), RECORDS, 5)?;
    let opts = options(&["hmi_m", "aia_0171"], CacheMode::ReadWrite);

    let first = Dataset::open(tmp.path(), opts.clone()).await?;
    let cache: PathBuf = first.cache_path().expect("cache enabled").to_path_buf();
    assert!(cache.is_file());

    let second = Dataset::open(tmp.path(), opts).await?;
    assert!(second.stats().from_cache);
    assert_eq!(second.dates(), first.dates());
    assert_eq!(second.get(2usize)?.0, first.get(2usize)?.0);
    Ok(())
}

#[tokio::test]
async fn rewritten_shards_invalidate_the_cache() -> TestResult {
    let tmp = TempDir::new()?;
    write_dataset(tmp.path(), RECORDS, 5)?;
    let opts = options(&["hmi_m", "aia_0171"], CacheMode::ReadWrite);
    let first = Dataset::open(tmp.path(), opts.clone()).await?;
    assert_eq!(first.len(), 3);

    let mut grown = RECORDS.to_vec();
    grown.push(("2022/11/01/0114", &[("hmi_m", 9.0), ("aia_0171", 9.5)]));
    write_dataset(tmp.path(), &grown, 5)?;

    let second = Dataset::open(tmp.path(), opts).await?;
    assert!(!second.stats().from_cache);
    assert_eq!(second.len(), 4);
    assert_ne!(second.cache_path(), first.cache_path());
    Ok(())
}

#[tokio::test]
async fn disabled_cache_writes_nothing() -> TestResult {
    let tmp = TempDir::new()?;
    write_dataset(tmp.path(), RECORDS, 5)?;
    let ds = Dataset::open(tmp.path(), options(&["hmi_m"], CacheMode::Disabled)).await?;
    assert_eq!(ds.len(), 4);
    assert!(ds.cache_path().is_none());

    let names: Vec<String> = std::fs::read_dir(tmp.path())?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    assert!(names.iter().all(|n| !n.starts_with("dates_cache_")));
    Ok(())
}

#[tokio::test]
async fn unknown_channel_has_no_frames() -> TestResult {
    let tmp = TempDir::new()?;
    write_dataset(tmp.path(), RECORDS, 5)?;
    let err = Dataset::open(tmp.path(), options(&["aia_1600"], CacheMode::Disabled))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::NoCompleteFrames { total: 5, .. }));
    assert_eq!(err.category(), ErrorCategory::Data);
    Ok(())
}

#[tokio::test]
async fn manifest_discovery_errors_are_config_errors() -> TestResult {
    let tmp = TempDir::new()?;
    let err = Dataset::open(tmp.path(), DatasetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatasetError::Shard {
            source: ShardError::NoManifest { .. }
        }
    ));
    assert_eq!(err.category(), ErrorCategory::Config);

    write_dataset(tmp.path(), RECORDS, 5)?;
    std::fs::write(tmp.path().join("other.json"), b"{}")?;
    let err = Dataset::open(tmp.path(), DatasetOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
    Ok(())
}
