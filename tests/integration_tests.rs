//! Integration tests for bucket-tar
//!
//! Runs the whole pipeline against the in-memory and directory stores and
//! reads the saved archives back with the `tar`, `flate2` and `zstd` crates.

use bucket_tar::archive::{Compression, BLOCK_LEN};
use bucket_tar::config::{ArchiveConfig, BucketUrl};
use bucket_tar::error::BucketTarError;
use bucket_tar::store::{MemoryStore, ObjectStore};
use bucket_tar::walker::ArchiveCoordinator;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// (name, content, mtime, mode) of every entry in order
fn read_entries<R: Read>(reader: R) -> Vec<(String, Vec<u8>, u64, u32)> {
    let mut archive = tar::Archive::new(reader);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mtime = entry.header().mtime().unwrap();
            let mode = entry.header().mode().unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (name, data, mtime, mode)
        })
        .collect()
}

fn read_gz(path: &Path) -> Vec<(String, Vec<u8>, u64, u32)> {
    read_entries(GzDecoder::new(File::open(path).unwrap()))
}

fn config(url: &str, out: &Path) -> ArchiveConfig {
    let mut config = ArchiveConfig::new(BucketUrl::parse(url).unwrap(), out);
    config.worker_count = 4;
    config
}

async fn archive(store: MemoryStore, config: ArchiveConfig) -> bucket_tar::Result<bucket_tar::ArchiveSummary> {
    let store: Arc<dyn ObjectStore> = Arc::new(store);
    ArchiveCoordinator::with_store(config, store).run().await
}

#[tokio::test]
async fn test_leaves_before_subfolders() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.tar.gz");

    let mut store = MemoryStore::new("bucket");
    store
        .insert_with_time("root/x", "hello", "2021-03-04T05:06:07.000Z")
        .insert_with_time("root/sub/y", "world", "2022-01-01T00:00:00Z");

    let summary = archive(store, config("s3://bucket/root", &out)).await.unwrap();
    assert_eq!(summary.objects, 2);

    let entries = read_gz(&out);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "x");
    assert_eq!(entries[0].1, b"hello");
    assert_eq!(entries[0].2, 1_614_834_367);
    assert_eq!(entries[0].3, 0o644);
    assert_eq!(entries[1].0, "sub/y");
    assert_eq!(entries[1].1, b"world");
    assert_eq!(entries[1].2, 1_640_995_200);
}

#[tokio::test]
async fn test_every_object_archived_with_its_size() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("many.tar.gz");

    let mut store = MemoryStore::new("bucket");
    for i in 0..50 {
        let depth = i % 4;
        let folder: String = (0..depth).map(|d| format!("d{d}/")).collect();
        store.insert(format!("data/{folder}f{i:03}"), vec![b'a'; i * 37]);
    }

    let summary = archive(store, config("s3://bucket/data/", &out)).await.unwrap();
    assert_eq!(summary.objects, 50);

    let entries = read_gz(&out);
    assert_eq!(entries.len(), 50);
    for (name, data, _, _) in &entries {
        let i: usize = name.rsplit('f').next().unwrap().parse().unwrap();
        assert_eq!(data.len(), i * 37, "size of {name}");
    }
}

#[tokio::test]
async fn test_fetch_failure_persists_nothing() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.tar.gz");
    fs::write(&out, "previous archive").unwrap();

    let mut store = MemoryStore::new("bucket");
    store
        .insert("root/a", "1")
        .insert("root/sub/b", "2")
        .insert("root/sub/c", "3")
        .fail_get("root/sub/c");

    let err = archive(store, config("s3://bucket/root", &out)).await.unwrap_err();
    match err {
        BucketTarError::Level(level) => {
            assert_eq!(level.prefix, "root/sub/");
            assert!(level.to_string().contains("root/sub/c"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Destination untouched, no temporary file left behind
    assert_eq!(fs::read_to_string(&out).unwrap(), "previous archive");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_listing_failure_persists_nothing() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.tar.gz");

    let mut store = MemoryStore::new("bucket");
    store.insert("root/a", "1").fail_list("root/");

    let err = archive(store, config("s3://bucket/root", &out)).await.unwrap_err();
    assert!(matches!(err, BucketTarError::Listing(_)));
    assert!(!out.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_empty_namespace_is_valid_empty_archive() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("empty.tar.gz");

    let mut store = MemoryStore::new("bucket");
    store.insert("other/a", "1");

    let summary = archive(store, config("s3://bucket/root", &out)).await.unwrap();
    assert_eq!(summary.objects, 0);
    assert_eq!(summary.levels, 1);

    let mut tar = Vec::new();
    GzDecoder::new(File::open(&out).unwrap())
        .read_to_end(&mut tar)
        .unwrap();
    assert_eq!(tar, vec![0u8; 2 * BLOCK_LEN]);
    assert!(read_gz(&out).is_empty());
}

#[tokio::test]
async fn test_uncompressed_size_is_exact() {
    const N: usize = 12;
    const S: usize = 700;

    let dir = tempdir().unwrap();
    let out = dir.path().join("plain.tar");

    let mut store = MemoryStore::new("bucket");
    for i in 0..N {
        store.insert(format!("p/{i:02}"), vec![7u8; S]);
    }

    let mut config = config("s3://bucket/p", &out);
    config.compression = Compression::Plain;
    config.level = 0;
    let summary = archive(store, config).await.unwrap();

    let padded = S.div_ceil(BLOCK_LEN) * BLOCK_LEN;
    let expected = (N * (BLOCK_LEN + padded) + 2 * BLOCK_LEN) as u64;
    assert_eq!(summary.payload_bytes, (N * S) as u64);
    assert_eq!(summary.output_bytes, expected);
    assert_eq!(fs::metadata(&out).unwrap().len(), expected);
}

#[tokio::test]
async fn test_zstd_output() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.tar.zst");

    let mut store = MemoryStore::new("bucket");
    store.insert("z/one", "1").insert("z/two/three", "3");

    let mut config = config("s3://bucket/z", &out);
    config.compression = Compression::Zstd;
    config.level = 3;
    archive(store, config).await.unwrap();

    let decoder = zstd::stream::read::Decoder::new(File::open(&out).unwrap()).unwrap();
    let names: Vec<_> = read_entries(decoder).into_iter().map(|e| e.0).collect();
    assert_eq!(names, vec!["one", "two/three"]);
}

#[tokio::test]
async fn test_small_pages_lose_nothing() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("paged.tar.gz");

    let mut store = MemoryStore::new("bucket");
    for i in 0..25 {
        store.insert(format!("r/k{i:02}"), "v");
        store.insert(format!("r/d{i:02}/leaf"), "w");
    }

    let mut config = config("s3://bucket/r", &out);
    config.page_size = 3;
    let summary = archive(store, config).await.unwrap();
    assert_eq!(summary.objects, 50);
    assert_eq!(read_gz(&out).len(), 50);
}

#[tokio::test]
async fn test_exclude_and_max_depth() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("filtered.tar.gz");

    let mut store = MemoryStore::new("bucket");
    store
        .insert("root/keep.txt", "k")
        .insert("root/skip.log", "s")
        .insert("root/a/inner.txt", "i")
        .insert("root/a/b/too-deep.txt", "d");

    let mut config = config("s3://bucket/root", &out);
    config.max_depth = Some(1);
    config.exclude_patterns = vec![regex::Regex::new(r"\.log$").unwrap()];
    archive(store, config).await.unwrap();

    let names: Vec<_> = read_gz(&out).into_iter().map(|e| e.0).collect();
    assert_eq!(names, vec!["keep.txt", "a/inner.txt"]);
}

#[tokio::test]
async fn test_long_names_round_trip() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("long.tar.gz");

    let deep = format!("root/{}/{}.bin", "n".repeat(90), "m".repeat(60));
    let mut store = MemoryStore::new("bucket");
    store.insert(deep.clone(), "payload");

    archive(store, config("s3://bucket/root", &out)).await.unwrap();

    let entries = read_gz(&out);
    assert_eq!(entries[0].0, deep.trim_start_matches("root/"));
    assert_eq!(entries[0].1, b"payload");
}

#[tokio::test]
async fn test_local_directory_bucket() {
    let buckets = tempdir().unwrap();
    let bucket = buckets.path().join("photos");
    fs::create_dir_all(bucket.join("2024/june")).unwrap();
    fs::write(bucket.join("2024/cover.jpg"), "cover").unwrap();
    fs::write(bucket.join("2024/june/beach.jpg"), "beach").unwrap();
    fs::write(bucket.join("unrelated.txt"), "no").unwrap();

    let dir = tempdir().unwrap();
    let out = dir.path().join("photos.tar.gz");
    let mut config = config("file://photos/2024", &out);
    config.store.local_root = buckets.path().to_path_buf();

    let summary = ArchiveCoordinator::new(config).unwrap().run().await.unwrap();
    assert_eq!(summary.objects, 2);

    let entries = read_gz(&out);
    let names: Vec<_> = entries.iter().map(|e| e.0.as_str()).collect();
    assert_eq!(names, vec!["cover.jpg", "june/beach.jpg"]);
    assert_eq!(entries[1].1, b"beach");
}

#[test]
fn test_missing_local_bucket() {
    let buckets = tempdir().unwrap();
    let mut config = config("file://nope/x", &buckets.path().join("o.tar.gz"));
    config.store.local_root = buckets.path().to_path_buf();
    assert!(matches!(
        ArchiveCoordinator::new(config),
        Err(BucketTarError::Store(_))
    ));
}
