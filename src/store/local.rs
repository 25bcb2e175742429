//! Directory-backed object store (`file://` buckets)
//!
//! Keys are paths relative to the bucket directory, joined with `/`.
//! Delimited listings read a single directory; undelimited listings walk
//! the whole subtree. Filesystem calls run on the blocking pool.

use crate::error::{StoreError, StoreResult};
use crate::store::{paginate, ListPage, Listed, ObjectStore, ObjectSummary, DELIMITER};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Object store over a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    bucket: String,
}

impl LocalStore {
    /// Open a bucket directory; it must exist
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let bucket = root.display().to_string();

        if !root.is_dir() {
            return Err(StoreError::OpenFailed {
                bucket,
                reason: "not a directory".to_string(),
            });
        }

        debug!(root = %root.display(), "Opened local bucket");
        Ok(Self { root, bucket })
    }

    /// Directory a key lives in
    fn key_path(&self, key: &str) -> PathBuf {
        key.split(DELIMITER)
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn list_sync(&self, prefix: &str, delimiter: Option<&str>) -> io::Result<Vec<Listed>> {
        // "a/b/ca" lists directory a/b and keeps names starting with "ca"
        let (dir_key, name_start) = match prefix.rfind(DELIMITER) {
            Some(i) => (&prefix[..=i], &prefix[i + 1..]),
            None => ("", prefix),
        };
        let dir = self.key_path(dir_key);
        let mut items = Vec::new();

        if !dir.is_dir() {
            return Ok(items);
        }

        match delimiter {
            Some(DELIMITER) => {
                for entry in read_dir_sorted(&dir)? {
                    let (name, path) = entry;
                    if !name.starts_with(name_start) {
                        continue;
                    }
                    let key = format!("{dir_key}{name}");
                    if path.is_dir() {
                        items.push(Listed::Prefix(format!("{key}{DELIMITER}")));
                    } else if path.is_file() {
                        items.push(Listed::Object(summarize(key, &path)?));
                    }
                }
            }
            None => {
                let mut objects = Vec::new();
                collect_files(&dir, dir_key, &mut objects)?;
                objects.retain(|o| o.key.starts_with(prefix));
                objects.sort_by(|a, b| a.key.cmp(&b.key));
                items.extend(objects.into_iter().map(Listed::Object));
            }
            Some(other) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("delimiter {other:?} not supported by local store"),
                ))
            }
        }

        // Prefixes and keys interleave by full name, as S3 returns them
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }
}

fn read_dir_sorted(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Keys must be valid UTF-8
        if let Ok(name) = entry.file_name().into_string() {
            entries.push((name, entry.path()));
        }
    }
    entries.sort();
    Ok(entries)
}

fn collect_files(dir: &Path, key_prefix: &str, out: &mut Vec<ObjectSummary>) -> io::Result<()> {
    for (name, path) in read_dir_sorted(dir)? {
        let key = format!("{key_prefix}{name}");
        if path.is_dir() {
            collect_files(&path, &format!("{key}{DELIMITER}"), out)?;
        } else if path.is_file() {
            out.push(summarize(key, &path)?);
        }
    }
    Ok(())
}

fn summarize(key: String, path: &Path) -> io::Result<ObjectSummary> {
    let meta = fs::metadata(path)?;
    let modified: DateTime<Utc> = meta.modified()?.into();
    Ok(ObjectSummary {
        key,
        last_modified: modified.to_rfc3339_opts(SecondsFormat::Millis, true),
        size: meta.len(),
    })
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage> {
        let store = self.clone();
        let owned_prefix = prefix.to_string();
        let delimiter = delimiter.map(str::to_string);

        let items = tokio::task::spawn_blocking(move || {
            store.list_sync(&owned_prefix, delimiter.as_deref())
        })
        .await
        .map_err(|e| StoreError::ListFailed {
            prefix: prefix.to_string(),
            reason: e.to_string(),
        })?
        .map_err(|e| StoreError::ListFailed {
            prefix: prefix.to_string(),
            reason: e.to_string(),
        })?;

        Ok(paginate(items, marker, max_keys))
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let path = self.key_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::GetFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
