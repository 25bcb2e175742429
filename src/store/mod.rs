//! Object-store access
//!
//! The walker only needs two calls from a store: a delimited, paged
//! `list` and a whole-object `get`. Backends:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 dyn ObjectStore                      │
//! │   list(prefix, delimiter, marker, max_keys)          │
//! │   get(key)                                           │
//! └───────┬──────────────────┬──────────────────┬────────┘
//!         │                  │                  │
//!   ┌─────▼─────┐      ┌─────▼─────┐      ┌─────▼─────┐
//!   │  S3Store  │      │LocalStore │      │MemoryStore│
//!   │ (rust-s3) │      │ file://   │      │  tests    │
//!   └───────────┘      └───────────┘      └───────────┘
//! ```
//!
//! Stores must be safe to share between concurrent fetch tasks.

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use crate::config::{BucketUrl, Scheme};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use local::LocalStore;
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

/// Delimiter that turns key prefixes into "directories"
pub const DELIMITER: &str = "/";

/// One key as reported by a list call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Fully-qualified key
    pub key: String,
    /// Last-modified time as sent by the store (RFC 3339)
    pub last_modified: String,
    /// Size reported by the listing
    pub size: u64,
}

impl ObjectSummary {
    /// Zero-length "folder" objects created by consoles and sync tools
    pub fn is_directory_marker(&self) -> bool {
        self.key.ends_with(DELIMITER) && self.size == 0
    }
}

/// One page of a list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Leaf keys
    pub objects: Vec<ObjectSummary>,
    /// Grouped sub-prefixes, each ending in the delimiter
    pub common_prefixes: Vec<String>,
    /// More results exist past this page
    pub truncated: bool,
    /// Marker to pass to get the next page
    pub next_marker: Option<String>,
}

/// Client for a single bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket name for logs
    fn bucket(&self) -> &str;

    /// List keys under `prefix`, grouping deeper keys by `delimiter`
    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage>;

    /// Fetch the full content of one key
    async fn get(&self, key: &str) -> StoreResult<Bytes>;
}

/// Backend settings that don't come from the URL
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Directory holding `file://` buckets
    pub local_root: PathBuf,
    /// S3 region name
    pub region: String,
    /// Custom S3-compatible endpoint
    pub endpoint: Option<String>,
    /// Access key; environment/profile credentials when absent
    pub access_key: Option<String>,
    /// Secret key
    pub secret_key: Option<String>,
    /// Use path-style bucket addressing
    pub path_style: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from("."),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

/// Open the backend for a parsed bucket URL
pub fn open_store(url: &BucketUrl, options: &StoreOptions) -> StoreResult<Arc<dyn ObjectStore>> {
    match url.scheme {
        Scheme::File => Ok(Arc::new(LocalStore::open(
            options.local_root.join(&url.bucket),
        )?)),
        #[cfg(feature = "s3")]
        Scheme::S3 => Ok(Arc::new(S3Store::open(&url.bucket, options)?)),
        #[cfg(not(feature = "s3"))]
        Scheme::S3 => Err(StoreError::UnsupportedScheme {
            scheme: "s3".to_string(),
        }),
    }
}

/// Run a store call under a deadline
pub async fn with_deadline<T, F>(
    op: &'static str,
    target: &str,
    deadline: Duration,
    call: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            op,
            target: target.to_string(),
            secs: deadline.as_secs(),
        }),
    }
}

/// Entry of a sorted, already-grouped listing
#[derive(Debug, Clone)]
pub(crate) enum Listed {
    Object(ObjectSummary),
    Prefix(String),
}

impl Listed {
    fn name(&self) -> &str {
        match self {
            Listed::Object(o) => &o.key,
            Listed::Prefix(p) => p,
        }
    }
}

/// Apply marker and page size to a sorted listing
///
/// The marker is the last key or prefix of the previous page.
pub(crate) fn paginate<I>(items: I, marker: Option<&str>, max_keys: usize) -> ListPage
where
    I: IntoIterator<Item = Listed>,
{
    let mut page = ListPage::default();
    let mut count = 0usize;
    let max_keys = max_keys.max(1);

    for item in items {
        if let Some(m) = marker {
            if item.name() <= m {
                continue;
            }
        }
        if count == max_keys {
            page.truncated = true;
            break;
        }
        page.next_marker = Some(item.name().to_string());
        match item {
            Listed::Object(o) => page.objects.push(o),
            Listed::Prefix(p) => page.common_prefixes.push(p),
        }
        count += 1;
    }

    if !page.truncated {
        page.next_marker = None;
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(key: &str) -> Listed {
        Listed::Object(ObjectSummary {
            key: key.to_string(),
            last_modified: "2020-01-01T00:00:00Z".to_string(),
            size: 1,
        })
    }

    #[test]
    fn test_paginate_single_page() {
        let page = paginate(vec![obj("a"), Listed::Prefix("b/".into())], None, 10);
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.common_prefixes, vec!["b/".to_string()]);
        assert!(!page.truncated);
        assert_eq!(page.next_marker, None);
    }

    #[test]
    fn test_paginate_pages_cover_everything() {
        let items = || vec![obj("a"), obj("b"), Listed::Prefix("c/".into()), obj("d")];

        let first = paginate(items(), None, 2);
        assert!(first.truncated);
        assert_eq!(first.next_marker.as_deref(), Some("b"));

        let second = paginate(items(), first.next_marker.as_deref(), 2);
        assert!(!second.truncated);
        assert_eq!(second.common_prefixes, vec!["c/".to_string()]);
        assert_eq!(second.objects[0].key, "d");
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let page = paginate(vec![obj("a"), obj("b")], None, 2);
        assert!(!page.truncated);
    }

    #[test]
    fn test_directory_marker() {
        let marker = ObjectSummary {
            key: "photos/".into(),
            last_modified: String::new(),
            size: 0,
        };
        assert!(marker.is_directory_marker());

        let file = ObjectSummary {
            key: "photos/a.jpg".into(),
            last_modified: String::new(),
            size: 0,
        };
        assert!(!file.is_directory_marker());
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        };
        let err = with_deadline("get", "k", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout { op: "get", .. }));
    }
}
