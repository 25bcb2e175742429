//! In-memory object store
//!
//! Keys are kept sorted, so listings come back in the same lexicographic
//! order S3 uses. Individual keys or prefixes can be made to fail or to
//! stall, and the store records how many gets ran at once.

use crate::error::{StoreError, StoreResult};
use crate::store::{paginate, ListPage, Listed, ObjectStore, ObjectSummary};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DEFAULT_LAST_MODIFIED: &str = "2024-01-01T00:00:00.000Z";

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    last_modified: String,
}

/// Object store backed by a sorted map
#[derive(Debug, Default)]
pub struct MemoryStore {
    bucket: String,
    objects: BTreeMap<String, MemoryObject>,
    failing_gets: HashSet<String>,
    failing_lists: HashSet<String>,
    get_delays: HashMap<String, Duration>,
    gets: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Add an object with a fixed last-modified time
    pub fn insert(&mut self, key: impl Into<String>, data: impl Into<Bytes>) -> &mut Self {
        self.insert_with_time(key, data, DEFAULT_LAST_MODIFIED)
    }

    /// Add an object with an explicit last-modified string
    pub fn insert_with_time(
        &mut self,
        key: impl Into<String>,
        data: impl Into<Bytes>,
        last_modified: impl Into<String>,
    ) -> &mut Self {
        self.objects.insert(
            key.into(),
            MemoryObject {
                data: data.into(),
                last_modified: last_modified.into(),
            },
        );
        self
    }

    /// Make every get of `key` fail
    pub fn fail_get(&mut self, key: impl Into<String>) -> &mut Self {
        self.failing_gets.insert(key.into());
        self
    }

    /// Make every list of exactly `prefix` fail
    pub fn fail_list(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.failing_lists.insert(prefix.into());
        self
    }

    /// Delay every get of `key`
    pub fn delay_get(&mut self, key: impl Into<String>, delay: Duration) -> &mut Self {
        self.get_delays.insert(key.into(), delay);
        self
    }

    /// Number of gets started
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Highest number of gets observed running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Group sorted keys under `prefix` by `delimiter`
    fn grouped(&self, prefix: &str, delimiter: Option<&str>) -> Vec<Listed> {
        let mut items: Vec<Listed> = Vec::new();

        let under_prefix = self
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix));

        for (key, obj) in under_prefix {
            let rest = &key[prefix.len()..];
            let common = delimiter
                .filter(|d| !d.is_empty())
                .and_then(|d| rest.find(d).map(|i| &key[..prefix.len() + i + d.len()]));

            match common {
                Some(common) => {
                    let seen = matches!(items.last(), Some(Listed::Prefix(p)) if p == common);
                    if !seen {
                        items.push(Listed::Prefix(common.to_string()));
                    }
                }
                None => items.push(Listed::Object(ObjectSummary {
                    key: key.clone(),
                    last_modified: obj.last_modified.clone(),
                    size: obj.data.len() as u64,
                })),
            }
        }

        items
    }
}

/// Decrements the in-flight counter when a get finishes or is cancelled
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
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
        if self.failing_lists.contains(prefix) {
            return Err(StoreError::ListFailed {
                prefix: prefix.to_string(),
                reason: "injected list failure".to_string(),
            });
        }
        Ok(paginate(self.grouped(prefix, delimiter), marker, max_keys))
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match self.get_delays.get(key) {
            Some(delay) => tokio::time::sleep(*delay).await,
            // Yield so sibling fetches overlap
            None => tokio::task::yield_now().await,
        }

        if self.failing_gets.contains(key) {
            return Err(StoreError::GetFailed {
                key: key.to_string(),
                reason: "injected get failure".to_string(),
            });
        }

        self.objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }
}
