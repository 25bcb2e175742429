//! Recursive level-by-level walk of a bucket prefix
//!
//! Each step lists one prefix (following continuation markers until the
//! listing is complete), fetches its leaf keys through a `LevelFetcher`
//! and queues its child prefixes. Levels come out depth-first, pre-order:
//! a prefix's own objects first, then each child subtree in listing order.

use crate::archive::FetchedObject;
use crate::config::ArchiveConfig;
use crate::error::{BucketTarError, Result, StoreError};
use crate::store::{with_deadline, ObjectStore, ObjectSummary, DELIMITER};
use crate::walker::level::LevelFetcher;
use humansize::{format_size, BINARY};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Instrument};

/// Walk limits and filters
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Keys requested per list call
    pub page_size: usize,
    /// Deepest prefix level to descend into (root is 0)
    pub max_depth: Option<usize>,
    /// Keys and prefixes matching any of these are skipped
    pub exclude: Vec<Regex>,
    /// Deadline for each store call
    pub deadline: Duration,
}

impl WalkOptions {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_depth: config.max_depth,
            exclude: config.exclude_patterns.clone(),
            deadline: config.fetch_timeout,
        }
    }

    fn is_excluded(&self, key: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(key))
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_depth: None,
            exclude: Vec::new(),
            deadline: Duration::from_secs(60),
        }
    }
}

/// A prefix waiting to be walked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTask {
    pub prefix: String,
    pub depth: usize,
}

/// Complete delimited listing of one prefix
#[derive(Debug, Clone, Default)]
pub struct NamespaceLevel {
    pub leaf_keys: Vec<ObjectSummary>,
    pub child_prefixes: Vec<String>,
}

/// List everything directly under `prefix`, following continuation markers
pub async fn list_level(
    store: &dyn ObjectStore,
    prefix: &str,
    page_size: usize,
    deadline: Duration,
) -> std::result::Result<NamespaceLevel, StoreError> {
    let mut level = NamespaceLevel::default();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = with_deadline(
            "list",
            prefix,
            deadline,
            store.list(prefix, Some(DELIMITER), marker.as_deref(), page_size),
        )
        .await?;
        pages += 1;

        level.leaf_keys.extend(page.objects);
        level.child_prefixes.extend(page.common_prefixes);

        if !page.truncated {
            break;
        }
        match page.next_marker {
            Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
            // A truncated page without a fresh marker would loop forever
            _ => {
                return Err(StoreError::ListFailed {
                    prefix: prefix.to_string(),
                    reason: "truncated listing without continuation marker".to_string(),
                })
            }
        }
    }

    if pages > 1 {
        debug!(prefix = %prefix, pages, "Listing spanned multiple pages");
    }
    Ok(level)
}

/// One fetched level of the namespace
#[derive(Debug)]
pub struct Level {
    pub prefix: String,
    pub depth: usize,
    /// Fetched leaves, sorted by name
    pub objects: Vec<FetchedObject>,
    /// Child prefixes that will be walked
    pub child_prefixes: Vec<String>,
}

impl Level {
    /// Total payload bytes of the level
    pub fn bytes(&self) -> u64 {
        self.objects.iter().map(FetchedObject::size).sum()
    }
}

/// Depth-first walker over a bucket prefix
pub struct PathWalker {
    store: Arc<dyn ObjectStore>,
    fetcher: LevelFetcher,
    root: String,
    options: WalkOptions,
    pending: Vec<PrefixTask>,
}

impl PathWalker {
    /// `root` should be a normalized walk root (see `BucketUrl::walk_root`)
    pub fn new(
        store: Arc<dyn ObjectStore>,
        root: impl Into<String>,
        workers: usize,
        options: WalkOptions,
    ) -> Self {
        let root = root.into();
        let fetcher = LevelFetcher::new(Arc::clone(&store), workers, options.deadline);
        Self {
            store,
            fetcher,
            pending: vec![PrefixTask {
                prefix: root.clone(),
                depth: 0,
            }],
            root,
            options,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Prefixes queued but not yet walked
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Walk the next prefix; `None` once the namespace is exhausted
    pub async fn next_level(&mut self) -> Result<Option<Level>> {
        let Some(task) = self.pending.pop() else {
            return Ok(None);
        };

        let span = tracing::info_span!("level", prefix = %task.prefix, depth = task.depth);
        let level = self.walk_prefix(task).instrument(span).await?;
        Ok(Some(level))
    }

    /// Walk the whole namespace and return every object in archive order
    pub async fn walk(mut self) -> Result<Vec<FetchedObject>> {
        let mut all = Vec::new();
        while let Some(level) = self.next_level().await? {
            all.extend(level.objects);
        }
        Ok(all)
    }

    async fn walk_prefix(&mut self, task: PrefixTask) -> Result<Level> {
        let listed = list_level(
            self.store.as_ref(),
            &task.prefix,
            self.options.page_size,
            self.options.deadline,
        )
        .await
        .map_err(BucketTarError::Listing)?;

        let mut keys = Vec::with_capacity(listed.leaf_keys.len());
        let mut total_size = 0u64;
        for summary in listed.leaf_keys {
            if summary.is_directory_marker() {
                debug!(key = %summary.key, "Skipping directory marker");
                continue;
            }
            if self.options.is_excluded(&summary.key) {
                debug!(key = %summary.key, "Excluded");
                continue;
            }
            debug!(key = %summary.key, size = %format_size(summary.size, BINARY), "Listed key");
            total_size += summary.size;
            keys.push(summary);
        }

        let child_depth = task.depth + 1;
        let descend = self.options.max_depth.map_or(true, |max| child_depth <= max);
        let mut children = Vec::with_capacity(listed.child_prefixes.len());
        for prefix in listed.child_prefixes {
            if !descend {
                debug!(prefix = %prefix, max_depth = ?self.options.max_depth, "Not descending, max depth reached");
                continue;
            }
            if self.options.is_excluded(&prefix) {
                debug!(prefix = %prefix, "Excluded");
                continue;
            }
            children.push(prefix);
        }

        info!(
            keys = keys.len(),
            total = %format_size(total_size, BINARY),
            folders = children.len(),
            "Listed level"
        );

        let objects = self.fetcher.fetch_all(&self.root, &task.prefix, keys).await?;

        // Reverse so the first child is popped next
        for prefix in children.iter().rev() {
            self.pending.push(PrefixTask {
                prefix: prefix.clone(),
                depth: child_depth,
            });
        }

        Ok(Level {
            prefix: task.prefix,
            depth: task.depth,
            objects,
            child_prefixes: children,
        })
    }
}
