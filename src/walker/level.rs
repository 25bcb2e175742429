//! Concurrent fetch of one namespace level
//!
//! Every leaf key of a level gets its own task on a `JoinSet`; a shared
//! semaphore caps how many run at once. The level succeeds only if every
//! task succeeds. On the first failure the remaining tasks are aborted,
//! and the failures gathered so far are reported together.

use crate::archive::FetchedObject;
use crate::error::{FetchError, LevelError};
use crate::store::{with_deadline, ObjectStore, ObjectSummary, DELIMITER};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

/// Name of `key` relative to the walk root
///
/// The root is treated as a directory, so `root` and `root/` give the
/// same result. An empty root is the bucket itself.
pub fn relative_name(root: &str, key: &str) -> Result<String, FetchError> {
    let outside = || FetchError::OutsideRoot {
        key: key.to_string(),
        root: root.to_string(),
    };

    let rest = if root.is_empty() {
        key
    } else {
        let dir = root.trim_end_matches(DELIMITER);
        key.strip_prefix(dir)
            .and_then(|r| r.strip_prefix(DELIMITER))
            .ok_or_else(outside)?
    };

    if rest.is_empty() {
        return Err(outside());
    }
    Ok(rest.to_string())
}

/// Parse the store's RFC 3339 last-modified value
pub fn parse_last_modified(summary: &ObjectSummary) -> Result<DateTime<Utc>, FetchError> {
    DateTime::parse_from_rfc3339(&summary.last_modified)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FetchError::BadTimestamp {
            key: summary.key.clone(),
            value: summary.last_modified.clone(),
            reason: e.to_string(),
        })
}

/// Fetch one key and turn it into a `FetchedObject`
pub async fn fetch_one(
    store: &dyn ObjectStore,
    root: &str,
    summary: &ObjectSummary,
    deadline: Duration,
) -> Result<FetchedObject, FetchError> {
    let last_modified = parse_last_modified(summary)?;
    let name = relative_name(root, &summary.key)?;

    let start = Instant::now();
    let data = with_deadline("get", &summary.key, deadline, store.get(&summary.key)).await?;

    debug!(elapsed = ?start.elapsed(), name = %name, key = %summary.key, "Fetched object");

    Ok(FetchedObject {
        name,
        data,
        last_modified,
    })
}

/// Fetches all leaves of a level concurrently
#[derive(Clone)]
pub struct LevelFetcher {
    store: Arc<dyn ObjectStore>,
    limiter: Arc<Semaphore>,
    deadline: Duration,
}

impl LevelFetcher {
    /// `max_concurrent` caps in-flight gets; `deadline` bounds each get
    pub fn new(store: Arc<dyn ObjectStore>, max_concurrent: usize, deadline: Duration) -> Self {
        Self {
            store,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            deadline,
        }
    }

    /// Fetch every key of the level under `prefix`
    ///
    /// Objects come back sorted by name, so the output does not depend
    /// on which fetch finished first.
    pub async fn fetch_all(
        &self,
        root: &str,
        prefix: &str,
        keys: Vec<ObjectSummary>,
    ) -> Result<Vec<FetchedObject>, LevelError> {
        let total = keys.len();
        let mut tasks = JoinSet::new();

        for summary in keys {
            let store = Arc::clone(&self.store);
            let limiter = Arc::clone(&self.limiter);
            let root = root.to_string();
            let deadline = self.deadline;
            let span = tracing::debug_span!("fetch", key = %summary.key);

            tasks.spawn(
                async move {
                    let Ok(_permit) = limiter.acquire_owned().await else {
                        return Err(FetchError::Cancelled { key: summary.key });
                    };
                    fetch_one(store.as_ref(), &root, &summary, deadline).await
                }
                .instrument(span),
            );
        }

        let mut fetched = Vec::with_capacity(total);
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(object)) => fetched.push(object),
                Ok(Err(e)) => {
                    if failures.is_empty() {
                        warn!(prefix = %prefix, error = %e, "Fetch failed, cancelling rest of level");
                        tasks.abort_all();
                    }
                    failures.push(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tasks.abort_all();
                    failures.push(FetchError::Panicked {
                        message: e.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(LevelError {
                prefix: prefix.to_string(),
                failures,
            });
        }

        fetched.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fetched)
    }
}
