//! S3 backend using rust-s3
//!
//! Credentials come from the options when both keys are given, otherwise
//! from the usual environment / profile chain.

use crate::error::{StoreError, StoreResult};
use crate::store::{ListPage, ObjectStore, ObjectSummary, StoreOptions};
use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::debug;

/// Client for one S3 bucket
pub struct S3Store {
    bucket: Box<Bucket>,
    name: String,
}

impl S3Store {
    /// Build a client; no request is made until the first list or get
    pub fn open(name: &str, options: &StoreOptions) -> StoreResult<Self> {
        let open_failed = |reason: String| StoreError::OpenFailed {
            bucket: name.to_string(),
            reason,
        };

        let region = match &options.endpoint {
            Some(endpoint) => Region::Custom {
                region: options.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => options
                .region
                .parse::<Region>()
                .map_err(|e| open_failed(format!("invalid region '{}': {e}", options.region)))?,
        };

        let credentials = match (&options.access_key, &options.secret_key) {
            (Some(access), Some(secret)) => {
                Credentials::new(Some(access.as_str()), Some(secret.as_str()), None, None, None)
            }
            _ => Credentials::default(),
        }
        .map_err(|e| open_failed(format!("credentials: {e}")))?;

        let mut bucket = Bucket::new(name, region, credentials)
            .map_err(|e| open_failed(e.to_string()))?;
        if options.path_style {
            bucket = bucket.with_path_style();
        }

        debug!(bucket = name, region = %options.region, path_style = options.path_style, "Opened S3 bucket");

        Ok(Self {
            bucket,
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage> {
        let (result, _status) = self
            .bucket
            .list_page(
                prefix.to_string(),
                delimiter.map(str::to_string),
                marker.map(str::to_string),
                None,
                Some(max_keys),
            )
            .await
            .map_err(|e| StoreError::ListFailed {
                prefix: prefix.to_string(),
                reason: e.to_string(),
            })?;

        let objects = result
            .contents
            .into_iter()
            .map(|o| ObjectSummary {
                key: o.key,
                last_modified: o.last_modified,
                size: o.size,
            })
            .collect();

        let common_prefixes = result
            .common_prefixes
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.prefix)
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            truncated: result.is_truncated,
            next_marker: result.next_continuation_token,
        })
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| StoreError::GetFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        match response.status_code() {
            200..=299 => Ok(response.bytes().clone()),
            404 => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            code => Err(StoreError::GetFailed {
                key: key.to_string(),
                reason: format!("HTTP {code}"),
            }),
        }
    }
}
