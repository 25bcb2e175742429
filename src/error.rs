//! Error types for bucket-tar
//!
//! This module defines the error hierarchy for the whole pipeline:
//! - Object-store listing and fetch errors
//! - Per-level aggregated fetch failures
//! - Archive encoding, compression and persistence errors
//! - Configuration and CLI errors
//!
//! Every error is fatal to a run. Nothing in the library retries; the
//! classification helpers exist so callers can decide for themselves.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a bucket-tar run
#[derive(Error, Debug)]
pub enum BucketTarError {
    /// A namespace level could not be listed
    #[error("Listing error: {0}")]
    Listing(#[source] StoreError),

    /// One or more objects of a level failed to fetch
    #[error("Fetch error: {0}")]
    Level(#[from] LevelError),

    /// Writing the tar stream failed
    #[error("Archive error: {0}")]
    Archive(#[source] ArchiveError),

    /// The compression stage failed
    #[error("Compression error: {0}")]
    Compression(#[source] CompressionError),

    /// The finished archive could not be saved
    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store could not be opened
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Background encoding task died
    #[error("Archive task failed: {0}")]
    Task(String),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Pull a compression or persist failure back out of a streamed I/O error
///
/// The output file and the encoder tag their own errors before they pass
/// through the tar writer, so the failing stage is reported, not the
/// entry being written when it failed.
fn stage_error(source: std::io::Error) -> std::result::Result<BucketTarError, std::io::Error> {
    let tagged = source
        .get_ref()
        .is_some_and(|e| e.is::<PersistError>() || e.is::<CompressionError>());
    if !tagged {
        return Err(source);
    }

    let kind = source.kind();
    let Some(inner) = source.into_inner() else {
        return Err(std::io::Error::from(kind));
    };
    let inner = match inner.downcast::<PersistError>() {
        Ok(e) => return Ok(BucketTarError::Persist(*e)),
        Err(other) => other,
    };
    match inner.downcast::<CompressionError>() {
        Ok(e) => Ok(stage_compression(*e)),
        Err(other) => Err(std::io::Error::new(kind, other)),
    }
}

fn stage_compression(err: CompressionError) -> BucketTarError {
    match err {
        CompressionError::Write { codec, source } => stage_error(source)
            .unwrap_or_else(|source| BucketTarError::Compression(CompressionError::Write { codec, source })),
        CompressionError::Finish { codec, source } => stage_error(source)
            .unwrap_or_else(|source| BucketTarError::Compression(CompressionError::Finish { codec, source })),
        init @ CompressionError::Init { .. } => BucketTarError::Compression(init),
    }
}

impl From<CompressionError> for BucketTarError {
    fn from(err: CompressionError) -> Self {
        stage_compression(err)
    }
}

impl From<ArchiveError> for BucketTarError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Header { name, source } => stage_error(source)
                .unwrap_or_else(|source| BucketTarError::Archive(ArchiveError::Header { name, source })),
            ArchiveError::Content { name, source } => stage_error(source)
                .unwrap_or_else(|source| BucketTarError::Archive(ArchiveError::Content { name, source })),
            ArchiveError::Finish(source) => stage_error(source)
                .unwrap_or_else(|source| BucketTarError::Archive(ArchiveError::Finish(source))),
            invalid @ ArchiveError::InvalidName { .. } => BucketTarError::Archive(invalid),
        }
    }
}

/// Object-store errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Failed to parse a bucket URL
    #[error("Invalid bucket URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Scheme has no backend compiled in
    #[error("Unsupported store scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// Failed to open or configure the store
    #[error("Failed to open bucket '{bucket}': {reason}")]
    OpenFailed { bucket: String, reason: String },

    /// A list call failed
    #[error("couldn't list bucket at path '{prefix}': {reason}")]
    ListFailed { prefix: String, reason: String },

    /// A get call failed
    #[error("failed fetch of '{key}': {reason}")]
    GetFailed { key: String, reason: String },

    /// Key does not exist
    #[error("Object not found: '{key}'")]
    NotFound { key: String },

    /// Store call exceeded its deadline
    #[error("{op} of '{target}' timed out after {secs}s")]
    Timeout {
        op: &'static str,
        target: String,
        secs: u64,
    },
}

impl StoreError {
    /// Check if a retry might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout { .. } | StoreError::ListFailed { .. } | StoreError::GetFailed { .. }
        )
    }
}

/// Failure of a single per-key fetch task
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The store reported a last-modified value that is not RFC 3339
    #[error("failed to parse time of '{key}' ({value:?}): {reason}")]
    BadTimestamp {
        key: String,
        value: String,
        reason: String,
    },

    /// Key does not lie under the walk root
    #[error("failed to find relative path for '{key}' under root '{root}'")]
    OutsideRoot { key: String, root: String },

    /// The get call failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The fetch was abandoned before it ran
    #[error("fetch of '{key}' cancelled")]
    Cancelled { key: String },

    /// The task panicked
    #[error("fetch task panicked: {message}")]
    Panicked { message: String },
}

/// Aggregated failure of one namespace level
#[derive(Error, Debug, Clone)]
#[error("fetching content of keys at '{prefix}', {} errors: {}", .failures.len(), join_failures(.failures))]
pub struct LevelError {
    /// Prefix of the failed level
    pub prefix: String,
    /// Every task failure collected before the level was abandoned
    pub failures: Vec<FetchError>,
}

impl LevelError {
    /// Number of failed fetches
    pub fn count(&self) -> usize {
        self.failures.len()
    }

    /// All failure messages joined by `,`
    pub fn joined(&self) -> String {
        join_failures(&self.failures)
    }
}

fn join_failures(failures: &[FetchError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Tar encoding errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Entry name cannot be stored in a tar header
    #[error("writing header of '{name}', {reason}")]
    InvalidName { name: String, reason: String },

    /// Header block could not be written
    #[error("writing header of '{name}', {source}")]
    Header {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Payload could not be written
    #[error("writing content of '{name}', {source}")]
    Content {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Trailing blocks could not be written
    #[error("closing tar stream, {0}")]
    Finish(#[source] std::io::Error),
}

/// Compression stage errors
#[derive(Error, Debug)]
pub enum CompressionError {
    /// Encoder could not be created
    #[error("creating {codec} encoder, {source}")]
    Init {
        codec: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Writing into the encoder failed
    #[error("writing tared objects to {codec} stream, {source}")]
    Write {
        codec: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Encoder trailer could not be written
    #[error("closing {codec} stream, {source}")]
    Finish {
        codec: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Errors saving the archive to its destination
#[derive(Error, Debug)]
pub enum PersistError {
    /// Temporary file could not be created next to the destination
    #[error("creating temporary file in '{dir}': {source}")]
    Create {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Flushing or setting permissions failed
    #[error("writing archive to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Final rename over the destination failed
    #[error("saving archive to '{path}': {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Bad bucket URL
    #[error("{0}")]
    InvalidUrl(#[from] StoreError),

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid page size
    #[error("Invalid page size {size}: must be between 1 and {max}")]
    InvalidPageSize { size: usize, max: usize },

    /// Invalid timeout
    #[error("Invalid fetch timeout {secs}s: must be at least 1")]
    InvalidTimeout { secs: u64 },

    /// Invalid compression level
    #[error("Invalid {codec} level {level}: must be between {min} and {max}")]
    InvalidLevel {
        codec: &'static str,
        level: i32,
        min: i32,
        max: i32,
    },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Result type alias for BucketTarError
pub type Result<T> = std::result::Result<T, BucketTarError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for ArchiveError
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
