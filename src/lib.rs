//! bucket-tar - Archive an object-store prefix into one compressed tarball
//!
//! Walks everything under a bucket prefix, fetches the objects and writes
//! them as a single gzip (or zstd) compressed tar archive. The archive is
//! all-or-nothing: any listing, fetch or encoding failure leaves the
//! destination untouched.
//!
//! # Features
//!
//! - **Level-by-level walk**: each prefix is listed with the `/`
//!   delimiter, paging through truncated listings.
//!
//! - **Bounded concurrency**: leaf keys of a level are fetched in
//!   parallel, capped by a semaphore, each call under a deadline.
//!
//! - **Deterministic output**: entries of a level are sorted by name, and
//!   levels are emitted depth-first.
//!
//! - **Streaming**: levels flow through tar encoding and compression into
//!   a temporary file that is renamed into place only on success.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Object store (S3 / local dir)                    │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ LIST (delimited, paged) + GET
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       PathWalker                                 │
//! │   prefix stack (DFS) ──▶ LevelFetcher ──▶ sorted FetchedObjects  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ one level at a time
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   ArchiveWriter (tar) ──▶ Encoder (gzip/zstd) ──▶ OutputFile     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ atomic rename
//!                               ▼
//!                    ┌──────────────────┐
//!                    │  bucket.tar.gz   │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Archive a prefix
//! bucket-tar s3://my-bucket/logs/2024 -o logs-2024.tar.gz
//!
//! # Local directory as a bucket, zstd, 32 concurrent fetches
//! bucket-tar file://data/exports -c zstd -w 32 -o exports.tar.zst
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod progress;
pub mod store;
pub mod walker;

pub use archive::{ArchiveWriter, Compression, FetchedObject};
pub use config::{ArchiveConfig, BucketUrl, CliArgs};
pub use error::{BucketTarError, Result};
pub use store::{ObjectStore, StoreOptions};
pub use walker::{ArchiveCoordinator, ArchiveSummary, PathWalker};
