//! Bucket walker
//!
//! Walks a bucket prefix level by level. Each level's leaf keys are
//! fetched concurrently; the coordinator streams finished levels into
//! the archive pipeline.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │   ArchiveCoordinator    │
//!                     │  - PathWalker (DFS)     │
//!                     │  - paged LIST per level │
//!                     └───────────┬─────────────┘
//!                                 │ LevelFetcher (semaphore)
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  Fetch 1  │             │  Fetch 2  │             │  Fetch N  │
//! │    GET    │             │    GET    │             │    GET    │
//! └───────────┘             └───────────┘             └───────────┘
//!                                 │ sorted by name
//!                                 ▼
//!                   tar ──▶ compressor ──▶ temp file ──▶ rename
//! ```

pub mod coordinator;
pub mod level;
pub mod path_walker;

pub use coordinator::{ArchiveCoordinator, ArchiveProgress, ArchiveSummary};
pub use level::{fetch_one, relative_name, LevelFetcher};
pub use path_walker::{list_level, Level, NamespaceLevel, PathWalker, PrefixTask, WalkOptions};
