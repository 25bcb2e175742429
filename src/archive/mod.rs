//! Archive encoding
//!
//! ```text
//! FetchedObject ──► ArchiveWriter (tar) ──► Encoder (gzip/zstd/none) ──► OutputFile
//!                                                                     (temp file, renamed
//!                                                                      on success only)
//! ```

pub mod compress;
pub mod entry;
pub mod output;
pub mod writer;

pub use compress::{compress, Compression, Encoder};
pub use entry::{EntryMetadata, FetchedObject, Owner, DEFAULT_MODE};
pub use output::OutputFile;
pub use writer::{block_padding, write_archive, ArchiveWriter, CountingSink, BLOCK_LEN};
