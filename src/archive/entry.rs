//! Fetched objects and the tar header metadata derived from them

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

/// Permission bits given to every archive entry (`rw-r--r--`)
pub const DEFAULT_MODE: u32 = 0o644;

/// One object pulled from the store, ready to be archived
#[derive(Clone, PartialEq, Eq)]
pub struct FetchedObject {
    /// Path relative to the walk root, `/`-separated, never empty
    pub name: String,
    /// Full payload
    pub data: Bytes,
    /// Last-modified time reported by the store
    pub last_modified: DateTime<Utc>,
}

impl FetchedObject {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            last_modified,
        }
    }

    /// Payload length in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Derive the header metadata for this object
    ///
    /// `accessed` is normally "now"; it is a parameter so callers can
    /// produce reproducible headers.
    pub fn metadata(&self, accessed: DateTime<Utc>, owner: Owner) -> EntryMetadata {
        EntryMetadata {
            name: self.name.clone(),
            size: self.size(),
            mode: DEFAULT_MODE,
            modified: self.last_modified,
            accessed,
            changed: self.last_modified,
            owner,
        }
    }
}

impl fmt::Debug for FetchedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads can be huge; show the size only
        f.debug_struct("FetchedObject")
            .field("name", &self.name)
            .field("size", &self.data.len())
            .field("last_modified", &self.last_modified)
            .finish()
    }
}

/// Numeric owner ids written into archive headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Owner {
    pub uid: u64,
    pub gid: u64,
}

impl Owner {
    /// Effective uid/gid of the running process
    #[cfg(unix)]
    pub fn current() -> Self {
        // SAFETY: geteuid/getegid cannot fail and touch no memory
        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
        Self {
            uid: u64::from(uid),
            gid: u64::from(gid),
        }
    }

    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self::default()
    }
}

/// Header fields of one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub changed: DateTime<Utc>,
    pub owner: Owner,
}

impl EntryMetadata {
    /// Build a GNU tar header (GNU so atime/ctime have fields)
    ///
    /// The path is not set here; the writer sets it so long names get the
    /// GNU long-name record.
    pub fn to_header(&self) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(self.size);
        header.set_mode(self.mode);
        header.set_mtime(unix_secs(self.modified));
        header.set_uid(self.owner.uid);
        header.set_gid(self.owner.gid);
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.set_atime(unix_secs(self.accessed));
            gnu.set_ctime(unix_secs(self.changed));
        }
        header
    }
}

/// Tar timestamps are unsigned seconds; pre-epoch times clamp to zero
fn unix_secs(t: DateTime<Utc>) -> u64 {
    u64::try_from(t.timestamp()).unwrap_or(0)
}
