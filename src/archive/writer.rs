//! Tar stream writer
//!
//! Entries are written as GNU tar records: a 512-byte header block, the
//! payload, then zero padding up to the next block boundary. Names longer
//! than the 100-byte header field are preceded by a `././@LongLink`
//! record. Closing the writer appends the two all-zero terminator blocks.
//!
//! The writer does not buffer: every byte goes straight to the inner
//! writer, which is usually a compressor.

use crate::archive::entry::{FetchedObject, Owner};
use crate::error::{ArchiveError, ArchiveResult};
use chrono::Utc;
use std::io::{self, Write};
use tracing::trace;

/// Tar block size
pub const BLOCK_LEN: usize = 512;

/// Longest name that fits in the header name field
const NAME_FIELD_LEN: usize = 100;

const LONG_LINK_NAME: &[u8] = b"././@LongLink";

/// Zero-padding needed after `len` bytes to reach a block boundary
pub fn block_padding(len: u64) -> usize {
    let rem = (len % BLOCK_LEN as u64) as usize;
    if rem == 0 {
        0
    } else {
        BLOCK_LEN - rem
    }
}

/// Streaming tar encoder over any writer
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<W>,
    owner: Owner,
    entries: u64,
    payload_bytes: u64,
    archive_bytes: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer that stamps headers with the process owner ids
    pub fn new(inner: W) -> Self {
        Self::with_owner(inner, Owner::current())
    }

    pub fn with_owner(inner: W, owner: Owner) -> Self {
        Self {
            builder: tar::Builder::new(inner),
            owner,
            entries: 0,
            payload_bytes: 0,
            archive_bytes: 0,
        }
    }

    /// Number of entries written so far
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of raw payload lengths written so far
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Tar bytes written so far, excluding the terminator
    pub fn archive_bytes(&self) -> u64 {
        self.archive_bytes
    }

    /// Append one object as a regular-file entry
    pub fn append(&mut self, object: &FetchedObject) -> ArchiveResult<()> {
        validate_name(&object.name)?;

        let header_bytes = self.write_header(object)?;
        let content_bytes = self.write_content(object)?;

        self.entries += 1;
        self.payload_bytes += object.size();
        self.archive_bytes += header_bytes + content_bytes;

        trace!(name = %object.name, size = object.size(), "appended entry");
        Ok(())
    }

    /// Append every object in order
    pub fn append_all<'a, I>(&mut self, objects: I) -> ArchiveResult<()>
    where
        I: IntoIterator<Item = &'a FetchedObject>,
    {
        for object in objects {
            self.append(object)?;
        }
        Ok(())
    }

    /// Write the terminator blocks and hand back the inner writer
    pub fn finish(self) -> ArchiveResult<W> {
        self.builder.into_inner().map_err(ArchiveError::Finish)
    }

    fn write_header(&mut self, object: &FetchedObject) -> ArchiveResult<u64> {
        let name = object.name.as_bytes();
        let mut header = object.metadata(Utc::now(), self.owner).to_header();
        let mut written = 0u64;

        if name.len() > NAME_FIELD_LEN {
            written += self.write_long_name(&object.name)?;
        }

        // Copied verbatim so `//` and `.` segments survive
        let field = &name[..name.len().min(NAME_FIELD_LEN)];
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.name[..field.len()].copy_from_slice(field);
        }
        header.set_cksum();

        self.builder
            .get_mut()
            .write_all(header.as_bytes())
            .map_err(|source| ArchiveError::Header {
                name: object.name.clone(),
                source,
            })?;

        Ok(written + BLOCK_LEN as u64)
    }

    /// GNU long-name record carrying the full name plus a NUL
    fn write_long_name(&mut self, name: &str) -> ArchiveResult<u64> {
        let mut data = Vec::with_capacity(name.len() + 1);
        data.extend_from_slice(name.as_bytes());
        data.push(0);

        let mut long = tar::Header::new_gnu();
        if let Some(gnu) = long.as_gnu_mut() {
            gnu.name[..LONG_LINK_NAME.len()].copy_from_slice(LONG_LINK_NAME);
        }
        long.set_entry_type(tar::EntryType::GNULongName);
        long.set_mode(0o644);
        long.set_uid(0);
        long.set_gid(0);
        long.set_mtime(0);
        long.set_size(data.len() as u64);
        long.set_cksum();

        self.builder
            .append(&long, data.as_slice())
            .map_err(|source| ArchiveError::Header {
                name: name.to_string(),
                source,
            })?;

        let len = data.len() as u64;
        Ok(BLOCK_LEN as u64 + len + block_padding(len) as u64)
    }

    fn write_content(&mut self, object: &FetchedObject) -> ArchiveResult<u64> {
        let size = object.size();
        let pad = block_padding(size);
        let out = self.builder.get_mut();

        let result = out
            .write_all(&object.data)
            .and_then(|()| out.write_all(&[0u8; BLOCK_LEN][..pad]));

        result.map_err(|source| ArchiveError::Content {
            name: object.name.clone(),
            source,
        })?;

        Ok(size + pad as u64)
    }
}

/// Reject names that cannot be extracted safely
fn validate_name(name: &str) -> ArchiveResult<()> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name.starts_with('/') {
        Some("absolute path")
    } else if name.contains('\0') {
        Some("name contains NUL")
    } else if name.split('/').any(|part| part == "..") {
        Some("name contains '..'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ArchiveError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Write every entry and close the tar stream
pub fn write_archive<'a, W, I>(out: W, objects: I) -> ArchiveResult<W>
where
    W: Write,
    I: IntoIterator<Item = &'a FetchedObject>,
{
    let mut writer = ArchiveWriter::new(out);
    writer.append_all(objects)?;
    writer.finish()
}

/// Writer that counts bytes and drops them
#[derive(Debug, Default)]
pub struct CountingSink {
    pub bytes: u64,
}

impl Write for CountingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use std::io::Read;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn read_back(bytes: &[u8]) -> Vec<(String, Vec<u8>, u64)> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mtime = entry.header().mtime().unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (name, data, mtime)
            })
            .collect()
    }

    #[test]
    fn test_block_padding() {
        assert_eq!(block_padding(0), 0);
        assert_eq!(block_padding(1), 511);
        assert_eq!(block_padding(512), 0);
        assert_eq!(block_padding(513), 511);
    }

    #[test]
    fn test_empty_archive_is_terminator_only() {
        let out = write_archive(Vec::new(), &Vec::<FetchedObject>::new()).unwrap();
        assert_eq!(out.len(), 2 * BLOCK_LEN);
        assert!(out.iter().all(|&b| b == 0));
        assert!(read_back(&out).is_empty());
    }

    #[test]
    fn test_entries_round_trip_in_order() {
        let objects = vec![
            FetchedObject::new("x", "hello", ts(1_600_000_000)),
            FetchedObject::new("sub/y", "world", ts(1_600_000_100)),
        ];
        let out = write_archive(Vec::new(), &objects).unwrap();
        let entries = read_back(&out);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("x".to_string(), b"hello".to_vec(), 1_600_000_000));
        assert_eq!(entries[1], ("sub/y".to_string(), b"world".to_vec(), 1_600_000_100));
    }

    #[test]
    fn test_long_name_round_trip() {
        let name = format!("{}/{}", "d".repeat(80), "f".repeat(60));
        let objects = vec![FetchedObject::new(name.clone(), "payload", ts(0))];
        let out = write_archive(Vec::new(), &objects).unwrap();
        let entries = read_back(&out);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, name);
        assert_eq!(entries[0].1, b"payload");
    }

    #[test]
    fn test_names_kept_byte_for_byte() {
        let long = format!("{}//{}/./end", "d".repeat(70), "e".repeat(40));
        let objects = vec![
            FetchedObject::new("a//b", "1", ts(0)),
            FetchedObject::new("a/./c", "2", ts(0)),
            FetchedObject::new("a/b", "3", ts(0)),
            FetchedObject::new(long.clone(), "4", ts(0)),
        ];
        let out = write_archive(Vec::new(), &objects).unwrap();

        let mut archive = tar::Archive::new(out.as_slice());
        let names: Vec<Vec<u8>> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path_bytes().into_owned())
            .collect();

        assert_eq!(
            names,
            vec![
                b"a//b".to_vec(),
                b"a/./c".to_vec(),
                b"a/b".to_vec(),
                long.into_bytes(),
            ]
        );
    }

    #[test]
    fn test_size_accounting_matches_output() {
        let objects: Vec<_> = (0..10)
            .map(|i| FetchedObject::new(i.to_string(), vec![i as u8; 1000], ts(0)))
            .collect();

        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append_all(&objects).unwrap();
        assert_eq!(writer.entries(), 10);
        assert_eq!(writer.payload_bytes(), 10_000);

        // 1000 bytes pads to 1024, plus one header block each
        assert_eq!(writer.archive_bytes(), 10 * (512 + 1024));

        let archive_bytes = writer.archive_bytes();
        let out = writer.finish().unwrap();
        assert_eq!(out.len() as u64, archive_bytes + 2 * BLOCK_LEN as u64);
    }

    #[test]
    fn test_rejects_bad_names() {
        for bad in ["", "/abs", "a/../b", "nul\0byte"] {
            let mut writer = ArchiveWriter::new(Vec::new());
            let err = writer
                .append(&FetchedObject::new(bad, "x", ts(0)))
                .unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidName { .. }), "{bad:?}");
            assert!(err.to_string().starts_with("writing header of"));
        }
    }

    #[derive(Debug)]
    struct FailAfter {
        left: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.left == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "device full"));
            }
            let n = buf.len().min(self.left);
            self.left -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_header_write_failure() {
        let mut writer = ArchiveWriter::new(FailAfter { left: 100 });
        let err = writer
            .append(&FetchedObject::new("x", "hello", ts(0)))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Header { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_content_write_failure() {
        let mut writer = ArchiveWriter::new(FailAfter { left: BLOCK_LEN + 2 });
        let err = writer
            .append(&FetchedObject::new("x", "hello", ts(0)))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Content { ref name, .. } if name == "x"));
        assert_eq!(writer.entries(), 0);
    }

    #[test]
    fn test_finish_failure() {
        let writer = ArchiveWriter::new(FailAfter { left: 0 });
        let err = writer.finish().unwrap_err();
        assert!(matches!(err, ArchiveError::Finish(_)));
    }

    #[test]
    fn test_counting_sink() {
        let objects = vec![FetchedObject::new("a", vec![1u8; 512], ts(0))];
        let sink = write_archive(CountingSink::default(), &objects).unwrap();
        assert_eq!(sink.bytes, 512 + 512 + 1024);
    }
}
