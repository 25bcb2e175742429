//! All-or-nothing archive output file
//!
//! The archive is streamed into a temporary file created next to the
//! destination. Only `persist` renames it into place; dropping an
//! `OutputFile` (on any error path) deletes the temporary file and leaves
//! the destination untouched.

use crate::error::PersistError;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Permissions of the saved archive
pub const OUTPUT_MODE: u32 = 0o644;

/// Write buffer in front of the temporary file
const WRITE_BUFFER: usize = 1 << 20;

/// Temporary archive file that becomes `path` on `persist`
pub struct OutputFile {
    writer: BufWriter<NamedTempFile>,
    path: PathBuf,
    written: u64,
}

impl OutputFile {
    /// Create the temporary file in the destination's directory
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".bucket-tar-")
            .suffix(".partial")
            .tempfile_in(&dir)
            .map_err(|source| PersistError::Create { dir, source })?;

        debug!(temp = %temp.path().display(), dest = %path.display(), "Opened temporary archive");

        Ok(Self {
            writer: BufWriter::with_capacity(WRITE_BUFFER, temp),
            path,
            written: 0,
        })
    }

    /// Destination path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, sync and atomically rename over the destination
    ///
    /// Returns the final file size.
    pub fn persist(self) -> Result<u64, PersistError> {
        let path = self.path;
        let written = self.written;

        let temp = self.writer.into_inner().map_err(|e| PersistError::Write {
            path: path.clone(),
            source: e.into_error(),
        })?;

        temp.as_file().sync_all().map_err(|source| PersistError::Write {
            path: path.clone(),
            source,
        })?;

        set_mode(temp.path()).map_err(|source| PersistError::Write {
            path: path.clone(),
            source,
        })?;

        temp.persist(&path).map_err(|e| PersistError::Rename {
            path: path.clone(),
            source: e.error,
        })?;

        Ok(written)
    }
}

/// Tag a disk error so the coordinator reports it as a persist failure
fn persist_io(path: &Path, source: io::Error) -> io::Error {
    let kind = source.kind();
    io::Error::new(
        kind,
        PersistError::Write {
            path: path.to_path_buf(),
            source,
        },
    )
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self
            .writer
            .write(buf)
            .map_err(|e| persist_io(&self.path, e))?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().map_err(|e| persist_io(&self.path, e))
    }
}

#[cfg(unix)]
fn set_mode(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(OUTPUT_MODE))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_persist_writes_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.tar");

        let mut out = OutputFile::create(&dest).unwrap();
        out.write_all(b"archive bytes").unwrap();
        assert!(!dest.exists());

        let size = out.persist().unwrap();
        assert_eq!(size, 13);
        assert_eq!(fs::read(&dest).unwrap(), b"archive bytes");
    }

    #[test]
    fn test_drop_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.tar");

        {
            let mut out = OutputFile::create(&dest).unwrap();
            out.write_all(b"partial").unwrap();
        }

        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_persist_replaces_existing() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.tar");
        fs::write(&dest, b"old").unwrap();

        let mut out = OutputFile::create(&dest).unwrap();
        out.write_all(b"new").unwrap();
        out.persist().unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_write_errors_are_persist_tagged() {
        let err = persist_io(Path::new("out.tar"), io::Error::new(io::ErrorKind::Other, "full"));
        assert!(err.get_ref().is_some_and(|e| e.is::<PersistError>()));
        assert!(err.to_string().contains("out.tar"));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nope").join("out.tar");
        assert!(matches!(
            OutputFile::create(&dest),
            Err(PersistError::Create { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.tar");
        OutputFile::create(&dest).unwrap().persist().unwrap();
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, OUTPUT_MODE);
    }
}
