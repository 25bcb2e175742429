//! Streaming compression stage wrapped around the tar stream

use crate::error::{CompressionError, PersistError};
use flate2::write::GzEncoder;
use std::io::{self, Write};

/// Compression applied to the tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Compression {
    /// gzip (`.tar.gz`)
    #[default]
    Gzip,
    /// Zstandard (`.tar.zst`)
    Zstd,
    /// Plain tar
    #[value(name = "none")]
    Plain,
}

impl Compression {
    /// Short codec name for messages
    pub fn name(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Plain => "none",
        }
    }

    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Gzip => "tar.gz",
            Compression::Zstd => "tar.zst",
            Compression::Plain => "tar",
        }
    }

    /// Level used when none is given
    pub fn default_level(self) -> i32 {
        match self {
            Compression::Gzip => 6,
            Compression::Zstd => zstd::DEFAULT_COMPRESSION_LEVEL,
            Compression::Plain => 0,
        }
    }

    /// Accepted level range (inclusive)
    pub fn level_range(self) -> (i32, i32) {
        match self {
            Compression::Gzip => (0, 9),
            Compression::Zstd => (1, 22),
            Compression::Plain => (0, 0),
        }
    }

    /// Wrap `inner` in an encoder for this codec
    pub fn encoder<W: Write>(self, inner: W, level: i32) -> Result<Encoder<W>, CompressionError> {
        match self {
            Compression::Gzip => {
                let level = flate2::Compression::new(level.clamp(0, 9) as u32);
                Ok(Encoder::Gzip(GzEncoder::new(inner, level)))
            }
            Compression::Zstd => zstd::stream::write::Encoder::new(inner, level)
                .map(Encoder::Zstd)
                .map_err(|source| CompressionError::Init {
                    codec: self.name(),
                    source,
                }),
            Compression::Plain => Ok(Encoder::Plain(inner)),
        }
    }
}

/// A running encoder; `finish` must be called to write the trailer
pub enum Encoder<W: Write> {
    Gzip(GzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Plain(W),
}

impl<W: Write> Encoder<W> {
    pub fn compression(&self) -> Compression {
        match self {
            Encoder::Gzip(_) => Compression::Gzip,
            Encoder::Zstd(_) => Compression::Zstd,
            Encoder::Plain(_) => Compression::Plain,
        }
    }

    /// Flush the codec trailer and return the inner writer
    pub fn finish(self) -> Result<W, CompressionError> {
        let codec = self.compression().name();
        let result = match self {
            Encoder::Gzip(enc) => enc.finish(),
            Encoder::Zstd(enc) => enc.finish(),
            Encoder::Plain(mut inner) => inner.flush().map(|()| inner),
        };
        result.map_err(|source| CompressionError::Finish { codec, source })
    }
}

/// Tag a codec error; errors already tagged by the output file pass through
fn compression_io(codec: &'static str, source: io::Error) -> io::Error {
    if source.get_ref().is_some_and(|e| e.is::<PersistError>()) {
        return source;
    }
    let kind = source.kind();
    io::Error::new(kind, CompressionError::Write { codec, source })
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let codec = self.compression().name();
        match self {
            Encoder::Gzip(enc) => enc.write(buf).map_err(|e| compression_io(codec, e)),
            Encoder::Zstd(enc) => enc.write(buf).map_err(|e| compression_io(codec, e)),
            Encoder::Plain(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let codec = self.compression().name();
        match self {
            Encoder::Gzip(enc) => enc.flush().map_err(|e| compression_io(codec, e)),
            Encoder::Zstd(enc) => enc.flush().map_err(|e| compression_io(codec, e)),
            Encoder::Plain(inner) => inner.flush(),
        }
    }
}

/// Compress a complete in-memory tar buffer
pub fn compress(data: &[u8], compression: Compression, level: i32) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = compression.encoder(Vec::with_capacity(data.len() / 2), level)?;
    encoder
        .write_all(data)
        .map_err(|source| CompressionError::Write {
            codec: compression.name(),
            source,
        })?;
    encoder.finish()
}
