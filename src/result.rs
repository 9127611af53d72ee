//! Error types that can be emitted from this library

use displaydoc::Display;
use thiserror::Error;

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::io;

/// Generic result type with ZipError as its error variant
pub type ZipResult<T> = Result<T, ZipError>;

/// A ZIP feature this reader recognizes on the wire but does not support.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnsupportedFeature {
    /// multi-segment (split) archive
    Splitting,
    /// data descriptor on a STORED entry
    DataDescriptor,
    /// preset DEFLATE dictionary
    Dictionary,
    /// encrypted entry content
    EncryptedContent,
    /// compression method {0}
    CompressionMethod(u16),
}

/// Error type for reading Zip streams
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum ZipError {
    /// i/o error: {0}
    Io(#[from] io::Error),

    /// invalid Zip archive: {0}
    InvalidArchive(Cow<'static, str>),

    /// truncated Zip archive: {0}
    Truncated(Cow<'static, str>),

    /// unsupported Zip feature: {0}
    Unsupported(UnsupportedFeature),

    /// malformed DEFLATE stream: {0}
    MalformedDeflate(Box<str>),

    /// crc-32 mismatch: expected {expected:#010x}, got {actual:#010x}
    Crc32Mismatch {
        /// The checksum declared by the archive.
        expected: u32,
        /// The checksum computed over the delivered bytes.
        actual: u32,
    },

    /// the reader has been closed
    Closed,
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> io::Error {
        let kind = match &err {
            ZipError::Io(err) => err.kind(),
            ZipError::InvalidArchive(_) => io::ErrorKind::InvalidData,
            ZipError::Truncated(_) => io::ErrorKind::UnexpectedEof,
            ZipError::Unsupported(_) => io::ErrorKind::Unsupported,
            ZipError::MalformedDeflate(_) => io::ErrorKind::InvalidData,
            ZipError::Crc32Mismatch { .. } => io::ErrorKind::InvalidData,
            ZipError::Closed => io::ErrorKind::BrokenPipe,
        };

        io::Error::new(kind, err)
    }
}

/// Error type for time parsing
#[derive(Debug)]
pub struct DateTimeRangeError;

impl fmt::Display for DateTimeRangeError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "a date could not be represented within the bounds the MS-DOS date range (1980-2107)"
        )
    }
}

impl Error for DateTimeRangeError {}
