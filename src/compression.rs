//! Possible ZIP compression methods.

use std::fmt;

/// Identifies the storage format used to write an entry.
///
/// Only STORED and DEFLATED payloads can be decompressed by this crate.
/// Entries using any other method are still enumerated and can be skipped
/// over, but reading their content fails.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum CompressionMethod {
    /// Store the file as is
    Stored,
    /// Compress the file using Deflate
    Deflated,
    /// Unsupported compression method
    Unsupported(u16),
}

impl CompressionMethod {
    pub(crate) const fn parse_from_u16(val: u16) -> Self {
        match val {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            v => CompressionMethod::Unsupported(v),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Just duplicate what the Debug format looks like, i.e, the enum key
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod test {
    use super::CompressionMethod;

    #[test]
    fn unknown_codes_keep_their_value() {
        for v in 0..=u16::MAX {
            match CompressionMethod::parse_from_u16(v) {
                CompressionMethod::Stored => assert_eq!(v, 0),
                CompressionMethod::Deflated => assert_eq!(v, 8),
                CompressionMethod::Unsupported(code) => assert_eq!(code, v),
            }
        }
    }

    #[test]
    fn known_codes() {
        assert_eq!(
            CompressionMethod::parse_from_u16(0),
            CompressionMethod::Stored
        );
        assert_eq!(
            CompressionMethod::parse_from_u16(8),
            CompressionMethod::Deflated
        );
        assert_eq!(
            CompressionMethod::parse_from_u16(12),
            CompressionMethod::Unsupported(12)
        );
    }
}
