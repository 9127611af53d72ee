//! Configuration and name handling for streaming ZIP input.

use crate::cp437;

pub(crate) mod pushback;
pub mod stream;

/// Character set used to decode entry names that do not carry the UTF-8
/// flag (general purpose bit 11).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum NameEncoding {
    /// Treat raw names as UTF-8; invalid sequences are replaced.
    #[default]
    Utf8,
    /// Decode raw names as IBM code page 437, the historic PKZIP default.
    Cp437,
}

/// Configuration for a [`ZipStreamReader`](crate::ZipStreamReader).
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Encoding for entry names whose UTF-8 flag is absent.
    pub encoding: NameEncoding,
    /// Whether an Info-ZIP Unicode Path extra field may override the header
    /// name when the UTF-8 flag is absent.
    pub use_unicode_extra_fields: bool,
    /// Whether STORED entries that use a data descriptor are readable.
    ///
    /// Such entries do not declare their length anywhere before the payload,
    /// so the reader has to buffer the whole entry while scanning for the
    /// descriptor. Off by default.
    pub allow_stored_entries_with_data_descriptor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoding: NameEncoding::default(),
            use_unicode_extra_fields: true,
            allow_stored_entries_with_data_descriptor: false,
        }
    }
}

pub(crate) fn decode_file_name(raw: &[u8], has_utf8_flag: bool, encoding: NameEncoding) -> Box<str> {
    if has_utf8_flag {
        return String::from_utf8_lossy(raw).into();
    }
    match encoding {
        NameEncoding::Utf8 => String::from_utf8_lossy(raw).into(),
        NameEncoding::Cp437 => cp437::decode_cp437(raw).into(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn utf8_flag_wins_over_configured_encoding() {
        let raw = "\u{f3}.txt".as_bytes();
        assert_eq!(
            &*decode_file_name(raw, true, NameEncoding::Cp437),
            "\u{f3}.txt"
        );
    }

    #[test]
    fn cp437_applies_without_flag() {
        assert_eq!(
            &*decode_file_name(&[0xa2, b'.', b't', b'x', b't'], false, NameEncoding::Cp437),
            "\u{f3}.txt"
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(
            &*decode_file_name(&[0xff, b'a'], false, NameEncoding::Utf8),
            "\u{fffd}a"
        );
    }
}
