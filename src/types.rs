//! Types that describe the entries of a ZIP stream.

use std::fmt;

use crate::compression::CompressionMethod;
use crate::result::{DateTimeRangeError, ZipError};
use crate::spec::{self, from_le, FixedSizeBlock, Magic};

/// The platform an entry was written on, from the upper byte of the
/// "version made by" field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum System {
    /// MS-DOS and compatible FAT file systems
    Dos = 0,
    /// Unix
    Unix = 3,
    /// Any platform this crate has no name for
    Unknown,
}

impl From<u8> for System {
    fn from(system: u8) -> Self {
        match system {
            0 => Self::Dos,
            3 => Self::Unix,
            _ => Self::Unknown,
        }
    }
}

/// Representation of a moment in time.
///
/// Zip files use an old format from DOS to store timestamps,
/// with its own set of peculiarities.
/// For example, it has a resolution of 2 seconds!
///
/// # Warning
///
/// Because there is no timezone associated with the [`DateTime`], they should ideally only
/// be used for user-facing descriptions.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DateTime {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl Default for DateTime {
    /// Constructs an 'default' datetime of 1980-01-01 00:00:00
    fn default() -> DateTime {
        DateTime {
            year: 1980,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl fmt::Display for DateTime {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl DateTime {
    /// Converts an msdos (u16, u16) pair to a DateTime object if it represents a valid date and
    /// time.
    pub fn try_from_msdos(datepart: u16, timepart: u16) -> Result<DateTime, DateTimeRangeError> {
        let seconds = (timepart & 0b0000000000011111) << 1;
        let minutes = (timepart & 0b0000011111100000) >> 5;
        let hours = (timepart & 0b1111100000000000) >> 11;
        let days = datepart & 0b0000000000011111;
        let months = (datepart & 0b0000000111100000) >> 5;
        let years = (datepart & 0b1111111000000000) >> 9;
        Self::from_date_and_time(
            years.checked_add(1980).ok_or(DateTimeRangeError)?,
            months as u8,
            days as u8,
            hours as u8,
            minutes as u8,
            seconds as u8,
        )
    }

    /// Constructs a DateTime from a specific date and time
    ///
    /// The bounds are:
    /// * year: [1980, 2107]
    /// * month: [1, 12]
    /// * day: [1, 31]
    /// * hour: [0, 23]
    /// * minute: [0, 59]
    /// * second: [0, 60]
    pub fn from_date_and_time(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<DateTime, DateTimeRangeError> {
        if (1980..=2107).contains(&year)
            && (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour <= 23
            && minute <= 59
            && second <= 60
        {
            Ok(DateTime {
                year,
                month,
                day,
                hour,
                minute,
                second,
            })
        } else {
            Err(DateTimeRangeError)
        }
    }

    /// Get the year. There is no epoch, i.e. 2018 will be returned as 2018.
    pub const fn year(&self) -> u16 {
        self.year
    }

    /// Get the month, where 1 = january and 12 = december
    pub const fn month(&self) -> u8 {
        self.month
    }

    /// Get the day
    pub const fn day(&self) -> u8 {
        self.day
    }

    /// Get the hour
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Get the minute
    pub const fn minute(&self) -> u8 {
        self.minute
    }

    /// Get the second
    pub const fn second(&self) -> u8 {
        self.second
    }
}

/// Metadata of one archive entry, parsed from its local file header.
///
/// For entries that use a data descriptor the checksum and both sizes are
/// unknown while the entry is being read; the reader back-fills them on its
/// own copy once the descriptor has been parsed, observable through
/// [`ZipStreamReader::current_entry`](crate::ZipStreamReader::current_entry).
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub(crate) system: System,
    pub(crate) flags: u16,
    pub(crate) encrypted: bool,
    pub(crate) is_utf8: bool,
    pub(crate) using_data_descriptor: bool,
    pub(crate) compression_method: CompressionMethod,
    pub(crate) last_modified_time: Option<DateTime>,
    pub(crate) crc32: Option<u32>,
    pub(crate) compressed_size: Option<u64>,
    pub(crate) uncompressed_size: Option<u64>,
    pub(crate) file_name: Box<str>,
    pub(crate) file_name_raw: Box<[u8]>,
    pub(crate) extra_field: Box<[u8]>,
    pub(crate) uses_zip64: bool,
}

impl ZipEntry {
    /// Get the name of the file
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting an archive.
    /// It may contain an absolute path (`/etc/shadow`), or break out of the
    /// current directory (`../runtime`). Carelessly writing to these paths
    /// allows an attacker to craft a ZIP archive that will overwrite critical
    /// files.
    pub fn name(&self) -> &str {
        &self.file_name
    }

    /// Get the name of the file, in the raw (internal) byte representation.
    pub fn name_raw(&self) -> &[u8] {
        &self.file_name_raw
    }

    /// The platform the entry was written on.
    pub const fn system(&self) -> System {
        self.system
    }

    /// The raw general purpose bit flag word.
    pub const fn general_purpose_flag(&self) -> u16 {
        self.flags
    }

    /// Whether the entry content is encrypted.
    pub const fn encrypted(&self) -> bool {
        self.encrypted
    }

    /// Whether the name was declared to be UTF-8 (general purpose bit 11).
    pub const fn is_utf8(&self) -> bool {
        self.is_utf8
    }

    /// Whether sizes and checksum trail the payload in a data descriptor
    /// (general purpose bit 3).
    pub const fn using_data_descriptor(&self) -> bool {
        self.using_data_descriptor
    }

    /// How the entry payload is stored.
    pub const fn compression_method(&self) -> CompressionMethod {
        self.compression_method
    }

    /// Get the time the file was last modified
    pub const fn last_modified(&self) -> Option<DateTime> {
        self.last_modified_time
    }

    /// The CRC-32 checksum declared for the entry content, if known yet.
    pub const fn crc32(&self) -> Option<u32> {
        self.crc32
    }

    /// The size of the payload as stored in the archive, if known yet.
    pub const fn compressed_size(&self) -> Option<u64> {
        self.compressed_size
    }

    /// The size of the entry content once decompressed, if known yet.
    pub const fn size(&self) -> Option<u64> {
        self.uncompressed_size
    }

    /// The raw bytes of the local header's extra field.
    pub fn extra_field(&self) -> &[u8] {
        &self.extra_field
    }

    /// Whether a ZIP64 extended information extra field is present.
    pub const fn uses_zip64(&self) -> bool {
        self.uses_zip64
    }

    /// Whether the entry names a directory.
    pub fn is_dir(&self) -> bool {
        spec::is_dir(&self.file_name)
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct ZipLocalEntryBlock {
    pub magic: Magic,
    pub version_made_by: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl FixedSizeBlock for ZipLocalEntryBlock {
    const MAGIC: Magic = Magic::LOCAL_FILE_HEADER_SIGNATURE;

    const WRONG_MAGIC_ERROR: ZipError =
        ZipError::InvalidArchive(std::borrow::Cow::Borrowed("Invalid local file header"));

    #[inline(always)]
    fn magic(self) -> Magic {
        self.magic
    }

    fn from_le(mut self) -> Self {
        from_le![
            self,
            [
                (magic, Magic),
                (version_made_by, u16),
                (flags, u16),
                (compression_method, u16),
                (last_mod_time, u16),
                (last_mod_date, u16),
                (crc32, u32),
                (compressed_size, u32),
                (uncompressed_size, u32),
                (file_name_length, u16),
                (extra_field_length, u16),
            ]
        ];
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::mem;

    #[test]
    fn local_block_is_header_sized() {
        assert_eq!(
            mem::size_of::<ZipLocalEntryBlock>(),
            spec::LOCAL_FILE_HEADER_LEN
        );
    }

    #[test]
    fn local_block_round_trip() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0x04034b50u32.to_le_bytes());
        raw.extend_from_slice(&20u16.to_le_bytes());
        raw.extend_from_slice(&0x0808u16.to_le_bytes());
        raw.extend_from_slice(&8u16.to_le_bytes());
        raw.extend_from_slice(&0x54cfu16.to_le_bytes());
        raw.extend_from_slice(&0x4d71u16.to_le_bytes());
        raw.extend_from_slice(&0xdeadbeefu32.to_le_bytes());
        raw.extend_from_slice(&1234u32.to_le_bytes());
        raw.extend_from_slice(&5678u32.to_le_bytes());
        raw.extend_from_slice(&5u16.to_le_bytes());
        raw.extend_from_slice(&0u16.to_le_bytes());

        let block = ZipLocalEntryBlock::interpret(&raw).unwrap();
        assert_eq!({ block.flags }, 0x0808);
        assert_eq!({ block.compression_method }, 8);
        assert_eq!({ block.crc32 }, 0xdeadbeef);
        assert_eq!({ block.compressed_size }, 1234);
        assert_eq!({ block.uncompressed_size }, 5678);
        assert_eq!({ block.file_name_length }, 5);
    }

    #[test]
    fn local_block_rejects_wrong_magic() {
        let raw = [0u8; 30];
        assert!(ZipLocalEntryBlock::interpret(&raw).is_err());
    }

    #[test]
    fn system() {
        assert_eq!(System::from(0), System::Dos);
        assert_eq!(System::from(3), System::Unix);
        assert_eq!(System::from(7), System::Unknown);
    }

    #[test]
    fn datetime_default() {
        let dt = DateTime::default();
        assert_eq!(dt.year(), 1980);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 1);
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (0, 0, 0));
    }

    #[test]
    fn datetime_from_msdos() {
        let dt = DateTime::try_from_msdos(0x4d71, 0x54cf).unwrap();
        assert_eq!(dt.year(), 2018);
        assert_eq!(dt.month(), 11);
        assert_eq!(dt.day(), 17);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 38);
        assert_eq!(dt.second(), 30);
    }

    #[test]
    fn datetime_bounds() {
        assert!(DateTime::from_date_and_time(2000, 1, 1, 23, 59, 60).is_ok());
        assert!(DateTime::from_date_and_time(2000, 1, 1, 24, 0, 0).is_err());
        assert!(DateTime::from_date_and_time(1979, 1, 1, 0, 0, 0).is_err());
        assert!(DateTime::from_date_and_time(2108, 1, 1, 0, 0, 0).is_err());
        assert!(DateTime::try_from_msdos(0x0000, 0x0000).is_err());
    }

    #[test]
    fn datetime_display() {
        assert_eq!(format!("{}", DateTime::default()), "1980-01-01 00:00:00");
        assert_eq!(
            format!(
                "{}",
                DateTime::from_date_and_time(2018, 11, 17, 10, 38, 30).unwrap()
            ),
            "2018-11-17 10:38:30"
        );
    }
}
