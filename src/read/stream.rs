//! A streaming, forward-only reader for ZIP archives.
//!
//! The reader walks local file headers in file order and never seeks the
//! source. Look-behind, where the format demands it, is simulated by pushing
//! over-read bytes back into a [`PushbackReader`]. Entry sizes that only
//! trail the payload (data descriptors) are located by scanning ahead for
//! the next record signature.

use std::borrow::Cow;
use std::io::{self, Read};

use crc32fast::Hasher;
use flate2::{Decompress, FlushDecompress, Status};

use crate::compression::CompressionMethod;
use crate::extra_fields::{self, ExtraField, Zip64ExtendedInformation};
use crate::read::pushback::PushbackReader;
use crate::read::{decode_file_name, Config};
use crate::result::{UnsupportedFeature, ZipError, ZipResult};
use crate::spec::{
    self, FixedSizeBlock, LittleEndianReadExt, Magic, CENTRAL_FILE_HEADER_LEN,
    LOCAL_FILE_HEADER_LEN, MIN_EOCD_LEN,
};
use crate::types::{DateTime, System, ZipEntry, ZipLocalEntryBlock};

/// Size of the scratch buffer all raw reads go through, the same as the
/// customary ZIP writer buffer.
const STREAM_BUFFER_SIZE: usize = 512;

/// Chunk size used when skipping over decompressed content.
const SKIP_BUFFER_SIZE: usize = 1024;

/// Checks whether `signature` starts like a ZIP byte stream this reader
/// accepts: a local file header, an empty archive's end-of-central-directory
/// record, a data descriptor or the single-segment split marker.
///
/// Self-extracting archives with arbitrary leading content are not detected.
pub fn matches_archive_prefix(signature: &[u8]) -> bool {
    if signature.len() < 4 {
        return false;
    }
    let magic = Magic::from_first_le_bytes(signature);
    magic == Magic::LOCAL_FILE_HEADER_SIGNATURE
        || magic == Magic::CENTRAL_DIRECTORY_END_SIGNATURE
        || magic == Magic::DATA_DESCRIPTOR_SIGNATURE
        || magic == Magic::SINGLE_SEGMENT_SPLIT_MARKER
}

/// State for the entry whose payload the stream is currently positioned in.
struct CurrentEntry {
    entry: ZipEntry,
    /// Does the entry use a data descriptor?
    has_data_descriptor: bool,
    /// Does the entry carry a ZIP64 extended information extra field?
    uses_zip64: bool,
    /// Decompressed bytes delivered to the caller.
    bytes_read: u64,
    /// Raw bytes pulled from the source for this entry's payload. May exceed
    /// the compressed size; the excess is pushed back when the entry closes.
    bytes_read_from_stream: u64,
    /// Whether the inflater has reported the end of the DEFLATE stream.
    inflater_finished: bool,
}

/// Scratch window between the source and whichever reader is draining it.
struct ScratchBuffer {
    buf: [u8; STREAM_BUFFER_SIZE],
    /// First byte of the window the entry reader has not consumed yet.
    offset: usize,
    /// Number of valid bytes from the most recent fill.
    last_read: usize,
}

impl ScratchBuffer {
    fn new() -> Self {
        Self {
            buf: [0u8; STREAM_BUFFER_SIZE],
            offset: 0,
            last_read: 0,
        }
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.last_read = 0;
    }
}

/// Reads ZIP entries and their content off a forward-only byte stream.
///
/// Unlike a seekable ZIP reader this type never consults the central
/// directory, so entries are yielded in file order and some metadata (file
/// comments, external attributes) is unavailable. In exchange it handles
/// input that cannot seek at all: sockets, pipes, chained readers.
///
/// The reader is not thread safe: one implicit stream position, one
/// inflater, one checksum and one scratch buffer are shared by every
/// operation.
///
/// ```no_run
/// use std::fs::File;
/// use std::io::Read;
///
/// fn list(path: &str) -> zipstream::ZipResult<()> {
///     let file = File::open(path)?;
///     let mut reader = zipstream::ZipStreamReader::new(file);
///     while let Some(entry) = reader.next_entry()? {
///         let mut content = Vec::new();
///         reader.read_to_end(&mut content)?;
///         println!("{} ({} bytes)", entry.name(), content.len());
///     }
///     Ok(())
/// }
/// ```
pub struct ZipStreamReader<R: Read> {
    source: PushbackReader<R>,
    config: Config,
    /// Inflater shared by all DEFLATED entries, reset between entries.
    inflater: Decompress,
    /// Checksums the bytes delivered to the caller, and only those.
    hasher: Hasher,
    buf: ScratchBuffer,
    current: Option<CurrentEntry>,
    closed: bool,
    /// Once the central directory has been reached no further entries exist.
    hit_central_directory: bool,
    /// A STORED entry that uses a data descriptor has to be read in full to
    /// find its end; the content is cached here and replayed to the caller.
    cached_stored_entry: Option<io::Cursor<Vec<u8>>>,
    entries_read: u64,
}

impl<R: Read> ZipStreamReader<R> {
    /// Creates a reader with the default [`Config`].
    pub fn new(source: R) -> Self {
        Self::with_config(source, Config::default())
    }

    /// Creates a reader with explicit configuration.
    pub fn with_config(source: R, config: Config) -> Self {
        Self {
            source: PushbackReader::new(source),
            config,
            inflater: Decompress::new(false),
            hasher: Hasher::new(),
            buf: ScratchBuffer::new(),
            current: None,
            closed: false,
            hit_central_directory: false,
            cached_stored_entry: None,
            entries_read: 0,
        }
    }

    /// Unwraps the underlying byte source.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// The entry whose payload the reader is currently positioned in.
    ///
    /// For data-descriptor entries this copy of the metadata carries the
    /// checksum and sizes as soon as the descriptor has been parsed.
    pub fn current_entry(&self) -> Option<&ZipEntry> {
        self.current.as_ref().map(|current| &current.entry)
    }

    /// Whether this reader can deliver the content of `entry`.
    ///
    /// False for encrypted entries, for compression methods other than
    /// STORED and DEFLATED, and for STORED entries that use a data
    /// descriptor unless
    /// [`allow_stored_entries_with_data_descriptor`](Config::allow_stored_entries_with_data_descriptor)
    /// is set.
    pub fn can_read_entry_data(&self, entry: &ZipEntry) -> bool {
        matches!(
            entry.compression_method,
            CompressionMethod::Stored | CompressionMethod::Deflated
        ) && !entry.encrypted
            && supports_data_descriptor_for(&self.config, entry)
    }

    /// Advances to the next entry and returns its metadata, or `None` once
    /// the central directory has been reached.
    ///
    /// Closing the previous entry drains whatever content the caller did not
    /// read, so calling this in a loop without ever touching
    /// [`read`](Self::read) is a valid way to enumerate an archive. On the way out
    /// the reader also positions the stream past the central directory and
    /// the end-of-central-directory record, leaving chained readers at the
    /// first byte after the archive.
    pub fn next_entry(&mut self) -> ZipResult<Option<ZipEntry>> {
        if self.closed || self.hit_central_directory {
            return Ok(None);
        }
        let mut first_entry = true;
        if self.current.is_some() {
            self.close_entry()?;
            first_entry = false;
        }

        let mut header = [0u8; LOCAL_FILE_HEADER_LEN];
        let filled = if first_entry {
            self.read_first_local_file_header(&mut header)
        } else {
            self.read_fully(&mut header)
        };
        match filled {
            Ok(()) => {}
            // The source ran out where a header would start: end of archive.
            Err(ZipError::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        }

        let magic = Magic::from_first_le_bytes(&header);
        if magic == Magic::CENTRAL_DIRECTORY_HEADER_SIGNATURE
            || magic == Magic::ARCHIVE_EXTRA_DATA_SIGNATURE
        {
            self.hit_central_directory = true;
            self.skip_remainder_of_archive()?;
            return Ok(None);
        }
        if magic != Magic::LOCAL_FILE_HEADER_SIGNATURE {
            return Ok(None);
        }

        let block = ZipLocalEntryBlock::interpret(&header)?;
        let current = self.begin_entry(block)?;
        let entry = current.entry.clone();
        self.current = Some(current);
        self.entries_read += 1;
        Ok(Some(entry))
    }

    /// Reads decompressed content of the current entry into `buf`, returning
    /// the number of bytes delivered. `Ok(0)` means the entry's content is
    /// exhausted, or that no entry is current.
    pub fn read(&mut self, buf: &mut [u8]) -> ZipResult<usize> {
        if self.closed {
            return Err(ZipError::Closed);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(current) = self.current.as_ref() else {
            return Ok(0);
        };

        if current.entry.encrypted {
            return Err(ZipError::Unsupported(UnsupportedFeature::EncryptedContent));
        }
        let method = current.entry.compression_method;
        if let CompressionMethod::Unsupported(code) = method {
            return Err(ZipError::Unsupported(UnsupportedFeature::CompressionMethod(
                code,
            )));
        }
        if !supports_data_descriptor_for(&self.config, &current.entry) {
            return Err(ZipError::Unsupported(UnsupportedFeature::DataDescriptor));
        }

        match method {
            CompressionMethod::Stored => self.read_stored(buf),
            _ => self.read_deflated(buf),
        }
    }

    /// Reads and discards up to `count` bytes of the current entry's
    /// content, returning how many were skipped. Stops early at the end of
    /// the entry.
    pub fn skip(&mut self, count: u64) -> ZipResult<u64> {
        let mut chunk = [0u8; SKIP_BUFFER_SIZE];
        let mut skipped = 0u64;
        while skipped < count {
            let want = (count - skipped).min(SKIP_BUFFER_SIZE as u64) as usize;
            let read = self.read(&mut chunk[..want])?;
            if read == 0 {
                break;
            }
            skipped += read as u64;
        }
        Ok(skipped)
    }

    /// Marks the reader closed. Any later `read` fails with
    /// [`ZipError::Closed`]; `next_entry` reports the end of the archive.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Implementation of read for STORED entries.
    fn read_stored(&mut self, out: &mut [u8]) -> ZipResult<usize> {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.has_data_descriptor)
        {
            if self.cached_stored_entry.is_none() {
                self.read_stored_entry()?;
            }
            let Some(cache) = self.cached_stored_entry.as_mut() else {
                return Ok(0);
            };
            let count = cache.read(out)?;
            self.hasher.update(&out[..count]);
            if let Some(current) = self.current.as_mut() {
                current.bytes_read += count as u64;
            }
            return Ok(count);
        }

        let Self {
            source,
            buf,
            current,
            hasher,
            ..
        } = self;
        let Some(current) = current.as_mut() else {
            return Ok(0);
        };
        let size = current
            .entry
            .uncompressed_size
            .ok_or(ZipError::InvalidArchive(Cow::Borrowed(
                "stored entry without a known size",
            )))?;

        if current.bytes_read >= size {
            // Everything has been delivered; settle the checksum before
            // reporting the end of the entry.
            if let Some(expected) = current.entry.crc32 {
                let actual = hasher.clone().finalize();
                if expected != actual {
                    return Err(ZipError::Crc32Mismatch { expected, actual });
                }
            }
            return Ok(0);
        }

        if buf.offset >= buf.last_read {
            buf.offset = 0;
            buf.last_read = source.read(&mut buf.buf)?;
            if buf.last_read == 0 {
                return Err(ZipError::Truncated(Cow::Borrowed(
                    "stored entry data ended before its declared size",
                )));
            }
            current.bytes_read_from_stream += buf.last_read as u64;
        }

        let available = buf.last_read - buf.offset;
        let remaining = size - current.bytes_read;
        let count = (available.min(out.len()) as u64).min(remaining) as usize;
        out[..count].copy_from_slice(&buf.buf[buf.offset..buf.offset + count]);
        buf.offset += count;
        current.bytes_read += count as u64;
        hasher.update(&out[..count]);
        Ok(count)
    }

    /// Implementation of read for DEFLATED entries.
    fn read_deflated(&mut self, out: &mut [u8]) -> ZipResult<usize> {
        let produced = self.read_from_inflater(out)?;
        if produced == 0 {
            // The DEFLATE stream is complete. When the header already
            // declared a checksum (no data descriptor), settle it now.
            self.check_crc()?;
            return Ok(0);
        }
        self.hasher.update(&out[..produced]);
        if let Some(current) = self.current.as_mut() {
            current.bytes_read += produced as u64;
        }
        Ok(produced)
    }

    /// Feeds the inflater scratch-buffer-sized chunks until it produces
    /// output or finishes. Returns `Ok(0)` only at the end of the DEFLATE
    /// stream.
    fn read_from_inflater(&mut self, out: &mut [u8]) -> ZipResult<usize> {
        let Self {
            source,
            buf,
            current,
            inflater,
            ..
        } = self;
        let Some(current) = current.as_mut() else {
            return Ok(0);
        };
        if current.inflater_finished {
            return Ok(0);
        }

        loop {
            if buf.offset >= buf.last_read {
                buf.offset = 0;
                buf.last_read = source.read(&mut buf.buf)?;
                if buf.last_read == 0 {
                    return Err(ZipError::Truncated(Cow::Borrowed(
                        "deflated entry data ended before the stream was complete",
                    )));
                }
                current.bytes_read_from_stream += buf.last_read as u64;
            }

            let before_in = inflater.total_in();
            let before_out = inflater.total_out();
            let status = inflater
                .decompress(
                    &buf.buf[buf.offset..buf.last_read],
                    out,
                    FlushDecompress::None,
                )
                .map_err(|e| {
                    if e.needs_dictionary().is_some() {
                        ZipError::Unsupported(UnsupportedFeature::Dictionary)
                    } else {
                        ZipError::MalformedDeflate(e.to_string().into_boxed_str())
                    }
                })?;
            buf.offset += (inflater.total_in() - before_in) as usize;
            let produced = (inflater.total_out() - before_out) as usize;

            match status {
                Status::StreamEnd => {
                    current.inflater_finished = true;
                    return Ok(produced);
                }
                _ if produced > 0 => return Ok(produced),
                Status::Ok | Status::BufError => {
                    if buf.offset < buf.last_read {
                        return Err(ZipError::MalformedDeflate(
                            "inflater made no progress on pending input".into(),
                        ));
                    }
                    // Window exhausted; loop around to refill.
                }
            }
        }
    }

    /// Closes the current entry and positions the stream at the start of the
    /// next record.
    ///
    /// When the compressed size is known and nothing beyond it has been
    /// buffered, the remainder is skipped raw, which works even for
    /// compression methods this crate refuses to decompress. Otherwise the
    /// entry is driven to its end-of-stream and the difference between the
    /// bytes pulled from the source and the bytes actually consumed is
    /// pushed back.
    fn close_entry(&mut self) -> ZipResult<()> {
        if self.closed {
            return Err(ZipError::Closed);
        }
        let Some(current) = self.current.as_ref() else {
            return Ok(());
        };
        let has_data_descriptor = current.has_data_descriptor;
        let method = current.entry.compression_method;
        let drain_in_place = !has_data_descriptor
            && current
                .entry
                .compressed_size
                .is_some_and(|csize| current.bytes_read_from_stream <= csize);

        if drain_in_place {
            self.drain_current_entry_data()?;
        } else {
            self.skip(u64::MAX)?;

            let Some(current) = self.current.as_mut() else {
                return Ok(());
            };
            // The inflater is authoritative about how much input it used;
            // for STORED content the delivered byte count is.
            let consumed = match method {
                CompressionMethod::Deflated => self.inflater.total_in(),
                _ => current.bytes_read,
            };
            let diff = current
                .bytes_read_from_stream
                .saturating_sub(consumed)
                .min(self.buf.last_read as u64) as usize;
            if diff > 0 {
                let tail = self.buf.last_read - diff;
                self.source.unread(&self.buf.buf[tail..self.buf.last_read]);
            }
        }

        if self.cached_stored_entry.is_none() && has_data_descriptor {
            self.read_data_descriptor()?;
        }
        if has_data_descriptor {
            // The skip above consumed the payload through the checksum, and
            // the descriptor has declared what it should be.
            self.check_crc()?;
        }

        self.inflater.reset(false);
        self.buf.reset();
        self.hasher = Hasher::new();
        self.current = None;
        self.cached_stored_entry = None;
        Ok(())
    }

    /// Skips raw source bytes up to the declared compressed size.
    fn drain_current_entry_data(&mut self) -> ZipResult<()> {
        let Some(current) = self.current.as_ref() else {
            return Ok(());
        };
        let Some(csize) = current.entry.compressed_size else {
            return Ok(());
        };
        let remaining = csize - current.bytes_read_from_stream;
        let drained = io::copy(&mut self.source.by_ref().take(remaining), &mut io::sink())?;
        if drained < remaining {
            return Err(ZipError::Truncated(Cow::Borrowed(
                "entry data ended before its declared compressed size",
            )));
        }
        Ok(())
    }

    fn check_crc(&self) -> ZipResult<()> {
        let Some(current) = self.current.as_ref() else {
            return Ok(());
        };
        if let Some(expected) = current.entry.crc32 {
            let actual = self.hasher.clone().finalize();
            if expected != actual {
                return Err(ZipError::Crc32Mismatch { expected, actual });
            }
        }
        Ok(())
    }

    /// Fills `header` with the first local file header, dealing with the
    /// markers that may prefix it.
    fn read_first_local_file_header(
        &mut self,
        header: &mut [u8; LOCAL_FILE_HEADER_LEN],
    ) -> ZipResult<()> {
        self.read_fully(header)?;
        let magic = Magic::from_first_le_bytes(header);
        if magic == Magic::DATA_DESCRIPTOR_SIGNATURE {
            // A lone data descriptor here means this is one segment of a
            // split archive.
            return Err(ZipError::Unsupported(UnsupportedFeature::Splitting));
        }
        if magic == Magic::SINGLE_SEGMENT_SPLIT_MARKER {
            // The archive is not really split as only one segment was needed
            // in the end. Shift the marker out of the header window.
            let mut missed = [0u8; 4];
            self.read_fully(&mut missed)?;
            header.copy_within(4.., 0);
            header[LOCAL_FILE_HEADER_LEN - 4..].copy_from_slice(&missed);
        }
        Ok(())
    }

    /// Parses the variable tail of a local file header and sets up the entry
    /// cursor.
    fn begin_entry(&mut self, block: ZipLocalEntryBlock) -> ZipResult<CurrentEntry> {
        let ZipLocalEntryBlock {
            version_made_by,
            flags,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
            ..
        } = block;

        let encrypted = flags & 1 == 1;
        let is_utf8 = flags & (1 << 11) != 0;
        let using_data_descriptor = flags & (1 << 3) != 0;

        let mut file_name_raw = vec![0u8; file_name_length as usize];
        self.read_fully(&mut file_name_raw)?;
        let mut extra_field = vec![0u8; extra_field_length as usize];
        self.read_fully(&mut extra_field)?;

        let mut file_name = decode_file_name(&file_name_raw, is_utf8, self.config.encoding);

        let mut zip64: Option<Zip64ExtendedInformation> = None;
        for field in extra_fields::recognized_fields(&extra_field) {
            match field {
                ExtraField::Zip64(info) => zip64 = Some(info),
                ExtraField::UnicodePath(path) => {
                    if !is_utf8
                        && self.config.use_unicode_extra_fields
                        && path.applies_to(&file_name_raw)
                    {
                        file_name = path.decoded();
                    }
                }
            }
        }
        let uses_zip64 = zip64.is_some();

        // The fixed-width checksum and sizes are only trustworthy when the
        // data descriptor bit is clear, and the 4-byte sizes defer to the
        // ZIP64 extra field when they hold the sentinel.
        let (crc32, compressed_size, uncompressed_size) = if using_data_descriptor {
            (None, None, None)
        } else {
            let sentinel = compressed_size as u64 == spec::ZIP64_BYTES_THR
                || uncompressed_size as u64 == spec::ZIP64_BYTES_THR;
            match zip64 {
                Some(info) if sentinel => {
                    let size = info
                        .uncompressed_size()
                        .ok_or(ZipError::InvalidArchive(Cow::Borrowed(
                            "ZIP64 extra field is missing the uncompressed size",
                        )))?;
                    let csize = info
                        .compressed_size()
                        .ok_or(ZipError::InvalidArchive(Cow::Borrowed(
                            "ZIP64 extra field is missing the compressed size",
                        )))?;
                    (Some(crc32), Some(csize), Some(size))
                }
                _ => (
                    Some(crc32),
                    Some(compressed_size as u64),
                    Some(uncompressed_size as u64),
                ),
            }
        };

        let entry = ZipEntry {
            system: System::from(((version_made_by >> 8) & 0x0f) as u8),
            flags,
            encrypted,
            is_utf8,
            using_data_descriptor,
            compression_method: CompressionMethod::parse_from_u16(compression_method),
            last_modified_time: DateTime::try_from_msdos(last_mod_date, last_mod_time).ok(),
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            file_name_raw: file_name_raw.into_boxed_slice(),
            extra_field: extra_field.into_boxed_slice(),
            uses_zip64,
        };

        Ok(CurrentEntry {
            entry,
            has_data_descriptor: using_data_descriptor,
            uses_zip64,
            bytes_read: 0,
            bytes_read_from_stream: 0,
            inflater_finished: false,
        })
    }

    /// Reads the data descriptor that trails the current entry's payload and
    /// back-fills checksum and sizes on the entry.
    fn read_data_descriptor(&mut self) -> ZipResult<()> {
        let mut word = [0u8; 4];
        self.read_fully(&mut word)?;
        if Magic::from_le_bytes(word) == Magic::DATA_DESCRIPTOR_SIGNATURE {
            // Descriptor with the optional signature; the checksum follows.
            self.read_fully(&mut word)?;
        }
        let crc32 = u32::from_le_bytes(word);

        // Sizes are eight bytes each under ZIP64, four otherwise, but some
        // writers (Java 7 among them) emit eight-byte sizes without a ZIP64
        // extra field. Read 16 bytes and look at bytes eight to eleven: if
        // they form the signature of a record that could follow a data
        // descriptor, the sizes were four bytes each.
        let mut two_dword = [0u8; 16];
        self.read_fully(&mut two_dword)?;
        let potential_sig = Magic::from_first_le_bytes(&two_dword[8..]);
        let (compressed_size, uncompressed_size) = if potential_sig
            == Magic::LOCAL_FILE_HEADER_SIGNATURE
            || potential_sig == Magic::CENTRAL_DIRECTORY_HEADER_SIGNATURE
        {
            self.source.unread(&two_dword[8..]);
            (
                spec::u32_from_le_slice(&two_dword) as u64,
                spec::u32_from_le_slice(&two_dword[4..]) as u64,
            )
        } else {
            (
                spec::u64_from_le_slice(&two_dword),
                spec::u64_from_le_slice(&two_dword[8..]),
            )
        };

        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        current.entry.crc32 = Some(crc32);
        current.entry.compressed_size = Some(compressed_size);
        current.entry.uncompressed_size = Some(uncompressed_size);
        Ok(())
    }

    /// Caches a STORED entry that uses a data descriptor.
    ///
    /// The entry's length is written nowhere before the payload, so the only
    /// way to find its end is to read until the signature of the descriptor
    /// or of the next record shows up, rewind the overshoot and parse the
    /// descriptor. After this returns, the entry knows its sizes, its
    /// content sits in `cached_stored_entry` and the stream is positioned at
    /// the next record.
    fn read_stored_entry(&mut self) -> ZipResult<()> {
        // Length of the descriptor without the optional signature.
        let expected_dd_len = if self
            .current
            .as_ref()
            .is_some_and(|current| current.uses_zip64)
        {
            4 + 2 * 8
        } else {
            3 * 4
        };

        let mut content = Vec::new();
        let mut offset = 0usize;
        loop {
            let read = self.source.read(&mut self.buf.buf[offset..])?;
            if read == 0 {
                // Ran through the whole input without ever meeting a
                // descriptor or the central directory.
                return Err(ZipError::Truncated(Cow::Borrowed(
                    "no data descriptor found before the end of input",
                )));
            }
            if offset + read < 4 {
                // Too little to hold a signature; read more first.
                offset += read;
                continue;
            }

            if self.find_entry_boundary(&mut content, offset, read, expected_dd_len)? {
                break;
            }
            offset = self.cache_bytes_read(&mut content, offset, read, expected_dd_len);
        }

        self.cached_stored_entry = Some(io::Cursor::new(content));
        Ok(())
    }

    /// Scans the scratch buffer for a record signature marking the end of a
    /// STORED entry's payload.
    ///
    /// On a match everything before the descriptor is appended to `content`,
    /// the descriptor and all bytes after it are pushed back, and the
    /// descriptor is parsed, leaving the stream at the next record.
    fn find_entry_boundary(
        &mut self,
        content: &mut Vec<u8>,
        offset: usize,
        last_read: usize,
        expected_dd_len: usize,
    ) -> ZipResult<bool> {
        let valid = offset + last_read;
        let mut cut = None;
        for i in 0..last_read.saturating_sub(4) {
            let magic = Magic::from_first_le_bytes(&self.buf.buf[i..]);
            if magic == Magic::LOCAL_FILE_HEADER_SIGNATURE
                || magic == Magic::CENTRAL_DIRECTORY_HEADER_SIGNATURE
            {
                // The next header; a descriptor without its optional
                // signature sits right before it.
                cut = Some(i.saturating_sub(expected_dd_len));
                break;
            }
            if magic == Magic::DATA_DESCRIPTOR_SIGNATURE {
                cut = Some(i);
                break;
            }
        }
        let Some(cut) = cut else {
            return Ok(false);
        };

        self.source.unread(&self.buf.buf[cut..valid]);
        content.extend_from_slice(&self.buf.buf[..cut]);
        self.read_data_descriptor()?;
        Ok(true)
    }

    /// Keeps a window that could still hold a descriptor plus a signature
    /// split across reads (three bytes in the worst case) at the front of
    /// the buffer and appends everything before it to `content`. Returns the
    /// new fill offset.
    fn cache_bytes_read(
        &mut self,
        content: &mut Vec<u8>,
        offset: usize,
        last_read: usize,
        expected_dd_len: usize,
    ) -> usize {
        let keep = expected_dd_len + 3;
        let valid = offset + last_read;
        if valid > keep {
            let cacheable = valid - keep;
            content.extend_from_slice(&self.buf.buf[..cacheable]);
            self.buf.buf.copy_within(cacheable..valid, 0);
            keep
        } else {
            valid
        }
    }

    /// Reads the stream past the central directory and the
    /// end-of-central-directory record, consuming the archive comment.
    fn skip_remainder_of_archive(&mut self) -> ZipResult<()> {
        // One central header has already been consumed as a would-be LFH.
        // The skip deliberately ignores the name, extra and comment bytes of
        // each central header; the signature scan below absorbs the
        // shortfall.
        self.real_skip(
            (self.entries_read * CENTRAL_FILE_HEADER_LEN as u64)
                .saturating_sub(LOCAL_FILE_HEADER_LEN as u64),
        )?;
        self.find_eocd_record()?;
        // Fixed EOCD body after the signature, up to the comment length.
        self.real_skip((MIN_EOCD_LEN - 4 - 2) as u64)?;
        let comment_len = self.source.read_u16_le()?;
        self.real_skip(comment_len as u64)?;
        Ok(())
    }

    /// Advances byte by byte until just past the end-of-central-directory
    /// signature, tolerating false starts; a matched first byte that is not
    /// followed by the rest of the signature may itself start a new match.
    /// Returns normally at end of input; the caller notices the truncation
    /// on its next read.
    fn find_eocd_record(&mut self) -> ZipResult<()> {
        let signature = Magic::CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes();
        let mut pending = None;
        loop {
            let byte = match pending.take() {
                Some(byte) => byte,
                None => match self.source.read_one()? {
                    Some(byte) => byte,
                    None => return Ok(()),
                },
            };
            if byte != signature[0] {
                continue;
            }
            let mut matched = 1;
            while matched < signature.len() {
                let Some(next) = self.source.read_one()? else {
                    return Ok(());
                };
                if next == signature[matched] {
                    matched += 1;
                    continue;
                }
                if next == signature[0] {
                    pending = Some(next);
                }
                break;
            }
            if matched == signature.len() {
                return Ok(());
            }
        }
    }

    /// Discards raw source bytes, bypassing entry decompression. Stops
    /// silently at end of input.
    fn real_skip(&mut self, count: u64) -> ZipResult<()> {
        io::copy(&mut self.source.by_ref().take(count), &mut io::sink())?;
        Ok(())
    }

    fn read_fully(&mut self, buf: &mut [u8]) -> ZipResult<()> {
        self.source.read_exact(buf)?;
        Ok(())
    }
}

fn supports_data_descriptor_for(config: &Config, entry: &ZipEntry) -> bool {
    config.allow_stored_entries_with_data_descriptor
        || !entry.using_data_descriptor
        || entry.compression_method == CompressionMethod::Deflated
}

impl<R: Read> Read for ZipStreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ZipStreamReader::read(self, buf).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn test_entry() -> ZipEntry {
        ZipEntry {
            system: System::Dos,
            flags: 1 << 3,
            encrypted: false,
            is_utf8: false,
            using_data_descriptor: true,
            compression_method: CompressionMethod::Stored,
            last_modified_time: None,
            crc32: None,
            compressed_size: None,
            uncompressed_size: None,
            file_name: "entry".into(),
            file_name_raw: b"entry"[..].into(),
            extra_field: Box::default(),
            uses_zip64: false,
        }
    }

    fn reader_over(bytes: Vec<u8>) -> ZipStreamReader<Cursor<Vec<u8>>> {
        let mut reader = ZipStreamReader::new(Cursor::new(bytes));
        reader.current = Some(CurrentEntry {
            entry: test_entry(),
            has_data_descriptor: true,
            uses_zip64: false,
            bytes_read: 0,
            bytes_read_from_stream: 0,
            inflater_finished: false,
        });
        reader
    }

    #[test]
    fn prefix_matching() {
        assert!(matches_archive_prefix(b"PK\x03\x04rest"));
        assert!(matches_archive_prefix(b"PK\x05\x06"));
        assert!(matches_archive_prefix(b"PK\x07\x08"));
        assert!(matches_archive_prefix(b"PK00"));
        assert!(!matches_archive_prefix(b"PK\x01\x02"));
        assert!(!matches_archive_prefix(b"PK\x03"));
        assert!(!matches_archive_prefix(b"garbage!"));
    }

    #[test]
    fn eocd_scan_survives_false_starts() {
        let bytes = vec![0x00, 0x50, 0x4b, 0x05, 0x50, 0x4b, 0x05, 0x06, 0xaa];
        let mut reader = ZipStreamReader::new(Cursor::new(bytes));
        reader.find_eocd_record().unwrap();
        assert_eq!(reader.source.read_one().unwrap(), Some(0xaa));
    }

    #[test]
    fn eocd_scan_stops_at_end_of_input() {
        let mut reader = ZipStreamReader::new(Cursor::new(vec![0x50, 0x4b, 0x05]));
        reader.find_eocd_record().unwrap();
        assert_eq!(reader.source.read_one().unwrap(), None);
    }

    #[test]
    fn data_descriptor_with_signature_and_short_sizes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&Magic::DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&0x11223344u32.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&200u32.to_le_bytes());
        bytes.extend_from_slice(&Magic::LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);

        let mut reader = reader_over(bytes);
        reader.read_data_descriptor().unwrap();

        let entry = reader.current_entry().unwrap();
        assert_eq!(entry.crc32(), Some(0x11223344));
        assert_eq!(entry.compressed_size(), Some(100));
        assert_eq!(entry.size(), Some(200));

        // The look-ahead must have been handed back byte-exact.
        let mut rest = [0u8; 4];
        reader.source.read_exact(&mut rest).unwrap();
        assert_eq!(Magic::from_le_bytes(rest), Magic::LOCAL_FILE_HEADER_SIGNATURE);
    }

    #[test]
    fn data_descriptor_without_signature_and_long_sizes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xcafebabeu32.to_le_bytes());
        bytes.extend_from_slice(&5_000_000_000u64.to_le_bytes());
        bytes.extend_from_slice(&6_000_000_000u64.to_le_bytes());

        let mut reader = reader_over(bytes);
        reader.read_data_descriptor().unwrap();

        let entry = reader.current_entry().unwrap();
        assert_eq!(entry.crc32(), Some(0xcafebabe));
        assert_eq!(entry.compressed_size(), Some(5_000_000_000));
        assert_eq!(entry.size(), Some(6_000_000_000));
        assert_eq!(reader.source.read_one().unwrap(), None);
    }

    #[test]
    fn cache_bytes_read_retains_descriptor_window() {
        let mut reader = reader_over(Vec::new());
        let filled: Vec<u8> = (0u8..100).collect();
        reader.buf.buf[..filled.len()].copy_from_slice(&filled);

        let mut content = Vec::new();
        let offset = reader.cache_bytes_read(&mut content, 0, filled.len(), 12);
        assert_eq!(offset, 15);
        assert_eq!(content, (0u8..85).collect::<Vec<u8>>());
        assert_eq!(&reader.buf.buf[..15], (85u8..100).collect::<Vec<u8>>().as_slice());
    }

    #[test]
    fn cache_bytes_read_keeps_short_fills() {
        let mut reader = reader_over(Vec::new());
        let mut content = Vec::new();
        let offset = reader.cache_bytes_read(&mut content, 0, 10, 12);
        assert_eq!(offset, 10);
        assert!(content.is_empty());
    }
}
