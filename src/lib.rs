//! A streaming reader for ZIP archives.
//!
//! This crate consumes a ZIP archive as a forward-only byte stream: entries
//! and their decompressed content are yielded in file order without the
//! source ever seeking backwards. That makes it suitable for input a
//! seekable reader cannot handle at all — sockets, pipes, process output,
//! archives nested in other streams.
//!
//! Supported along the way:
//!
//! * entries whose sizes only follow the payload in a *data descriptor*,
//!   including STORED ones (behind
//!   [`Config::allow_stored_entries_with_data_descriptor`]);
//! * ZIP64 size fields for entries past the 4 GiB mark;
//! * the `PK00` single-segment split marker some writers emit;
//! * names in UTF-8, IBM code page 437 or Info-ZIP Unicode Path extras;
//! * clean termination: the trailing central directory and the
//!   end-of-central-directory record are consumed, leaving the stream
//!   positioned after the archive.
//!
//! Entries are decompressed with [`flate2`] and checksummed with
//! [`crc32fast`]. Encryption, compression methods other than STORED and
//! DEFLATED, and true multi-segment archives are out of scope; such entries
//! are still enumerated and can be skipped over.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//!
//! fn extract_names(path: &str) -> zipstream::ZipResult<Vec<String>> {
//!     let mut reader = zipstream::ZipStreamReader::new(File::open(path)?);
//!     let mut names = Vec::new();
//!     while let Some(entry) = reader.next_entry()? {
//!         names.push(entry.name().to_string());
//!     }
//!     Ok(names)
//! }
//! ```
#![warn(missing_docs)]

mod spec;

mod compression;
mod cp437;
pub mod extra_fields;
pub mod read;
pub mod result;
pub mod types;

pub use crate::compression::CompressionMethod;
pub use crate::read::stream::{matches_archive_prefix, ZipStreamReader};
pub use crate::read::{Config, NameEncoding};
pub use crate::result::{UnsupportedFeature, ZipError, ZipResult};
pub use crate::types::{DateTime, System, ZipEntry};
