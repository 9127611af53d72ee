//! A forward byte source that supports unreading recently consumed bytes.
//!
//! The streaming reader routinely looks a little past the end of the record
//! it is parsing (data descriptors, inflater over-reads). Those bytes are
//! returned here and re-delivered byte-exact before anything else is pulled
//! from the wrapped stream.

use std::collections::VecDeque;
use std::io::{self, Read};

pub(crate) struct PushbackReader<R> {
    inner: R,
    pushed: VecDeque<u8>,
}

impl<R> PushbackReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            pushed: VecDeque::new(),
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }

    /// Returns `bytes` to the front of the stream. The earliest byte of the
    /// slice is the next one read; chunks unread later are delivered before
    /// chunks unread earlier.
    pub(crate) fn unread(&mut self, bytes: &[u8]) {
        for &byte in bytes.iter().rev() {
            self.pushed.push_front(byte);
        }
    }
}

impl<R: Read> PushbackReader<R> {
    /// Reads a single byte, `None` at end of input.
    pub(crate) fn read_one(&mut self) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pushed.pop_front() {
            return Ok(Some(byte));
        }
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Read for PushbackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pushed.is_empty() {
            let count = self.pushed.len().min(buf.len());
            for slot in buf[..count].iter_mut() {
                *slot = self.pushed.pop_front().unwrap_or_default();
            }
            return Ok(count);
        }
        self.inner.read(buf)
    }
}
