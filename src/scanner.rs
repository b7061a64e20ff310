//! Byte cursor shared by the streaming body decoders.
//!
//! A [`ByteScanner`] accumulates incoming chunks in a single `BytesMut` and lets
//! a decoder look for delimiters, split off complete tokens, and defer when the
//! token it is waiting for has not fully arrived yet. Deferral is bounded: once
//! the scanner has missed twice in a row while holding at least
//! [`DEFER_LIMIT`] unresolved bytes, lookups fail with [`Overflow`] so a peer
//! cannot grow the buffer without ever sending the delimiter.

use bytes::{Buf, Bytes, BytesMut};
use std::fmt;

/// Line terminator used by form headers.
pub const CRLF: &[u8] = b"\r\n";

/// Unresolved bytes tolerated before a repeated miss becomes fatal (64 KiB).
pub const DEFER_LIMIT: usize = 64 * 1024;

/// Consecutive misses required before [`DEFER_LIMIT`] is enforced.
pub const DEFER_MISSES: u8 = 2;

/// Raised when a delimiter is still missing after the buffer crossed [`DEFER_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    /// Bytes held when the scanner gave up
    pub buffered: usize,
}

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delimiter not found in {} buffered bytes (limit {})",
            self.buffered, DEFER_LIMIT
        )
    }
}

impl std::error::Error for Overflow {}

/// Accumulating buffer with delimiter search and bounded deferral.
#[derive(Debug, Default)]
pub struct ByteScanner {
    buf: BytesMut,
    misses: u8,
}

impl ByteScanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the unresolved tail.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.buf.starts_with(prefix)
    }

    /// Position of `needle` in the buffer without touching the miss counter.
    #[must_use]
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        find(&self.buf, needle)
    }

    /// Position of `needle`, counting a miss when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Overflow`] on the second consecutive miss once the buffer
    /// holds at least [`DEFER_LIMIT`] bytes.
    pub fn find_or_defer(&mut self, needle: &[u8]) -> Result<Option<usize>, Overflow> {
        match find(&self.buf, needle) {
            Some(pos) => {
                self.misses = 0;
                Ok(Some(pos))
            }
            None => {
                self.misses = self.misses.saturating_add(1);
                if self.misses >= DEFER_MISSES && self.buf.len() >= DEFER_LIMIT {
                    Err(Overflow {
                        buffered: self.buf.len(),
                    })
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Split off the bytes before `needle` and drop the needle itself.
    ///
    /// # Errors
    ///
    /// See [`ByteScanner::find_or_defer`].
    pub fn take_until(&mut self, needle: &[u8]) -> Result<Option<Bytes>, Overflow> {
        let Some(pos) = self.find_or_defer(needle)? else {
            return Ok(None);
        };
        let token = self.buf.split_to(pos).freeze();
        self.buf.advance(needle.len());
        Ok(Some(token))
    }

    /// Next CRLF-terminated line, terminator excluded.
    ///
    /// # Errors
    ///
    /// See [`ByteScanner::find_or_defer`].
    pub fn take_line(&mut self) -> Result<Option<Bytes>, Overflow> {
        self.take_until(CRLF)
    }

    /// Split off the first `n` bytes.
    pub fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buf.len());
        self.buf.split_to(n).freeze()
    }

    /// Discard the first `n` bytes.
    pub fn skip(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Drop everything buffered and reset the miss counter.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.misses = 0;
    }
}

/// First occurrence of `needle` in `haystack`.
#[must_use]
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
