//! Bounded accumulators for captured payload prefixes.
//!
//! An accumulator is a best-effort "capture what fits" sink: appends beyond
//! the configured capacity are silently dropped and never error, preserving
//! the already-captured prefix. The goal is observability, not faithful
//! reproduction of arbitrarily large payloads.

use bytes::Bytes;

use crate::content::Charset;

/// A growable byte buffer capped at a fixed maximum size.
///
/// The backing storage grows on demand (doubling, via `Vec`) but reserves
/// no more than `capacity` up front, so idle streams stay cheap.
///
/// Invariant: `len() <= capacity()` after any sequence of appends, and the
/// retained content equals the first `capacity` bytes of the logical
/// concatenation of all appended data, regardless of chunking.
#[derive(Debug)]
pub struct BoundedByteAccumulator {
    buf: Vec<u8>,
    capacity: usize,
}

impl BoundedByteAccumulator {
    /// Create an empty accumulator that will retain at most `capacity`
    /// bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
        }
    }

    /// Copy up to `capacity - len()` bytes from `chunk` into the buffer,
    /// ignoring the remainder. Returns the number of bytes retained.
    ///
    /// A full buffer is not an error; the append simply retains nothing.
    pub fn append(&mut self, chunk: &[u8]) -> usize {
        let room = self.capacity - self.buf.len();
        let take = room.min(chunk.len());
        if take > 0 {
            self.buf.extend_from_slice(&chunk[..take]);
        }
        take
    }

    /// Current number of retained bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The configured maximum size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The captured prefix.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Freeze the captured prefix into an immutable handle.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }

    /// Render the captured prefix with the supplied decoder.
    pub fn decode(&self, charset: Charset) -> String {
        charset.decode(&self.buf)
    }
}

/// The character-oriented variant of [`BoundedByteAccumulator`].
///
/// Capacity and length are counted in `char` units, not bytes, so a
/// multi-byte character consumes one unit of capacity.
#[derive(Debug)]
pub struct BoundedCharAccumulator {
    buf: String,
    // Cached char count; String::chars().count() is O(n).
    len: usize,
    capacity: usize,
}

impl BoundedCharAccumulator {
    /// Create an empty accumulator that will retain at most `capacity`
    /// characters.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            len: 0,
            capacity,
        }
    }

    /// Copy up to `capacity - len()` characters from `chunk`, ignoring the
    /// remainder. Returns the number of characters retained.
    pub fn append_chars(&mut self, chunk: &str) -> usize {
        let room = self.capacity - self.len;
        let mut taken = 0;
        for ch in chunk.chars().take(room) {
            self.buf.push(ch);
            taken += 1;
        }
        self.len += taken;
        taken
    }

    /// Current number of retained characters.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The configured maximum size in characters.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The captured prefix.
    pub fn as_str(&self) -> &str {
        &self.buf
    }
}
