//! Immutable, randomly addressable input for the matching engine.
//!
//! A [`Source`] owns the full contents of whatever is being parsed. Every
//! lookup takes the position to inspect explicitly and never advances any
//! shared cursor, so a failed alternative can be retried at the same offset
//! without observing anything the previous attempt did.

use regex::bytes::Regex;
use std::io::{self, Read};

/// The bytes being matched, materialized up front.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Source {
    buf: Vec<u8>,
}

impl Source {
    /// Reads `reader` to the end and wraps its contents.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`io::Error`] if reading fails.
    pub fn new<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self { buf })
    }

    /// Wraps bytes that are already in memory.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { buf: bytes.into() }
    }

    /// Total length of the input in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if the input is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The whole input.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Matches `literal` exactly at `pos`.
    ///
    /// Returns the matched slice (whose length is the number of bytes
    /// consumed), or `None` if the input at `pos` differs or is too short.
    #[must_use]
    pub fn consume_literal(&self, literal: &[u8], pos: usize) -> Option<&[u8]> {
        let end = pos.checked_add(literal.len())?;
        let candidate = self.buf.get(pos..end)?;
        (candidate == literal).then_some(candidate)
    }

    /// Matches `pattern` starting exactly at `pos`.
    ///
    /// The match must begin at `pos`; a match found further along the input
    /// is treated as no match at all.
    #[must_use]
    pub fn consume_pattern(&self, pattern: &Regex, pos: usize) -> Option<&[u8]> {
        let rest = self.buf.get(pos..)?;
        let found = pattern.find(rest)?;
        (found.start() == 0).then(|| &rest[..found.end()])
    }

    /// Up to `width` bytes of input starting at `pos`, for diagnostics.
    #[must_use]
    pub fn neighborhood(&self, pos: usize, width: usize) -> &[u8] {
        let start = pos.min(self.buf.len());
        let end = start.saturating_add(width).min(self.buf.len());
        &self.buf[start..end]
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }
}

impl From<&[u8]> for Source {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_literal_at_offset() {
        let source = Source::from("let x = 1");
        assert_eq!(source.consume_literal(b"x", 4), Some(&b"x"[..]));
        assert_eq!(source.consume_literal(b"x", 3), None);
        assert_eq!(source.consume_literal(b"1", 8), Some(&b"1"[..]));
    }

    #[test]
    fn test_consume_literal_past_end() {
        let source = Source::from("ab");
        assert_eq!(source.consume_literal(b"abc", 0), None);
        assert_eq!(source.consume_literal(b"b", 5), None);
        assert_eq!(source.consume_literal(b"", 2), Some(&b""[..]));
    }

    #[test]
    fn test_consume_pattern_is_anchored() {
        let source = Source::from("abc123");
        let digits = Regex::new(r"\d+").unwrap();
        assert_eq!(source.consume_pattern(&digits, 0), None);
        assert_eq!(source.consume_pattern(&digits, 3), Some(&b"123"[..]));
        assert_eq!(source.consume_pattern(&digits, 4), Some(&b"23"[..]));
    }

    #[test]
    fn test_reads_from_reader() {
        let source = Source::new(&b"from a reader"[..]).unwrap();
        assert_eq!(source.len(), 13);
        assert_eq!(source.neighborhood(5, 3), b"a r");
        assert_eq!(source.neighborhood(12, 10), b"r");
        assert_eq!(source.neighborhood(40, 10), b"");
    }
}
