//! Byte ranges
//!
//! Parses single `Range: bytes=...` requests and resolves them against a
//! file length.

use crate::error::ServeError;

/// A range as written by the client, before the file length is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=a-b`
    FromTo(u64, u64),
    /// `bytes=a-`
    From(u64),
    /// `bytes=-n`, the last `n` bytes
    Suffix(u64),
}

/// An inclusive byte window inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a file of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parses a `Range` header value.
///
/// Returns `None` when the header should be ignored: other units, syntax
/// errors, inverted bounds and multi-range requests all fall back to a full
/// response.
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let value = value.trim();
    let (unit, spec) = value.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
        return None;
    }

    let (first, last) = spec.trim().split_once('-')?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        return last.parse().ok().map(RangeSpec::Suffix);
    }

    let start: u64 = first.parse().ok()?;
    if last.is_empty() {
        return Some(RangeSpec::From(start));
    }

    let end: u64 = last.parse().ok()?;
    if end < start {
        return None;
    }
    Some(RangeSpec::FromTo(start, end))
}

impl RangeSpec {
    /// Clamps the range to a file of `len` bytes.
    pub fn resolve(self, len: u64) -> Result<ByteRange, ServeError> {
        let unsatisfiable = ServeError::RangeNotSatisfiable(len);
        if len == 0 {
            return Err(unsatisfiable);
        }
        let last = len - 1;

        match self {
            RangeSpec::FromTo(start, end) if start <= last => Ok(ByteRange {
                start,
                end: end.min(last),
            }),
            RangeSpec::From(start) if start <= last => Ok(ByteRange { start, end: last }),
            RangeSpec::Suffix(n) if n > 0 => Ok(ByteRange {
                start: len.saturating_sub(n),
                end: last,
            }),
            _ => Err(unsatisfiable),
        }
    }
}
