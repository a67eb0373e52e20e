//! Stream offsets used by rules and tests
//!
//! An offset is either a signed byte position or the end-of-file sentinel:
//!
//! - `EOF` seeks to the end of the stream
//! - a non-negative value seeks from the start
//! - a negative value seeks back from the end, valid only while
//!   `abs(offset) <= length`

use crate::core::error::{HeaderError, Result};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::io::{Seek, SeekFrom};
use std::str::FromStr;

/// Signed stream position or end-of-file sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Offset {
    /// End of the stream
    Eof,
    /// Signed position; negative values count back from the end
    At(i64),
}

impl Offset {
    /// Offset zero (start of stream)
    pub const START: Offset = Offset::At(0);

    /// Resolve against a stream length, returning the absolute position
    ///
    /// Returns `None` when the position falls outside `0..=length`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartridge_headers::Offset;
    ///
    /// assert_eq!(Offset::At(0x10).resolve(100), Some(16));
    /// assert_eq!(Offset::At(-4).resolve(100), Some(96));
    /// assert_eq!(Offset::Eof.resolve(100), Some(100));
    /// assert_eq!(Offset::At(-101).resolve(100), None);
    /// ```
    pub fn resolve(self, length: u64) -> Option<u64> {
        match self {
            Offset::Eof => Some(length),
            Offset::At(value) if value >= 0 => {
                let value = value as u64;
                (value <= length).then_some(value)
            }
            Offset::At(value) => {
                let back = value.unsigned_abs();
                (back <= length).then(|| length - back)
            }
        }
    }

    /// Seek `stream` to this offset
    ///
    /// `length` is the total stream length, passed in so callers that
    /// evaluate many offsets only measure the stream once.
    pub fn seek<S: Seek + ?Sized>(self, stream: &mut S, length: u64) -> Result<u64> {
        let position = self.resolve(length).ok_or_else(|| HeaderError::SeekOutOfRange {
            offset: self.to_string(),
            length,
        })?;
        Ok(stream.seek(SeekFrom::Start(position))?)
    }

    /// True for the end-of-file sentinel
    pub fn is_eof(self) -> bool {
        matches!(self, Offset::Eof)
    }
}

impl Default for Offset {
    fn default() -> Self {
        Offset::START
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset::At(value)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Eof => write!(f, "EOF"),
            Offset::At(value) if *value < 0 => write!(f, "-0x{:X}", value.unsigned_abs()),
            Offset::At(value) => write!(f, "0x{:X}", value),
        }
    }
}

impl FromStr for Offset {
    type Err = HeaderError;

    /// Parse `EOF` (any case) or a hex number with optional `-` and `0x`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("eof") {
            return Ok(Offset::Eof);
        }
        parse_hex_number(trimmed)
            .map(Offset::At)
            .ok_or_else(|| HeaderError::InvalidOffset(s.to_string()))
    }
}

/// Parse a hex number: optional leading `-`, optional `0x`, hex digits
pub(crate) fn parse_hex_number(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let magnitude = u64::from_str_radix(digits, 16).ok()?;
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// Total length of a seekable stream, leaving its position unchanged
pub fn stream_length<S: Seek + ?Sized>(stream: &mut S) -> std::io::Result<u64> {
    let current = stream.stream_position()?;
    let end = stream.seek(SeekFrom::End(0))?;
    if current != end {
        stream.seek(SeekFrom::Start(current))?;
    }
    Ok(end)
}

/// Offsets in rule documents are either text (`"EOF"`, `"1A"`, `"-0x10"`)
/// or plain integers, which are read as decimal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum OffsetText {
    Number(i64),
    Text(String),
}

impl OffsetText {
    pub fn to_offset(&self) -> Result<Offset> {
        match self {
            OffsetText::Number(value) => Ok(Offset::At(*value)),
            OffsetText::Text(text) => text.parse(),
        }
    }
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        OffsetText::deserialize(deserializer)?
            .to_offset()
            .map_err(serde::de::Error::custom)
    }
}
