//! Rules: a set of tests plus the byte range and transform they unlock

use crate::core::error::{HeaderError, Result};
use crate::core::offset::{stream_length, Offset};
use crate::core::rule_test::Test;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::str::FromStr;
use tracing::debug;

/// Byte transform applied to the payload while stripping
///
/// Variants are ordered by strength; size checks compare against this
/// ordering (anything above `Bitswap` needs an even length, anything
/// above `Byteswap` a multiple of four).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Operation {
    #[default]
    None,
    /// Reverse the bit order of every byte
    Bitswap,
    /// Swap adjacent bytes: `AB CD` -> `BA DC`
    Byteswap,
    /// Reverse each 4-byte group: `ABCD` -> `DCBA`
    Wordswap,
    /// Rotate each 4-byte group by two: `ABCD` -> `CDAB`
    WordByteswap,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::None => "none",
            Operation::Bitswap => "bitswap",
            Operation::Byteswap => "byteswap",
            Operation::Wordswap => "wordswap",
            Operation::WordByteswap => "wordbyteswap",
        };
        f.write_str(name)
    }
}

impl FromStr for Operation {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Operation::None),
            "bitswap" => Ok(Operation::Bitswap),
            "byteswap" => Ok(Operation::Byteswap),
            "wordswap" => Ok(Operation::Wordswap),
            "wordbyteswap" => Ok(Operation::WordByteswap),
            _ => Err(HeaderError::InvalidOperation(s.to_string())),
        }
    }
}

/// An ordered list of tests and the transform to apply when all pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    /// First payload byte; everything before it is the header
    pub start_offset: Offset,
    /// One past the last payload byte (`None` = end of stream)
    pub end_offset: Option<Offset>,
    pub operation: Operation,
    pub tests: Vec<Test>,
    /// Identifier of the detector this rule came from
    pub source_id: String,
}

impl Rule {
    /// Create a rule with no tests
    ///
    /// # Examples
    ///
    /// ```
    /// use cartridge_headers::{Offset, Operation, Rule, Test};
    ///
    /// let rule = Rule::new(Offset::At(0x10), None, Operation::None)
    ///     .with_test(Test::data(Offset::At(0), b"NES\x1A".to_vec()));
    /// assert_eq!(rule.tests.len(), 1);
    /// ```
    pub fn new(start_offset: Offset, end_offset: Option<Offset>, operation: Operation) -> Self {
        Rule {
            start_offset,
            end_offset,
            operation,
            tests: Vec::new(),
            source_id: String::new(),
        }
    }

    /// Rule that strips a fixed-length header, for callers that only know
    /// the header length and operation
    ///
    /// Lengths past `i64::MAX` saturate; they lie beyond any stream and
    /// fail the start seek.
    pub fn for_header_length(header_length: u64, operation: Operation) -> Self {
        let start = i64::try_from(header_length).unwrap_or(i64::MAX);
        Rule::new(Offset::At(start), None, operation)
    }

    /// Append a test
    pub fn with_test(mut self, test: Test) -> Self {
        self.tests.push(test);
        self
    }

    /// Set the originating source identifier
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// True if every test passes
    ///
    /// The stream is rewound once before the first test; tests then share
    /// the stream position, each seeking to its own offset.
    pub fn matches<S: Read + Seek + ?Sized>(&self, stream: &mut S) -> bool {
        if stream.seek(SeekFrom::Start(0)).is_err() {
            return false;
        }
        self.tests.iter().all(|test| test.evaluate(stream))
    }

    /// Absolute position of the first payload byte for a stream of `length`
    pub fn start_position(&self, length: u64) -> Result<u64> {
        self.start_offset
            .resolve(length)
            .ok_or_else(|| HeaderError::SeekOutOfRange {
                offset: self.start_offset.to_string(),
                length,
            })
    }

    /// Absolute position one past the last payload byte, clamped to `length`
    pub fn end_position(&self, length: u64) -> u64 {
        match self.end_offset {
            None | Some(Offset::Eof) => length,
            Some(Offset::At(value)) if value >= 0 => (value as u64).min(length),
            Some(Offset::At(value)) => length.saturating_sub(value.unsigned_abs()),
        }
    }

    /// Check the size and parity requirements of this rule's operation
    ///
    /// - anything stronger than `Bitswap` needs an even stream length
    /// - anything stronger than `Byteswap` needs a length divisible by 4
    /// - anything stronger than `Bitswap` needs an odd start offset
    /// - any operation other than `None` rejects an `EOF` start
    pub fn check_transformable(&self, length: u64) -> Result<()> {
        let op = self.operation;
        let even_start = match self.start_offset {
            Offset::Eof => true,
            Offset::At(value) => value % 2 == 0,
        };

        let rejected = (op > Operation::Bitswap && length % 2 != 0)
            || (op > Operation::Byteswap && length % 4 != 0)
            || (op > Operation::Bitswap && even_start)
            || (op != Operation::None && self.start_offset.is_eof());

        if rejected {
            debug!(
                "Rule {} ({}) cannot transform {} bytes from {}",
                self.source_id, op, length, self.start_offset
            );
            return Err(HeaderError::SizePrecondition {
                operation: op,
                length,
                start: self.start_offset.to_string(),
            });
        }
        Ok(())
    }

    /// Read the header bytes (`0..start_offset`) from `stream`
    pub fn read_header<S: Read + Seek + ?Sized>(&self, stream: &mut S) -> Result<Vec<u8>> {
        let length = stream_length(stream)?;
        let start = self.start_position(length)?;

        stream.seek(SeekFrom::Start(0))?;
        let mut header = vec![0u8; start as usize];
        stream.read_exact(&mut header)?;
        Ok(header)
    }
}
