//! Strip and restore
//!
//! Stripping copies the payload range of a stream through a 4-byte buffer,
//! placing each byte according to the rule's [`Operation`]. Every full group
//! is flushed as-is; a trailing partial group is flushed in index order
//! without further reordering.
//!
//! Restoring is plain concatenation of a saved header, the payload and an
//! optional trailer. It never inverts an operation.

use crate::core::error::Result;
use crate::core::offset::stream_length;
use crate::core::rule::{Operation, Rule};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

const GROUP: usize = 4;

/// Rolling 4-byte group used while stripping
#[derive(Debug, Clone)]
pub struct TransformBuffer {
    operation: Operation,
    buffer: [u8; GROUP],
    pos: usize,
}

impl TransformBuffer {
    pub fn new(operation: Operation) -> Self {
        TransformBuffer {
            operation,
            buffer: [0; GROUP],
            pos: 0,
        }
    }

    /// Place one byte; returns the finished group every fourth byte
    pub fn push(&mut self, byte: u8) -> Option<[u8; GROUP]> {
        let pos = self.pos;
        match self.operation {
            Operation::None => self.buffer[pos] = byte,
            Operation::Bitswap => self.buffer[pos] = byte.reverse_bits(),
            Operation::Byteswap => {
                if pos % 2 == 1 {
                    self.buffer[pos - 1] = byte;
                } else {
                    self.buffer[pos + 1] = byte;
                }
            }
            Operation::Wordswap => self.buffer[GROUP - 1 - pos] = byte,
            Operation::WordByteswap => self.buffer[(pos + 2) % GROUP] = byte,
        }

        self.pos = (pos + 1) % GROUP;
        if self.pos == 0 {
            Some(std::mem::replace(&mut self.buffer, [0; GROUP]))
        } else {
            None
        }
    }

    /// The first `pos` slots of an unfinished group, as placed
    pub fn tail(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }
}

/// Apply `operation` to a byte slice the same way [`strip`] does
///
/// # Examples
///
/// ```
/// use cartridge_headers::{transform_bytes, Operation};
///
/// assert_eq!(transform_bytes(Operation::Byteswap, b"ABCD"), b"BADC");
/// assert_eq!(transform_bytes(Operation::Wordswap, b"ABCD"), b"DCBA");
/// assert_eq!(transform_bytes(Operation::WordByteswap, b"ABCD"), b"CDAB");
/// ```
pub fn transform_bytes(operation: Operation, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut buffer = TransformBuffer::new(operation);
    for &byte in data {
        if let Some(group) = buffer.push(byte) {
            out.extend_from_slice(&group);
        }
    }
    out.extend_from_slice(buffer.tail());
    out
}

/// Write the transformed payload of `input` to `output`
///
/// The payload runs from the rule's start offset up to its end offset
/// (clamped to the stream length). Size and parity checks run before
/// anything is written. Returns the number of bytes written.
///
/// On an I/O error part of the payload may already be in `output`; callers
/// writing to files remove them.
pub fn strip<R, W>(rule: &Rule, input: &mut R, output: &mut W) -> Result<u64>
where
    R: Read + Seek + ?Sized,
    W: Write + ?Sized,
{
    let length = stream_length(input)?;
    rule.check_transformable(length)?;

    let start = rule.start_position(length)?;
    let end = rule.end_position(length);
    let span = end.saturating_sub(start);
    input.seek(SeekFrom::Start(start))?;

    debug!(
        "Stripping {} bytes ({}..{}) with {}",
        span, start, end, rule.operation
    );

    let reader = BufReader::new(Read::take(&mut *input, span));
    let mut writer = BufWriter::new(output);
    let mut buffer = TransformBuffer::new(rule.operation);
    let mut written = 0u64;

    for byte in reader.bytes() {
        if let Some(group) = buffer.push(byte?) {
            writer.write_all(&group)?;
            written += GROUP as u64;
        }
    }
    writer.write_all(buffer.tail())?;
    written += buffer.tail().len() as u64;
    writer.flush()?;

    Ok(written)
}

/// Write `header`, all of `input`, then `trailer` to `output`
///
/// Returns the number of bytes written.
pub fn restore<R, W>(input: &mut R, output: &mut W, header: &[u8], trailer: &[u8]) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut writer = BufWriter::new(output);
    writer.write_all(header)?;
    let copied = io::copy(input, &mut writer)?;
    writer.write_all(trailer)?;
    writer.flush()?;

    Ok(header.len() as u64 + copied + trailer.len() as u64)
}

/// [`strip`] between two files
///
/// The output file is only created once the size checks pass.
pub fn strip_file<P: AsRef<Path>, Q: AsRef<Path>>(rule: &Rule, input: P, output: Q) -> Result<u64> {
    let mut input = File::open(input)?;
    let length = stream_length(&mut input)?;
    rule.check_transformable(length)?;

    let mut output = File::create(output)?;
    let written = strip(rule, &mut input, &mut output)?;
    output.sync_all()?;
    Ok(written)
}

/// [`restore`] between two files
pub fn restore_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    header: &[u8],
    trailer: &[u8],
) -> Result<u64> {
    let mut input = File::open(input)?;
    let mut output = File::create(output)?;
    let written = restore(&mut input, &mut output, header, trailer)?;
    output.sync_all()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HeaderError;
    use crate::core::offset::Offset;
    use std::io::Cursor;

    fn run_strip(rule: &Rule, data: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        strip(rule, &mut Cursor::new(data.to_vec()), &mut output)?;
        Ok(output)
    }

    #[test]
    fn test_bitswap_reverses_bits() {
        assert_eq!(
            transform_bytes(Operation::Bitswap, &[0b0000_0001, 0b1100_0000, 0xF0]),
            vec![0b1000_0000, 0b0000_0011, 0x0F]
        );
    }

    #[test]
    fn test_partial_tail_is_flushed_as_placed() {
        // Wordswap writes slots 3, 2, 1; slot 0 is still empty
        assert_eq!(
            transform_bytes(Operation::Wordswap, b"ABCDxyz"),
            b"DCBA\x00zy".to_vec()
        );
        // Byteswap puts the odd last byte in slot 1
        assert_eq!(
            transform_bytes(Operation::Byteswap, b"ABCDE"),
            b"BADC\x00".to_vec()
        );
        // WordByteswap writes slots 2, 3 for a two-byte tail
        assert_eq!(
            transform_bytes(Operation::WordByteswap, b"ABCDxy"),
            b"CDAB\x00\x00".to_vec()
        );
        assert_eq!(transform_bytes(Operation::None, b"ABCDEF"), b"ABCDEF".to_vec());
    }

    #[test]
    fn test_strip_removes_header() {
        let rule = Rule::for_header_length(4, Operation::None);
        assert_eq!(run_strip(&rule, b"HDR!payload").unwrap(), b"payload".to_vec());
    }

    #[test]
    fn test_strip_honors_end_offset() {
        let rule = Rule::new(Offset::At(2), Some(Offset::At(-2)), Operation::None);
        assert_eq!(run_strip(&rule, b"..middle..").unwrap(), b"middle".to_vec());

        let rule = Rule::new(Offset::At(2), Some(Offset::At(1)), Operation::None);
        assert_eq!(run_strip(&rule, b"abcdef").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_strip_negative_start() {
        let rule = Rule::new(Offset::At(-3), None, Operation::None);
        assert_eq!(run_strip(&rule, b"abcdef").unwrap(), b"def".to_vec());
    }

    #[test]
    fn test_strip_start_out_of_range() {
        let rule = Rule::for_header_length(100, Operation::None);
        assert!(matches!(
            run_strip(&rule, b"short"),
            Err(HeaderError::SeekOutOfRange { .. })
        ));
    }

    #[test]
    fn test_strip_eof_start_without_operation_is_empty() {
        let rule = Rule::new(Offset::Eof, None, Operation::None);
        assert_eq!(run_strip(&rule, b"abcdef").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_strip_precondition_writes_nothing() {
        let rule = Rule::new(Offset::At(0), None, Operation::Byteswap);
        let mut output = Vec::new();
        let err = strip(&rule, &mut Cursor::new(vec![0u8; 8]), &mut output).unwrap_err();
        assert!(matches!(err, HeaderError::SizePrecondition { .. }));
        assert!(output.is_empty());
    }

    #[test]
    fn test_strip_byteswap_from_odd_start() {
        let rule = Rule::new(Offset::At(1), None, Operation::Byteswap);
        // Payload is 7 bytes: one full group plus a 3-byte tail
        let out = run_strip(&rule, b"_ABCDEFG").unwrap();
        assert_eq!(out, b"BADCFE\x00".to_vec());
    }

    #[test]
    fn test_strip_reports_bytes_written() {
        let rule = Rule::for_header_length(2, Operation::Bitswap);
        let mut output = Vec::new();
        let written = strip(&rule, &mut Cursor::new(vec![1u8; 11]), &mut output).unwrap();
        assert_eq!(written, 9);
        assert_eq!(output, vec![0x80; 9]);
    }

    #[test]
    fn test_restore_concatenates() {
        let mut output = Vec::new();
        let written = restore(
            &mut Cursor::new(b"payload".to_vec()),
            &mut output,
            b"HDR",
            b"END",
        )
        .unwrap();
        assert_eq!(output, b"HDRpayloadEND".to_vec());
        assert_eq!(written, 13);
    }

    #[test]
    fn test_strip_then_restore_round_trip() {
        let mut original = b"NES\x1A".to_vec();
        original.resize(0x10, 0x11);
        original.extend((0..200u8).collect::<Vec<_>>());

        let rule = Rule::for_header_length(0x10, Operation::None);
        let payload = run_strip(&rule, &original).unwrap();
        let mut rebuilt = Vec::new();
        restore(&mut Cursor::new(payload), &mut rebuilt, &original[..0x10], &[]).unwrap();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_file_variants() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("game.nes");
        let stripped = dir.path().join("game.nes.new");
        let rebuilt = dir.path().join("game.nes.0.new");
        std::fs::write(&source, b"HEADERpayload").unwrap();

        let rule = Rule::for_header_length(6, Operation::None);
        assert_eq!(strip_file(&rule, &source, &stripped).unwrap(), 7);
        assert_eq!(std::fs::read(&stripped).unwrap(), b"payload");

        restore_file(&stripped, &rebuilt, b"HEADER", &[]).unwrap();
        assert_eq!(std::fs::read(&rebuilt).unwrap(), b"HEADERpayload");
    }

    #[test]
    fn test_strip_file_precondition_creates_no_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("odd.bin");
        let output = dir.path().join("odd.bin.new");
        std::fs::write(&source, [0u8; 7]).unwrap();

        let rule = Rule::new(Offset::At(1), None, Operation::Byteswap);
        assert!(strip_file(&rule, &source, &output).is_err());
        assert!(!output.exists());
    }
}
