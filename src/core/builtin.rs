//! Code-defined detectors for the common copier headers
//!
//! Offsets and magic values follow the long-standing header skipper
//! definitions used by DAT tooling.

use crate::core::detector::Detector;
use crate::core::offset::Offset;
use crate::core::rule::{Operation, Rule};
use crate::core::rule_test::Test;

/// Rule with a single data test and no transform
fn header_rule(start: i64, test_offset: i64, magic: &[u8]) -> Rule {
    Rule::new(Offset::At(start), None, Operation::None)
        .with_test(Test::data(Offset::At(test_offset), magic.to_vec()))
}

/// Rule that transforms the whole stream when the magic is found at 0
fn order_rule(operation: Operation, magic: &[u8]) -> Rule {
    Rule::new(Offset::At(0), None, operation).with_test(Test::data(Offset::At(0), magic.to_vec()))
}

pub fn atari_7800() -> Detector {
    Detector::new("Atari 7800", "Roman Scherzer", "1.0", "a7800")
        .with_rule(header_rule(0x80, 0x01, b"ATARI7800"))
        .with_rule(header_rule(0x80, 0x64, b"ACTUAL CART DATA STARTS HERE"))
}

pub fn famicom_disk_system() -> Detector {
    let mut detector = Detector::new("fds", "Yori Yoshizuki", "1.0", "fds");
    for sides in 1..=4u8 {
        let mut magic = vec![0u8; 16];
        magic[..4].copy_from_slice(b"FDS\x1A");
        magic[4] = sides;
        detector = detector.with_rule(header_rule(0x10, 0, &magic));
    }
    detector
}

pub fn atari_lynx() -> Detector {
    Detector::new("Atari Lynx", "Roman Scherzer", "1.0", "lynx")
        .with_rule(header_rule(0x40, 0x00, b"LYNX"))
        .with_rule(header_rule(0x40, 0x06, b"BS9"))
}

/// Big-endian (`.z64`) dumps are canonical; byte-swapped (`.v64`) and
/// little-endian (`.n64`) dumps are reordered in place.
pub fn nintendo_64() -> Detector {
    Detector::new("Nintendo 64 - ABCD", "CUE", "1.1", "n64")
        .with_rule(order_rule(Operation::None, &[0x80, 0x37, 0x12, 0x40]))
        .with_rule(order_rule(Operation::Byteswap, &[0x37, 0x80, 0x40, 0x12]))
        .with_rule(order_rule(Operation::Wordswap, &[0x40, 0x12, 0x37, 0x80]))
}

pub fn nes() -> Detector {
    Detector::new("Nintendo Famicon/NES", "Roman Scherzer", "1.1", "nes")
        .with_rule(header_rule(0x10, 0, b"NES\x1A"))
}

pub fn pc_engine() -> Detector {
    Detector::new("PC-Engine / Turbografx 16", "Matt Nadareski (darksabre76)", "1.0", "pce")
        .with_rule(header_rule(
            0x200,
            0,
            &[0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xAA, 0xBB, 0x02],
        ))
}

pub fn psid() -> Detector {
    Detector::new("psid", "Yori Yoshizuki", "1.2", "psid")
        .with_rule(header_rule(0x76, 0, b"PSID\x00\x01\x00\x76"))
        .with_rule(header_rule(0x76, 0, b"PSID\x00\x03\x00\x76"))
        .with_rule(header_rule(0x7C, 0, b"PSID\x00\x02\x00\x7C"))
        .with_rule(header_rule(0x7C, 0, b"PSID\x00\x03\x00\x7C"))
        .with_rule(header_rule(0x7C, 0, b"RSID\x00\x02\x00\x7C"))
}

/// FIG, SMC and UFO copier headers, told apart by bytes at 0x16
pub fn snes() -> Detector {
    Detector::new(
        "Nintendo Super Famicom/SNES",
        "Matt Nadareski (darksabre76)",
        "1.0",
        "snes",
    )
    .with_rule(header_rule(0x200, 0x16, &[0x00; 8]))
    .with_rule(header_rule(0x200, 0x16, &[0xAA, 0xBB, 0x04, 0, 0, 0, 0, 0]))
    .with_rule(header_rule(0x200, 0x16, b"SUPERUFO"))
}

pub fn spc() -> Detector {
    Detector::new("Nintendo Super Famicon SPC", "Yori Yoshizuki", "1.0", "spc")
        .with_rule(header_rule(0x100, 0, b"SNES-SPC"))
}

/// Every built-in detector in catalog order
pub fn all() -> Vec<Detector> {
    vec![
        atari_7800(),
        famicom_disk_system(),
        atari_lynx(),
        nintendo_64(),
        nes(),
        pc_engine(),
        psid(),
        snes(),
        spc(),
    ]
}
