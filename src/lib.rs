//! # Cartridge Headers - Copier Header Detection and Removal
//!
//! ROM copiers and dumping tools often prepend a small header to the media
//! they dump. DAT catalogs hash the header-free payload, so tooling needs to
//! recognize such headers, strip them, and later put the exact bytes back.
//!
//! - **Detectors** group ordered **rules**; a rule applies when all of its
//!   **tests** pass against the stream
//! - **Strip** writes the payload range of a stream, optionally reordering
//!   bytes (bitswap, byteswap, wordswap, word-byteswap)
//! - **Restore** re-attaches a saved header to a payload
//! - **Headerer** runs the whole file workflow and remembers stripped headers
//!   in a SQLite store keyed by payload hash
//!
//! ## Quick Start
//!
//! ```rust
//! use cartridge_headers::{strip, restore, RuleCatalog};
//! use std::io::Cursor;
//!
//! # fn main() -> cartridge_headers::Result<()> {
//! let mut dump = b"NES\x1A".to_vec();
//! dump.resize(16 + 16384, 0xEA);
//!
//! let catalog = RuleCatalog::embedded();
//! let rule = catalog
//!     .find_matching_rule(&mut Cursor::new(&dump), "")
//!     .expect("iNES header");
//!
//! let header = rule.read_header(&mut Cursor::new(&dump))?;
//! let mut payload = Vec::new();
//! strip(rule, &mut Cursor::new(&dump), &mut payload)?;
//! assert_eq!(payload.len(), 16384);
//!
//! let mut rebuilt = Vec::new();
//! restore(&mut Cursor::new(&payload), &mut rebuilt, &header, &[])?;
//! assert_eq!(rebuilt, dump);
//! # Ok(())
//! # }
//! ```
//!
//! ## File Workflow
//!
//! ```rust,no_run
//! use cartridge_headers::HeadererBuilder;
//!
//! # fn main() -> cartridge_headers::Result<()> {
//! let headerer = HeadererBuilder::new().store_path("headers.sqlite").build()?;
//!
//! // game.nes -> game.nes.new, header recorded under the payload hash
//! let outcome = headerer.extract("game.nes")?;
//!
//! // game.nes.new -> game.nes.new.0.new, byte-identical to game.nes
//! let rebuilt = headerer.restore(&outcome.output)?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    catalog::{CatalogSource, RuleCatalog},
    definition::{DetectorDefinition, RuleDefinition, RuleDocument, TestDefinition},
    detector::Detector,
    error::{HeaderError, Result},
    headerer::{ExtractOutcome, Headerer, HeadererBuilder, HeadererConfig},
    offset::Offset,
    rule::{Operation, Rule},
    rule_test::{FileOperator, Test, TestKind},
    store::{content_hash, HeaderRecord, HeaderStore, MemoryHeaderStore, SqliteHeaderStore},
    transform::{restore, restore_file, strip, strip_file, transform_bytes, TransformBuffer},
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
