use crate::core::rule::Operation;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Stream cannot be transformed with {operation}: length {length}, start offset {start}")]
    SizePrecondition {
        operation: Operation,
        length: u64,
        start: String,
    },

    #[error("Offset {offset} is outside a stream of {length} bytes")]
    SeekOutOfRange { offset: String, length: u64 },

    #[error("Invalid offset: {0}")]
    InvalidOffset(String),

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid operation: {0} (expected none, bitswap, byteswap, wordswap or wordbyteswap)")]
    InvalidOperation(String),

    #[error("Invalid test type: {0} (expected data, or, xor, and or file)")]
    InvalidTestKind(String),

    #[error("Invalid rule definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid path: {0:?} does not name a file")]
    InvalidPath(PathBuf),

    #[error("Transform produced an empty output: {0}")]
    EmptyOutput(PathBuf),

    #[error("No detector rule matched: {0}")]
    NoMatch(PathBuf),

    #[error("No stored headers for payload hash {0}")]
    NoStoredHeaders(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Header store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HeaderError>;
