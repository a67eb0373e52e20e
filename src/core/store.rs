//! Header recovery store
//!
//! Stripped headers are remembered by the hash of the payload they were
//! removed from, so a payload can later be turned back into every original
//! dump known to produce it. Records are unique on the full
//! `(hash, header, source_id)` triple.

use crate::core::error::Result;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// One stored header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderRecord {
    /// Hex SHA-256 of the stripped payload
    pub hash: String,
    /// Header bytes as uppercase hex
    pub header: String,
    /// Source id of the detector whose rule matched
    pub source_id: String,
}

impl HeaderRecord {
    pub fn new(hash: impl Into<String>, header: &[u8], source_id: impl Into<String>) -> Self {
        HeaderRecord {
            hash: hash.into(),
            header: hex::encode_upper(header),
            source_id: source_id.into(),
        }
    }
}

/// Persistence for stripped headers
pub trait HeaderStore: Send + Sync {
    /// Store a record; returns `false` if the exact triple already exists
    fn insert(&self, record: &HeaderRecord) -> Result<bool>;

    /// Every record for a payload hash, oldest first
    fn find(&self, hash: &str) -> Result<Vec<HeaderRecord>>;
}

/// SQLite-backed store
pub struct SqliteHeaderStore {
    conn: Mutex<Connection>,
}

impl SqliteHeaderStore {
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS headers (
        hash TEXT NOT NULL,
        header TEXT NOT NULL,
        source_id TEXT NOT NULL,
        PRIMARY KEY (hash, header, source_id)
    )";

    /// Open (or create) a store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!("Opening header store at {:?}", path.as_ref());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(Self::SCHEMA, [])?;
        Ok(SqliteHeaderStore {
            conn: Mutex::new(conn),
        })
    }
}

impl HeaderStore for SqliteHeaderStore {
    fn insert(&self, record: &HeaderRecord) -> Result<bool> {
        let changed = self.conn.lock().execute(
            "INSERT OR IGNORE INTO headers (hash, header, source_id) VALUES (?1, ?2, ?3)",
            params![record.hash, record.header, record.source_id],
        )?;
        Ok(changed == 1)
    }

    fn find(&self, hash: &str) -> Result<Vec<HeaderRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT hash, header, source_id FROM headers WHERE hash = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![hash], |row| {
            Ok(HeaderRecord {
                hash: row.get(0)?,
                header: row.get(1)?,
                source_id: row.get(2)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

/// In-process store, mostly for tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemoryHeaderStore {
    records: RwLock<MemoryRecords>,
}

/// Insertion-ordered records plus a uniqueness index
#[derive(Debug, Default)]
struct MemoryRecords {
    ordered: Vec<HeaderRecord>,
    seen: HashSet<HeaderRecord>,
}

impl MemoryHeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().ordered.is_empty()
    }
}

impl HeaderStore for MemoryHeaderStore {
    fn insert(&self, record: &HeaderRecord) -> Result<bool> {
        let mut records = self.records.write();
        if !records.seen.insert(record.clone()) {
            return Ok(false);
        }
        records.ordered.push(record.clone());
        Ok(true)
    }

    fn find(&self, hash: &str) -> Result<Vec<HeaderRecord>> {
        Ok(self
            .records
            .read()
            .ordered
            .iter()
            .filter(|r| r.hash == hash)
            .cloned()
            .collect())
    }
}

/// Lowercase hex SHA-256 of everything `reader` yields
pub fn content_hash<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn exercise(store: &dyn HeaderStore) {
        let a = HeaderRecord::new("abc", b"NES\x1A", "nes");
        let b = HeaderRecord::new("abc", b"NES\x1A\x01", "nes");
        let other = HeaderRecord::new("def", b"LYNX", "lynx");

        assert!(store.insert(&a).unwrap());
        assert!(!store.insert(&a).unwrap());
        assert!(store.insert(&b).unwrap());
        assert!(store.insert(&other).unwrap());

        let found = store.find("abc").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&a));
        assert!(found.contains(&b));
        assert!(store.find("missing").unwrap().is_empty());

        // Insertion order, not header order
        store.insert(&HeaderRecord::new("h", &[0xFF], "nes")).unwrap();
        store.insert(&HeaderRecord::new("h", &[0x00], "nes")).unwrap();
        store.insert(&HeaderRecord::new("h", &[0x7F], "fds")).unwrap();
        let headers: Vec<String> = store
            .find("h")
            .unwrap()
            .into_iter()
            .map(|r| r.header)
            .collect();
        assert_eq!(headers, vec!["FF", "00", "7F"]);
    }

    #[test]
    fn test_record_hex_is_uppercase() {
        let record = HeaderRecord::new("h", &[0x4E, 0x1a], "nes");
        assert_eq!(record.header, "4E1A");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryHeaderStore::new();
        exercise(&store);
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn test_sqlite_store_in_memory() {
        exercise(&SqliteHeaderStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("headers.sqlite");
        {
            let store = SqliteHeaderStore::open(&path).unwrap();
            store
                .insert(&HeaderRecord::new("abc", b"HDR", "nes"))
                .unwrap();
        }

        let store = SqliteHeaderStore::open(&path).unwrap();
        let found = store.find("abc").unwrap();
        assert_eq!(found, vec![HeaderRecord::new("abc", b"HDR", "nes")]);
    }

    #[test]
    fn test_same_header_different_source_is_distinct() {
        let store = SqliteHeaderStore::open_in_memory().unwrap();
        assert!(store.insert(&HeaderRecord::new("h", b"X", "nes")).unwrap());
        assert!(store.insert(&HeaderRecord::new("h", b"X", "fds")).unwrap());
        assert_eq!(store.find("h").unwrap().len(), 2);
    }

    #[test]
    fn test_content_hash_retries_interrupted_reads() {
        struct Interrupting {
            inner: Cursor<&'static [u8]>,
            interrupted: bool,
        }

        impl Read for Interrupting {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(io::Error::from(io::ErrorKind::Interrupted));
                }
                self.inner.read(buf)
            }
        }

        let reader = Interrupting {
            inner: Cursor::new(&b"abc"[..]),
            interrupted: false,
        };
        assert_eq!(
            content_hash(reader).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(Cursor::new(b"")).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            content_hash(Cursor::new(b"abc")).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
