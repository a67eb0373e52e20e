//! File-level extract and restore
//!
//! [`Headerer`] ties the pieces together: it picks a rule for a dump, saves
//! the header bytes, writes the stripped payload next to the input (or into
//! an output directory) and records the header under the payload's hash.
//! Restoring looks the hash up again and writes one rebuilt file per stored
//! header.

use crate::core::catalog::RuleCatalog;
use crate::core::definition::decode_hex;
use crate::core::error::{HeaderError, Result};
use crate::core::rule::Rule;
use crate::core::store::{content_hash, HeaderRecord, HeaderStore, SqliteHeaderStore};
use crate::core::transform;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings for a [`Headerer`], loadable from TOML
///
/// ```toml
/// store_path = "headerer.sqlite"
/// output_dir = "out"
/// persist_headers = true
/// detector = "Nintendo Famicon/NES"
/// rule_files = ["extra-rules.toml"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadererConfig {
    /// SQLite file holding stripped headers
    pub store_path: PathBuf,
    /// Where outputs go (default: next to the input)
    pub output_dir: Option<PathBuf>,
    /// Record headers on extract
    pub persist_headers: bool,
    /// Only try the detector with this name
    pub detector: Option<String>,
    /// Extra rule documents appended to the built-in detectors
    pub rule_files: Vec<PathBuf>,
}

impl Default for HeadererConfig {
    fn default() -> Self {
        HeadererConfig {
            store_path: PathBuf::from("headerer.sqlite"),
            output_dir: None,
            persist_headers: true,
            detector: None,
            rule_files: Vec::new(),
        }
    }
}

impl HeadererConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!("Loading headerer config from {:?}", path.as_ref());
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

/// Result of a successful extract
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    /// The stripped payload file
    pub output: PathBuf,
    /// Header bytes removed from the input
    pub header: Vec<u8>,
    /// The rule that matched
    pub rule: Rule,
    /// Hash of the stripped payload
    pub hash: String,
    /// True if a new header record was written
    pub stored: bool,
}

/// Builder for [`Headerer`]
///
/// # Examples
///
/// ```rust,no_run
/// use cartridge_headers::HeadererBuilder;
///
/// # fn main() -> cartridge_headers::Result<()> {
/// let headerer = HeadererBuilder::new()
///     .store_path("headers.sqlite")
///     .output_dir("stripped")
///     .build()?;
///
/// let outcome = headerer.extract("game.nes")?;
/// println!("{} -> {:?}", outcome.rule.source_id, outcome.output);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct HeadererBuilder {
    config: HeadererConfig,
    catalog: Option<Arc<RuleCatalog>>,
    store: Option<Box<dyn HeaderStore>>,
}

impl HeadererBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded config
    pub fn from_config(config: HeadererConfig) -> Self {
        HeadererBuilder {
            config,
            ..Self::default()
        }
    }

    pub fn store_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.store_path = path.into();
        self
    }

    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    /// Skip recording headers on extract
    pub fn no_store(mut self) -> Self {
        self.config.persist_headers = false;
        self
    }

    pub fn detector<S: Into<String>>(mut self, name: S) -> Self {
        self.config.detector = Some(name.into());
        self
    }

    pub fn rule_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.rule_files.push(path.into());
        self
    }

    /// Use an existing catalog instead of building one
    pub fn catalog(mut self, catalog: Arc<RuleCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use an existing store instead of opening `store_path`
    pub fn store<S: HeaderStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn build(self) -> Result<Headerer> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(RuleCatalog::embedded().with_files(&self.config.rule_files)?),
        };
        let store = match self.store {
            Some(store) => store,
            None => Box::new(SqliteHeaderStore::open(&self.config.store_path)?),
        };

        info!(
            "Headerer ready with {} detectors (persist headers: {})",
            catalog.len(),
            self.config.persist_headers
        );

        Ok(Headerer {
            catalog,
            store,
            output_dir: self.config.output_dir,
            persist_headers: self.config.persist_headers,
            detector: self.config.detector.unwrap_or_default(),
        })
    }
}

/// Detects, strips and restores copier headers on files
pub struct Headerer {
    catalog: Arc<RuleCatalog>,
    store: Box<dyn HeaderStore>,
    output_dir: Option<PathBuf>,
    persist_headers: bool,
    detector: String,
}

impl Headerer {
    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn HeaderStore {
        self.store.as_ref()
    }

    /// The first matching rule for a file, if any
    pub fn detect<P: AsRef<Path>>(&self, path: P) -> Result<Option<Rule>> {
        let mut input = File::open(path.as_ref())?;
        Ok(self
            .catalog
            .find_matching_rule(&mut input, &self.detector)
            .cloned())
    }

    /// Strip the copier header from `path`
    ///
    /// Writes `<name>.new` and, unless disabled, records the header under
    /// the stripped payload's hash. Failed or empty outputs are removed.
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<ExtractOutcome> {
        let path = path.as_ref();
        info!("Extracting header from {:?}", path);

        let (rule, header) = {
            let mut input = File::open(path)?;
            let rule = self
                .catalog
                .find_matching_rule(&mut input, &self.detector)
                .cloned()
                .ok_or_else(|| HeaderError::NoMatch(path.to_path_buf()))?;
            let header = rule.read_header(&mut input)?;
            (rule, header)
        };
        debug!(
            "Matched '{}' rule; header is {} bytes",
            rule.source_id,
            header.len()
        );

        let output = self.output_path(path, None)?;
        let written = match transform::strip_file(&rule, path, &output) {
            Ok(written) => written,
            Err(e) => {
                remove_partial(&output);
                return Err(e);
            }
        };
        if written == 0 {
            remove_partial(&output);
            return Err(HeaderError::EmptyOutput(output));
        }

        let hash = content_hash(File::open(&output)?)?;
        let stored = if !self.persist_headers {
            false
        } else if header.is_empty() {
            debug!("Rule {} strips no header bytes; nothing to record", rule.source_id);
            false
        } else {
            let record = HeaderRecord::new(hash.clone(), &header, rule.source_id.clone());
            let inserted = self.store.insert(&record)?;
            debug!("Recorded header for {} (new: {})", hash, inserted);
            inserted
        };

        info!("Wrote {:?} ({} bytes)", output, written);
        Ok(ExtractOutcome {
            output,
            header,
            rule,
            hash,
            stored,
        })
    }

    /// Rebuild every known original of the payload at `path`
    ///
    /// Writes `<name>.<n>.new` for each stored header, in store order.
    pub fn restore<P: AsRef<Path>>(&self, path: P) -> Result<Vec<PathBuf>> {
        let path = path.as_ref();
        info!("Restoring headers for {:?}", path);

        let hash = content_hash(File::open(path)?)?;
        let records = self.store.find(&hash)?;
        if records.is_empty() {
            warn!("No stored headers for {:?} ({})", path, hash);
            return Err(HeaderError::NoStoredHeaders(hash));
        }

        let mut outputs = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let header = decode_hex(&record.header)?;
            let output = self.output_path(path, Some(index))?;

            let written = match transform::restore_file(path, &output, &header, &[]) {
                Ok(written) => written,
                Err(e) => {
                    remove_partial(&output);
                    return Err(e);
                }
            };
            if written == 0 {
                remove_partial(&output);
                return Err(HeaderError::EmptyOutput(output));
            }

            debug!("Restored {} header onto {:?}", record.source_id, output);
            outputs.push(output);
        }

        info!("Restored {} file(s) from {:?}", outputs.len(), path);
        Ok(outputs)
    }

    fn output_path(&self, input: &Path, index: Option<usize>) -> Result<PathBuf> {
        let file_name = input
            .file_name()
            .ok_or_else(|| HeaderError::InvalidPath(input.to_path_buf()))?;

        let mut name = OsString::from(file_name);
        if let Some(index) = index {
            name.push(format!(".{}", index));
        }
        name.push(".new");

        let dir = match &self.output_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        Ok(dir.join(name))
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Could not remove partial output {:?}: {}", path, e);
        }
    }
}
