//! Rule catalog and first-match rule selection
//!
//! A [`RuleCatalog`] is built once and then only read, so one value can be
//! shared across threads (`&RuleCatalog` or `Arc<RuleCatalog>`) with no
//! locking. [`RuleCatalog::global`] memoizes a catalog for the whole process
//! for callers that do not want to thread one through.

use crate::core::builtin;
use crate::core::definition::{DetectorDefinition, RuleDocument};
use crate::core::detector::Detector;
use crate::core::error::{HeaderError, Result};
use crate::core::rule::Rule;
use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

static GLOBAL: OnceLock<RuleCatalog> = OnceLock::new();

/// Where a catalog's detectors come from
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// The code-defined detectors, no I/O
    Embedded,
    /// Already-parsed rule documents
    Definitions(Vec<DetectorDefinition>),
    /// Rule documents on disk (`.toml` or `.json`)
    Files(Vec<PathBuf>),
}

/// Ordered, read-only set of detectors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleCatalog {
    detectors: Vec<Detector>,
}

impl RuleCatalog {
    pub fn new(detectors: Vec<Detector>) -> Self {
        RuleCatalog { detectors }
    }

    /// Catalog of the built-in detectors
    pub fn embedded() -> Self {
        RuleCatalog::new(builtin::all())
    }

    /// Build a catalog from `source`
    pub fn load(source: CatalogSource) -> Result<Self> {
        let detectors = match source {
            CatalogSource::Embedded => builtin::all(),
            CatalogSource::Definitions(definitions) => definitions
                .into_iter()
                .map(Detector::try_from)
                .collect::<Result<Vec<_>>>()?,
            CatalogSource::Files(paths) => {
                let mut detectors = Vec::new();
                for path in &paths {
                    detectors.extend(load_document(path)?.into_detectors()?);
                }
                detectors
            }
        };

        info!("Loaded rule catalog with {} detectors", detectors.len());
        Ok(RuleCatalog::new(detectors))
    }

    /// Process-wide embedded catalog, built on first use
    pub fn global() -> &'static RuleCatalog {
        GLOBAL.get_or_init(RuleCatalog::embedded)
    }

    /// Process-wide catalog built from `source` on first call
    ///
    /// Later calls return the existing catalog and ignore `source`.
    pub fn load_global(source: CatalogSource) -> Result<&'static RuleCatalog> {
        if let Some(catalog) = GLOBAL.get() {
            return Ok(catalog);
        }
        let catalog = RuleCatalog::load(source)?;
        Ok(GLOBAL.get_or_init(|| catalog))
    }

    /// Append detectors from rule document files after the existing ones
    pub fn with_files<P: AsRef<Path>>(mut self, paths: &[P]) -> Result<Self> {
        for path in paths {
            self.detectors
                .extend(load_document(path.as_ref())?.into_detectors()?);
        }
        Ok(self)
    }

    /// Convert parsed rule documents and append them after the existing
    /// detectors
    pub fn with_definitions(mut self, definitions: Vec<DetectorDefinition>) -> Result<Self> {
        for definition in definitions {
            self.detectors.push(Detector::try_from(definition)?);
        }
        Ok(self)
    }

    /// Append already-built detectors after the existing ones
    pub fn with_detectors(mut self, detectors: impl IntoIterator<Item = Detector>) -> Self {
        self.detectors.extend(detectors);
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(RuleCatalog::new(
            RuleDocument::from_toml_str(text)?.into_detectors()?,
        ))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(RuleCatalog::new(
            RuleDocument::from_json_str(text)?.into_detectors()?,
        ))
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    /// Detector by case-insensitive name
    pub fn detector(&self, name: &str) -> Option<&Detector> {
        self.detectors
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// First rule whose tests all pass, scanning detectors in order and
    /// rules in order within each detector
    ///
    /// `detector_filter` restricts the scan to the detector with that name
    /// (case-insensitive); an empty filter scans every detector.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartridge_headers::RuleCatalog;
    /// use std::io::Cursor;
    ///
    /// let catalog = RuleCatalog::embedded();
    /// let mut dump = b"NES\x1A".to_vec();
    /// dump.resize(16 + 16384, 0);
    ///
    /// let rule = catalog.find_matching_rule(&mut Cursor::new(dump), "").unwrap();
    /// assert_eq!(rule.source_id, "nes");
    /// ```
    pub fn find_matching_rule<S: Read + Seek + ?Sized>(
        &self,
        stream: &mut S,
        detector_filter: &str,
    ) -> Option<&Rule> {
        let rule = self
            .detectors
            .iter()
            .filter(|detector| detector.accepts(detector_filter))
            .find_map(|detector| detector.find_matching_rule(stream));

        if rule.is_none() {
            debug!("No rule matched (filter: '{}')", detector_filter);
        }
        rule
    }
}

fn load_document(path: &Path) -> Result<RuleDocument> {
    debug!("Reading rule document {:?}", path);
    let text = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("toml") => RuleDocument::from_toml_str(&text),
        Some("json") => RuleDocument::from_json_str(&text),
        _ => Err(HeaderError::InvalidDefinition(format!(
            "unsupported rule document {:?} (expected .toml or .json)",
            path
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn lynx_dump(magic_at: usize, magic: &[u8]) -> Cursor<Vec<u8>> {
        let mut data = vec![0xFFu8; 0x40 + 0x1000];
        data[magic_at..magic_at + magic.len()].copy_from_slice(magic);
        Cursor::new(data)
    }

    #[test]
    fn test_embedded_catalog() {
        let catalog = RuleCatalog::embedded();
        assert_eq!(catalog.len(), 9);
        assert!(catalog.detector("ATARI LYNX").is_some());
        assert!(catalog.detector("Sega Genesis").is_none());
    }

    #[test]
    fn test_filter_restricts_detectors() {
        let catalog = RuleCatalog::embedded();
        let mut dump = lynx_dump(0, b"LYNX");

        assert!(catalog.find_matching_rule(&mut dump, "atari lynx").is_some());
        assert!(catalog.find_matching_rule(&mut dump, "Nintendo Famicon/NES").is_none());
        assert!(catalog.find_matching_rule(&mut dump, "no such detector").is_none());
    }

    #[test]
    fn test_lynx_rules() {
        let catalog = RuleCatalog::embedded();
        let lynx = catalog.detector("Atari Lynx").unwrap();

        let rule = catalog
            .find_matching_rule(&mut lynx_dump(0, b"LYNX"), "")
            .unwrap();
        assert!(std::ptr::eq(rule, &lynx.rules[0]));

        let rule = catalog
            .find_matching_rule(&mut lynx_dump(6, b"BS9"), "")
            .unwrap();
        assert!(std::ptr::eq(rule, &lynx.rules[1]));

        let mut neither = lynx_dump(0, b"XXXX");
        neither.get_mut()[6..9].copy_from_slice(b"ZZZ");
        assert!(catalog.find_matching_rule(&mut neither, "").is_none());
    }

    #[test]
    fn test_detector_order_wins() {
        let doc = r#"
[[detector]]
name = "Second"
source_id = "second"
[[detector.rule]]
start_offset = "4"
[[detector.rule.test]]
type = "data"
value = "4E45531A"
"#;
        let extra = RuleCatalog::from_toml_str(doc).unwrap();
        let catalog = RuleCatalog::embedded().with_detectors(extra.detectors().to_vec());

        let mut dump = b"NES\x1A".to_vec();
        dump.resize(64, 0);
        let rule = catalog
            .find_matching_rule(&mut Cursor::new(dump.clone()), "")
            .unwrap();
        assert_eq!(rule.source_id, "nes");

        let rule = catalog
            .find_matching_rule(&mut Cursor::new(dump), "second")
            .unwrap();
        assert_eq!(rule.source_id, "second");
    }

    #[test]
    fn test_with_definitions_appends_after_embedded() {
        let doc = RuleDocument::from_toml_str(
            r#"
[[detector]]
name = "Custom"
source_id = "custom"
[[detector.rule]]
start_offset = "8"
[[detector.rule.test]]
type = "data"
value = "435553544F4D2121"
"#,
        )
        .unwrap();

        let catalog = RuleCatalog::embedded()
            .with_definitions(doc.detectors)
            .unwrap();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.detectors()[9].source_id, "custom");
        assert_eq!(catalog.detectors()[0].source_id, "a7800");

        let mut dump = b"CUSTOM!!".to_vec();
        dump.resize(64, 0xFF);
        let rule = catalog
            .find_matching_rule(&mut Cursor::new(dump), "")
            .unwrap();
        assert_eq!(rule.source_id, "custom");
    }

    #[test]
    fn test_with_definitions_rejects_invalid() {
        let doc = RuleDocument::from_toml_str(
            r#"
[[detector]]
name = "Broken"
source_id = "broken"
[[detector.rule]]
operation = "triple-swap"
"#,
        )
        .unwrap();

        assert!(RuleCatalog::embedded()
            .with_definitions(doc.detectors)
            .is_err());
    }

    #[test]
    fn test_load_from_files() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("spc.toml");
        std::fs::write(
            &toml_path,
            r#"
[[detector]]
name = "Nintendo Super Famicon SPC"
source_id = "spc"
[[detector.rule]]
start_offset = "00100"
[[detector.rule.test]]
type = "data"
offset = "0"
value = "534E45532D535043"
"#,
        )
        .unwrap();
        let json_path = dir.path().join("pow.json");
        std::fs::write(
            &json_path,
            r#"{"detector": [{"name": "Pow", "source_id": "pow",
                "rule": [{"start_offset": 0, "test": [{"type": "file", "size": "PO2"}]}]}]}"#,
        )
        .unwrap();

        let catalog = RuleCatalog::load(CatalogSource::Files(vec![toml_path, json_path])).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.detectors()[0].rules[0].source_id, "spc");
        assert_eq!(catalog.detectors()[1].name, "Pow");
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.xml");
        std::fs::write(&path, "<detector/>").unwrap();
        assert!(matches!(
            RuleCatalog::load(CatalogSource::Files(vec![path])),
            Err(HeaderError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_global_is_memoized() {
        let first = RuleCatalog::global();
        let second = RuleCatalog::load_global(CatalogSource::Definitions(Vec::new())).unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
