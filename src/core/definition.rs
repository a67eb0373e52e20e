//! Rule documents
//!
//! Serde records mirroring the textual rule format: offsets are hex strings,
//! `"EOF"`, or plain integers; values and masks are hex byte strings; file
//! sizes are hex or `"PO2"`. Documents are TOML or JSON:
//!
//! ```toml
//! [[detector]]
//! name = "Nintendo Famicom/NES"
//! author = "Roman Scherzer"
//! version = "1.1"
//! source_id = "nes"
//!
//! [[detector.rule]]
//! start_offset = "10"
//!
//! [[detector.rule.test]]
//! type = "data"
//! offset = "0"
//! value = "4E45531A"
//! ```

use crate::core::detector::Detector;
use crate::core::error::{HeaderError, Result};
use crate::core::offset::{parse_hex_number, Offset, OffsetText};
use crate::core::rule::{Operation, Rule};
use crate::core::rule_test::{FileOperator, Test, TestKind};
use serde::{Deserialize, Serialize};

/// Top-level rule document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default, rename = "detector", alias = "detectors")]
    pub detectors: Vec<DetectorDefinition>,
}

impl RuleDocument {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Convert every definition, failing on the first invalid one
    pub fn into_detectors(self) -> Result<Vec<Detector>> {
        self.detectors.into_iter().map(Detector::try_from).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorDefinition {
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    pub source_id: String,
    #[serde(default, rename = "rule", alias = "rules")]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(default = "default_offset")]
    pub start_offset: OffsetText,
    #[serde(default)]
    pub end_offset: Option<OffsetText>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default, rename = "test", alias = "tests")]
    pub tests: Vec<TestDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub offset: Option<OffsetText>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub result: Option<bool>,
    #[serde(default)]
    pub size: Option<OffsetText>,
    #[serde(default)]
    pub operator: Option<String>,
}

fn default_offset() -> OffsetText {
    OffsetText::Number(0)
}

/// Decode a hex byte string, ignoring whitespace
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|_| HeaderError::InvalidHex(text.to_string()))
}

impl TryFrom<DetectorDefinition> for Detector {
    type Error = HeaderError;

    fn try_from(def: DetectorDefinition) -> Result<Self> {
        if def.name.trim().is_empty() {
            return Err(HeaderError::InvalidDefinition(
                "detector name cannot be empty".to_string(),
            ));
        }

        let mut detector = Detector::new(def.name, def.author, def.version, def.source_id);
        for rule in def.rules {
            let rule = Rule::try_from(rule).map_err(|e| {
                HeaderError::InvalidDefinition(format!("detector '{}': {}", detector.name, e))
            })?;
            detector = detector.with_rule(rule);
        }
        Ok(detector)
    }
}

impl TryFrom<RuleDefinition> for Rule {
    type Error = HeaderError;

    fn try_from(def: RuleDefinition) -> Result<Self> {
        let start_offset = def.start_offset.to_offset()?;
        let end_offset = def.end_offset.as_ref().map(OffsetText::to_offset).transpose()?;
        let operation = match def.operation.as_deref() {
            Some(text) => text.parse()?,
            None => Operation::None,
        };

        let mut rule = Rule::new(start_offset, end_offset, operation);
        for test in def.tests {
            rule = rule.with_test(Test::try_from(test)?);
        }
        Ok(rule)
    }
}

impl TryFrom<TestDefinition> for Test {
    type Error = HeaderError;

    fn try_from(def: TestDefinition) -> Result<Self> {
        let offset = match &def.offset {
            Some(text) => text.to_offset()?,
            None => Offset::START,
        };
        let value = || -> Result<Vec<u8>> {
            let text = def.value.as_deref().ok_or_else(|| {
                HeaderError::InvalidDefinition(format!("{} test requires a value", def.kind))
            })?;
            decode_hex(text)
        };
        let mask = || -> Result<Vec<u8>> {
            let text = def.mask.as_deref().ok_or_else(|| {
                HeaderError::InvalidDefinition(format!("{} test requires a mask", def.kind))
            })?;
            decode_hex(text)
        };

        let kind = match def.kind.trim().to_ascii_lowercase().as_str() {
            "data" => TestKind::Data { value: value()? },
            "or" => TestKind::Or {
                value: value()?,
                mask: mask()?,
            },
            "xor" => TestKind::Xor {
                value: value()?,
                mask: mask()?,
            },
            "and" => TestKind::And {
                value: value()?,
                mask: mask()?,
            },
            "file" => TestKind::File {
                size: parse_size(def.size.as_ref())?,
                operator: match def.operator.as_deref() {
                    Some(text) => FileOperator::parse(text).ok_or_else(|| {
                        HeaderError::InvalidDefinition(format!("unknown operator '{}'", text))
                    })?,
                    None => FileOperator::Equal,
                },
            },
            _ => return Err(HeaderError::InvalidTestKind(def.kind.clone())),
        };

        Ok(Test::new(offset, kind).expecting(def.result.unwrap_or(true)))
    }
}

/// `"PO2"` means "power of two"; anything else is a non-negative size
fn parse_size(size: Option<&OffsetText>) -> Result<Option<u64>> {
    let invalid = |what: String| HeaderError::InvalidDefinition(format!("invalid file size {}", what));
    match size {
        None => Err(HeaderError::InvalidDefinition(
            "file test requires a size".to_string(),
        )),
        Some(OffsetText::Text(text)) if text.trim().eq_ignore_ascii_case("po2") => Ok(None),
        Some(OffsetText::Text(text)) => parse_hex_number(text.trim())
            .and_then(|n| u64::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(format!("'{}'", text))),
        Some(OffsetText::Number(n)) => u64::try_from(*n)
            .map(Some)
            .map_err(|_| invalid(n.to_string())),
    }
}
