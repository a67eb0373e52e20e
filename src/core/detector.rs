//! Detectors group the rules for one kind of copier header

use crate::core::rule::Rule;
use std::io::{Read, Seek};
use tracing::debug;

/// A named, versioned, ordered collection of rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    pub name: String,
    pub author: String,
    pub version: String,
    /// Stable identifier of the rule set; tags persisted headers
    pub source_id: String,
    pub rules: Vec<Rule>,
}

impl Detector {
    pub fn new(
        name: impl Into<String>,
        author: impl Into<String>,
        version: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Detector {
            name: name.into(),
            author: author.into(),
            version: version.into(),
            source_id: source_id.into(),
            rules: Vec::new(),
        }
    }

    /// Append a rule, tagging it with this detector's source id
    pub fn with_rule(mut self, mut rule: Rule) -> Self {
        rule.source_id = self.source_id.clone();
        self.rules.push(rule);
        self
    }

    /// Case-insensitive name check; an empty filter accepts every detector
    pub fn accepts(&self, filter: &str) -> bool {
        filter.is_empty() || self.name.eq_ignore_ascii_case(filter)
    }

    /// First rule (in order) whose tests all pass
    pub fn find_matching_rule<S: Read + Seek + ?Sized>(&self, stream: &mut S) -> Option<&Rule> {
        let rule = self.rules.iter().find(|rule| rule.matches(stream))?;
        debug!(
            "Detector '{}' matched with rule starting at {}",
            self.name, rule.start_offset
        );
        Some(rule)
    }
}
