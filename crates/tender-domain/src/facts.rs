//! Ground-truth facts found by deterministic rules

use crate::schema::field_spec;
use std::collections::BTreeMap;
use std::ops::Range;

/// Which rule set produced a fact
///
/// Ordering encodes specificity: a portal-specific rule outranks a generic one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum RuleOrigin {
    /// Rule written for any tender
    Generic,
    /// Rule written for the run's portal
    PortalSpecific,
}

/// Where a fact was found
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceRef {
    /// Label of the source file
    pub label: String,
    /// Byte range of the match inside the unified text
    pub range: Range<usize>,
}

/// One deterministic fact
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Fact {
    /// Extracted value, already cleaned
    pub value: String,
    /// Where it was found
    pub source: SourceRef,
    /// Rule set that matched
    pub origin: RuleOrigin,
    /// Name of the rule that matched
    pub rule: &'static str,
}

impl Fact {
    /// Rule facts are deterministic; confidence is always certain
    pub fn confidence(&self) -> f64 {
        1.0
    }

    fn outranks(&self, other: &Fact) -> bool {
        (self.origin, std::cmp::Reverse(self.source.range.start))
            > (other.origin, std::cmp::Reverse(other.source.range.start))
    }
}

/// Immutable mapping from field path to fact
///
/// Only verifiable schema fields may appear. Produced once per run through
/// [`FactsBuilder`] and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GroundTruthFacts {
    facts: BTreeMap<&'static str, Fact>,
}

impl GroundTruthFacts {
    /// No facts
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fact for a field path
    pub fn get(&self, path: &str) -> Option<&Fact> {
        self.facts.get(path)
    }

    /// True if a fact exists for the path
    pub fn contains(&self, path: &str) -> bool {
        self.facts.contains_key(path)
    }

    /// Facts in path order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Fact)> {
        self.facts.iter().map(|(k, v)| (*k, v))
    }

    /// Field paths in path order
    pub fn paths(&self) -> Vec<&'static str> {
        self.facts.keys().copied().collect()
    }

    /// Number of facts
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// True if no facts were found
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// `path: value` lines, used to anchor model prompts
    pub fn render(&self) -> String {
        self.facts
            .iter()
            .map(|(path, fact)| format!("{}: {}", path, fact.value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Collects candidate facts and keeps the winning candidate per field
///
/// Winner: the more specific rule (portal-specific over generic); on equal
/// specificity, the earliest position in the unified text.
#[derive(Debug, Default)]
pub struct FactsBuilder {
    facts: BTreeMap<&'static str, Fact>,
    rejected: Vec<String>,
}

impl FactsBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate; returns true if it is now the field's fact
    ///
    /// Candidates for unknown or non-verifiable fields are refused.
    pub fn offer(&mut self, path: &str, fact: Fact) -> bool {
        let spec = match field_spec(path) {
            Some(spec) if spec.verifiable => spec,
            _ => {
                self.rejected.push(path.to_string());
                return false;
            }
        };
        match self.facts.get(spec.path) {
            Some(current) if !fact.outranks(current) => false,
            _ => {
                self.facts.insert(spec.path, fact);
                true
            }
        }
    }

    /// Paths refused because they are not verifiable schema fields
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// Freeze into an immutable fact set
    pub fn build(self) -> GroundTruthFacts {
        GroundTruthFacts { facts: self.facts }
    }
}
