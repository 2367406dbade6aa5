//! Trust-ordered merging of fact sources

use crate::GatekeeperError;
use serde::Serialize;
use std::collections::BTreeMap;
use tender_domain::{FieldValue, GroundTruthFacts, TenderSummary};
use tracing::debug;

/// Which source supplied a field's final value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Deterministic rule match
    GroundTruth,
    /// Targeted recovery query
    GapFill,
    /// Main model extraction
    Model,
    /// No source mentions the field
    Absent,
}

/// A field where ground truth replaced a different model value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Override {
    /// Field path
    pub path: String,
    /// Value the model proposed
    pub model_value: String,
    /// Value kept from ground truth
    pub ground_truth: String,
}

/// Result of a merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Merged record
    pub summary: TenderSummary,
    /// Source of every field, keyed by path
    pub provenance: BTreeMap<&'static str, Provenance>,
    /// Conflicts resolved in favour of ground truth
    pub overridden: Vec<Override>,
}

/// Combines ground truth, gap-fill results and model output
///
/// Trust order is fixed: ground truth, then gap filling, then the model.
/// A lower-trust source only fills a field every higher-trust source leaves
/// at the sentinel, so ground truth is never overwritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger;

impl Merger {
    /// Create a merger
    pub fn new() -> Self {
        Self
    }

    /// Merge the three sources field by field
    pub fn merge(
        &self,
        facts: &GroundTruthFacts,
        gap_filled: &BTreeMap<&'static str, FieldValue>,
        model: &TenderSummary,
    ) -> Result<MergeOutcome, GatekeeperError> {
        let mut summary = TenderSummary::blank();
        let mut provenance = BTreeMap::new();
        let mut overridden = Vec::new();

        for (spec, model_value) in model.iter() {
            let (value, source) = if let Some(fact) = facts.get(spec.path) {
                if model_value.is_mentioned() && !same_value(&model_value.render(), &fact.value) {
                    debug!(
                        "Ground truth overrides model for {}: {:?} -> {:?}",
                        spec.path,
                        model_value.render(),
                        fact.value
                    );
                    overridden.push(Override {
                        path: spec.path.to_string(),
                        model_value: model_value.render(),
                        ground_truth: fact.value.clone(),
                    });
                }
                (FieldValue::text(fact.value.as_str()), Provenance::GroundTruth)
            } else if let Some(filled) = gap_filled.get(spec.path).filter(|v| v.is_mentioned()) {
                (filled.clone(), Provenance::GapFill)
            } else if model_value.is_mentioned() {
                (model_value.clone(), Provenance::Model)
            } else {
                (FieldValue::NotMentioned, Provenance::Absent)
            };

            let source = if value.is_mentioned() { source } else { Provenance::Absent };
            summary.set(spec.path, value)?;
            provenance.insert(spec.path, source);
        }

        Ok(MergeOutcome {
            summary,
            provenance,
            overridden,
        })
    }
}

fn same_value(a: &str, b: &str) -> bool {
    let norm = |s: &str| {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    };
    norm(a) == norm(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_domain::{Fact, FactsBuilder, RuleOrigin, SourceRef};

    fn facts(entries: &[(&str, &str)]) -> GroundTruthFacts {
        let mut builder = FactsBuilder::new();
        for (i, (path, value)) in entries.iter().enumerate() {
            builder.offer(
                path,
                Fact {
                    value: value.to_string(),
                    source: SourceRef {
                        label: "nit.pdf".to_string(),
                        range: i..i + 1,
                    },
                    origin: RuleOrigin::Generic,
                    rule: "test",
                },
            );
        }
        builder.build()
    }

    fn model(entries: &[(&str, &str)]) -> TenderSummary {
        let mut summary = TenderSummary::blank();
        for (path, value) in entries {
            summary.set(path, FieldValue::text(*value)).unwrap();
        }
        summary
    }

    #[test]
    fn test_ground_truth_wins_conflicts() {
        let outcome = Merger::new()
            .merge(
                &facts(&[("key_dates.bid_end", "12-03-2025")]),
                &BTreeMap::new(),
                &model(&[("key_dates.bid_end", "15-03-2025")]),
            )
            .unwrap();

        assert_eq!(
            outcome.summary.get("key_dates.bid_end").and_then(|v| v.as_text()),
            Some("12-03-2025")
        );
        assert_eq!(outcome.overridden.len(), 1);
        assert_eq!(outcome.overridden[0].model_value, "15-03-2025");
        assert_eq!(outcome.provenance["key_dates.bid_end"], Provenance::GroundTruth);
    }

    #[test]
    fn test_agreeing_model_value_is_not_an_override() {
        let outcome = Merger::new()
            .merge(
                &facts(&[("financial_requirements.emd", "25,000")]),
                &BTreeMap::new(),
                &model(&[("financial_requirements.emd", " 25,000 ")]),
            )
            .unwrap();
        assert!(outcome.overridden.is_empty());
    }

    #[test]
    fn test_gap_fill_beats_model_but_not_ground_truth() {
        let mut gap = BTreeMap::new();
        gap.insert("eligibility_snapshot.turnover_requirement", FieldValue::text("5 Crore"));
        gap.insert("key_dates.bid_end", FieldValue::text("01-01-2030"));

        let outcome = Merger::new()
            .merge(
                &facts(&[("key_dates.bid_end", "12-03-2025")]),
                &gap,
                &model(&[("eligibility_snapshot.turnover_requirement", "1 Crore")]),
            )
            .unwrap();

        let s = &outcome.summary;
        assert_eq!(
            s.get("eligibility_snapshot.turnover_requirement").and_then(|v| v.as_text()),
            Some("5 Crore")
        );
        assert_eq!(s.get("key_dates.bid_end").and_then(|v| v.as_text()), Some("12-03-2025"));
        let from_gap: Vec<&str> = outcome
            .provenance
            .iter()
            .filter(|(_, p)| **p == Provenance::GapFill)
            .map(|(path, _)| *path)
            .collect();
        assert_eq!(from_gap, vec!["eligibility_snapshot.turnover_requirement"]);
    }

    #[test]
    fn test_sentinel_gap_value_does_not_erase_model() {
        let mut gap = BTreeMap::new();
        gap.insert("scope_of_work.location", FieldValue::NotMentioned);
        let outcome = Merger::new()
            .merge(
                &GroundTruthFacts::empty(),
                &gap,
                &model(&[("scope_of_work.location", "Pune")]),
            )
            .unwrap();
        assert_eq!(outcome.provenance["scope_of_work.location"], Provenance::Model);
    }

    #[test]
    fn test_every_field_has_provenance() {
        let outcome = Merger::new()
            .merge(&GroundTruthFacts::empty(), &BTreeMap::new(), &TenderSummary::blank())
            .unwrap();
        assert_eq!(outcome.provenance.len(), tender_domain::SCHEMA.len());
        assert!(outcome.provenance.values().all(|p| *p == Provenance::Absent));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use tender_domain::{Fact, FactsBuilder, RuleOrigin, SourceRef, SCHEMA};

    fn verifiable_paths() -> Vec<&'static str> {
        SCHEMA.iter().filter(|s| s.verifiable).map(|s| s.path).collect()
    }

    proptest! {
        /// Property: whatever the model and gap filler say, ground truth survives the merge
        #[test]
        fn test_ground_truth_never_overwritten(
            picks in proptest::collection::vec(
                (0usize..100, "[A-Za-z0-9 ,/-]{1,20}", "[A-Za-z0-9 ,/-]{1,20}"),
                1..10,
            )
        ) {
            let paths = verifiable_paths();
            let mut builder = FactsBuilder::new();
            let mut model = TenderSummary::blank();
            let mut gap = BTreeMap::new();
            for (i, truth, other) in &picks {
                let path = paths[i % paths.len()];
                builder.offer(path, Fact {
                    value: truth.clone(),
                    source: SourceRef { label: "doc".into(), range: 0..1 },
                    origin: RuleOrigin::Generic,
                    rule: "prop",
                });
                model.set(path, FieldValue::text(other.as_str())).unwrap();
                gap.insert(path, FieldValue::text(other.as_str()));
            }
            let facts = builder.build();
            let outcome = Merger::new().merge(&facts, &gap, &model).unwrap();
            for (path, fact) in facts.iter() {
                prop_assert_eq!(
                    outcome.summary.get(path).unwrap(),
                    &FieldValue::text(fact.value.as_str())
                );
            }
        }
    }
}
