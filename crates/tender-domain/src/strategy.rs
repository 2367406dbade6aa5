//! Processing strategy and pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a document set is sent to the model
///
/// Chosen once per run from the estimated token cost and never changed mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStrategy {
    /// One bounded-context call
    SinglePass,
    /// Chunk, summarise each chunk, then merge
    Hierarchical,
}

impl ProcessingStrategy {
    /// Snake-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStrategy::SinglePass => "single_pass",
            ProcessingStrategy::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for ProcessingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a model call or a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Deterministic fact extraction
    GroundTruth,
    /// Strategy selection
    Strategy,
    /// Single bounded-context extraction call
    SinglePass,
    /// Per-chunk summarisation call
    MicroSummary,
    /// Final structural call over the merged chunk summaries
    Merge,
    /// Targeted recovery call for one missing field
    GapFill,
    /// Merge and schema validation
    Validate,
}

impl Stage {
    /// Snake-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GroundTruth => "ground_truth",
            Stage::Strategy => "strategy",
            Stage::SinglePass => "single_pass",
            Stage::MicroSummary => "micro_summary",
            Stage::Merge => "merge",
            Stage::GapFill => "gap_fill",
            Stage::Validate => "validate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
