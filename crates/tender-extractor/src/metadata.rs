//! Run metadata recorded alongside every summary

use crate::ground_truth::NoiseRecord;
use crate::hierarchical::ChunkFailure;
use serde::Serialize;
use std::collections::BTreeMap;
use tender_domain::{Portal, ProcessingStrategy, RunId, Stage};
use tender_gatekeeper::{CompletenessReport, Override, Provenance};
use tender_llm::CallUsage;

/// What happened during one processing run
///
/// Tracks the chosen strategy, budget charged per stage, chunk and gap
/// outcomes, and ground-truth conflicts.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    /// Run identifier
    pub run_id: RunId,

    /// Pipeline version
    pub pipeline_version: String,

    /// Model behind the provider
    pub model: String,

    /// Portal the run was processed as
    pub portal: Portal,

    /// Portal was detected from the text rather than given
    pub portal_detected: bool,

    /// Source labels in document order
    pub sources: Vec<String>,

    /// Chosen strategy
    pub strategy: ProcessingStrategy,

    /// Estimated tokens of the unified text
    pub estimated_tokens: u64,

    /// Estimate fell within the near-threshold band
    pub near_threshold: bool,

    /// Budget charged per stage
    pub stage_usage: BTreeMap<Stage, CallUsage>,

    /// Chunks summarised (hierarchical runs)
    pub chunk_count: usize,

    /// Chunks whose summary call failed
    pub chunk_failures: Vec<ChunkFailure>,

    /// Fields supplied by ground truth
    pub ground_truth_fields: Vec<String>,

    /// Rule matches rejected as noise
    pub extraction_noise: Vec<NoiseRecord>,

    /// Model values replaced by ground truth
    pub overridden: Vec<Override>,

    /// Draft keys outside the schema
    pub ignored_draft_keys: Vec<String>,

    /// Draft fields dropped because their value did not fit the field's kind
    pub malformed_draft_keys: Vec<String>,

    /// Recovery attempts per field
    pub gap_attempts: BTreeMap<String, u32>,

    /// Fields recovered by gap filling
    pub fields_recovered: Vec<String>,

    /// Checklist fields still missing after gap filling
    pub unresolved_fields: Vec<String>,

    /// Fields holding a concrete value in the final record
    pub fields_filled: usize,

    /// Source of every field in the final record
    pub field_sources: BTreeMap<String, Provenance>,

    /// Portal completeness report
    pub completeness: Option<CompletenessReport>,

    /// Wall-clock start, seconds since the Unix epoch
    pub started_at: u64,

    /// Run duration in milliseconds
    pub elapsed_ms: u64,
}

impl RunMetadata {
    /// Start metadata for a new run
    pub fn new(
        run_id: RunId,
        pipeline_version: impl Into<String>,
        model: impl Into<String>,
        portal: Portal,
        portal_detected: bool,
    ) -> Self {
        Self {
            run_id,
            pipeline_version: pipeline_version.into(),
            model: model.into(),
            portal,
            portal_detected,
            sources: Vec::new(),
            strategy: ProcessingStrategy::SinglePass,
            estimated_tokens: 0,
            near_threshold: false,
            stage_usage: BTreeMap::new(),
            chunk_count: 0,
            chunk_failures: Vec::new(),
            ground_truth_fields: Vec::new(),
            extraction_noise: Vec::new(),
            overridden: Vec::new(),
            ignored_draft_keys: Vec::new(),
            malformed_draft_keys: Vec::new(),
            gap_attempts: BTreeMap::new(),
            fields_recovered: Vec::new(),
            unresolved_fields: Vec::new(),
            fields_filled: 0,
            field_sources: BTreeMap::new(),
            completeness: None,
            started_at: 0,
            elapsed_ms: 0,
        }
    }

    /// Record budget charged by a stage
    pub fn record_usage(&mut self, stage: Stage, usage: CallUsage) {
        *self.stage_usage.entry(stage).or_default() += usage;
    }

    /// Record a gap-fill attempt count
    pub fn record_gap_attempts(&mut self, path: &str, attempts: u32) {
        *self.gap_attempts.entry(path.to_string()).or_insert(0) += attempts;
    }

    /// Budget charged across all stages
    pub fn total_usage(&self) -> CallUsage {
        let mut total = CallUsage::default();
        for usage in self.stage_usage.values() {
            total += *usage;
        }
        total
    }

    /// Requests charged by a stage
    pub fn requests_for(&self, stage: Stage) -> u64 {
        self.stage_usage.get(&stage).map(|u| u.requests).unwrap_or(0)
    }

    /// Total recovery attempts
    pub fn total_gap_attempts(&self) -> u32 {
        self.gap_attempts.values().sum()
    }

    /// Number of final fields that came from a source
    pub fn fields_from(&self, source: Provenance) -> usize {
        self.field_sources.values().filter(|p| **p == source).count()
    }

    /// Generate a summary report of the run
    pub fn summary(&self) -> String {
        let total = self.total_usage();
        let mut lines = vec![
            format!("Run {}", self.run_id),
            "======================".to_string(),
            format!(
                "Portal: {}{}",
                self.portal,
                if self.portal_detected { " (detected)" } else { "" }
            ),
            format!("Sources: {}", self.sources.join(", ")),
            format!(
                "Strategy: {} (~{} tokens{})",
                self.strategy,
                self.estimated_tokens,
                if self.near_threshold { ", near threshold" } else { "" }
            ),
            format!(
                "Model calls: {} requests, ~{} tokens, {} retries",
                total.requests, total.tokens, total.retries
            ),
        ];

        if self.chunk_count > 0 {
            lines.push(format!(
                "Chunks: {} ({} failed)",
                self.chunk_count,
                self.chunk_failures.len()
            ));
        }

        lines.push(format!(
            "Ground truth: {} fields, {} overrides, {} noisy matches",
            self.ground_truth_fields.len(),
            self.overridden.len(),
            self.extraction_noise.len()
        ));
        lines.push(format!(
            "Gap filling: {} attempts, {} recovered, {} unresolved",
            self.total_gap_attempts(),
            self.fields_recovered.len(),
            self.unresolved_fields.len()
        ));
        if !self.unresolved_fields.is_empty() {
            lines.push(format!("  Unresolved: {}", self.unresolved_fields.join(", ")));
        }
        if !self.malformed_draft_keys.is_empty() {
            lines.push(format!(
                "Malformed draft fields: {}",
                self.malformed_draft_keys.join(", ")
            ));
        }
        lines.push(format!(
            "Fields filled: {} ({} ground truth, {} gap fill, {} model)",
            self.fields_filled,
            self.fields_from(Provenance::GroundTruth),
            self.fields_from(Provenance::GapFill),
            self.fields_from(Provenance::Model)
        ));
        lines.push(format!("Elapsed: {}ms", self.elapsed_ms));

        lines.join("\n")
    }
}
