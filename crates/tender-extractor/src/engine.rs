//! The processing engine

use crate::chunking::TextChunker;
use crate::config::EngineConfig;
use crate::context::{build_context, truncate_middle};
use crate::error::EngineError;
use crate::gap_fill::{GapFillSettings, GapFiller};
use crate::ground_truth::{detect_portal, GroundTruthExtractor};
use crate::hierarchical::summarize_chunks;
use crate::metadata::RunMetadata;
use crate::parser::parse_draft;
use crate::prompt::PromptBuilder;
use crate::strategy::select_strategy;
use crate::types::{ProcessingOutcome, ProcessingRequest};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tender_domain::{
    estimate_tokens, FieldValue, InferenceProvider, Portal, ProcessingStrategy, RunId, Stage,
    TenderSummary,
};
use tender_gatekeeper::{check_completeness, Gatekeeper, Merger, NormalizedDraft, Provenance};
use tender_llm::{Completion, InferenceCall, InferenceGateway, RateBudget};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PORTAL_FIELD: &str = "tender_meta.portal";

/// Turns a unified tender document into a validated record
///
/// The engine owns no shared state of its own: the rate budget lives in the
/// gateway and may be shared with other engines in the same process.
pub struct TenderEngine<P> {
    gateway: Arc<InferenceGateway<P>>,
    gatekeeper: Gatekeeper,
    merger: Merger,
    extractor: GroundTruthExtractor,
    config: EngineConfig,
}

impl<P: InferenceProvider> TenderEngine<P> {
    /// Create an engine with its own gateway over a shared budget
    pub fn new(
        provider: P,
        budget: Arc<RateBudget>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let gateway = InferenceGateway::new(provider, budget, config.retry.clone());
        Self::with_gateway(Arc::new(gateway), config)
    }

    /// Create an engine over an existing gateway
    pub fn with_gateway(
        gateway: Arc<InferenceGateway<P>>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        Ok(Self {
            gateway,
            gatekeeper: Gatekeeper::new(config.validation.clone()),
            merger: Merger::new(),
            extractor: GroundTruthExtractor::new(),
            config,
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gateway every model call goes through
    pub fn gateway(&self) -> &Arc<InferenceGateway<P>> {
        &self.gateway
    }

    /// Process one document set
    ///
    /// Cancellation is checked between stages; calls already in flight
    /// complete and stay charged to the budget.
    pub async fn process(
        &self,
        request: ProcessingRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessingOutcome, EngineError> {
        let started = Instant::now();
        let document = &request.document;
        let text = document.text();

        let (portal, portal_detected) = match request.portal {
            Some(portal) => (portal, false),
            None => (detect_portal(text), true),
        };

        let mut metadata = RunMetadata::new(
            RunId::new(),
            self.config.pipeline_version.clone(),
            self.gateway.provider().model_name(),
            portal,
            portal_detected,
        );
        metadata.started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        metadata.sources = document.spans().iter().map(|s| s.label.clone()).collect();

        info!(
            "Run {}: {} sources, {} bytes, portal {}{}",
            metadata.run_id,
            metadata.sources.len(),
            text.len(),
            portal,
            if portal_detected { " (detected)" } else { "" }
        );

        checkpoint(cancel, Stage::GroundTruth)?;
        let ground_truth = self.extractor.extract(document, portal);
        let facts = ground_truth.facts;
        metadata.ground_truth_fields = facts.paths().into_iter().map(String::from).collect();
        metadata.extraction_noise = ground_truth.noise;

        checkpoint(cancel, Stage::Strategy)?;
        let decision = select_strategy(
            estimate_tokens(text),
            self.config.single_pass_token_threshold,
            self.config.near_threshold_ratio,
        );
        metadata.strategy = decision.strategy;
        metadata.estimated_tokens = decision.estimated_tokens;
        metadata.near_threshold = decision.near_threshold;
        info!(
            "Run {}: {} (~{} tokens, threshold {})",
            metadata.run_id, decision.strategy, decision.estimated_tokens, decision.threshold
        );

        let prompts = PromptBuilder::new(portal, &facts);
        let draft = match decision.strategy {
            ProcessingStrategy::SinglePass => {
                checkpoint(cancel, Stage::SinglePass)?;
                self.single_pass(&prompts, text, &mut metadata).await?
            }
            ProcessingStrategy::Hierarchical => {
                self.hierarchical(&prompts, text, &mut metadata, cancel).await?
            }
        };
        metadata.ignored_draft_keys = draft.ignored_keys;
        if !draft.malformed_keys.is_empty() {
            warn!(
                "Run {}: {} draft fields dropped as malformed",
                metadata.run_id,
                draft.malformed_keys.len()
            );
        }
        metadata.malformed_draft_keys = draft.malformed_keys;

        let mut first = self.merger.merge(&facts, &BTreeMap::new(), &draft.summary)?;
        if !first.overridden.is_empty() {
            debug!("Ground truth replaced {} model values", first.overridden.len());
        }
        fill_portal(&mut first.summary, portal)?;

        checkpoint(cancel, Stage::GapFill)?;
        let settings = GapFillSettings {
            max_attempts: self.config.max_gap_attempts_per_field,
            context_tokens: self.config.gap_context_tokens,
            response_reserve: self.config.response_token_reserve,
        };
        let gaps = GapFiller::new(&self.gateway, &prompts, &self.gatekeeper, settings)
            .run(&first.summary, portal, text, cancel)
            .await?;
        metadata.record_usage(Stage::GapFill, gaps.usage);
        for (path, attempts) in gaps.ledger.iter() {
            metadata.record_gap_attempts(path, attempts);
        }
        metadata.fields_recovered = gaps.recovered.keys().map(|p| p.to_string()).collect();
        metadata.unresolved_fields = gaps.unresolved.iter().map(|p| p.to_string()).collect();

        checkpoint(cancel, Stage::Validate)?;
        let merged = self.merger.merge(&facts, &gaps.recovered, &draft.summary)?;
        let mut summary = merged.summary;
        let mut provenance = merged.provenance;
        if fill_portal(&mut summary, portal)? {
            provenance.insert(PORTAL_FIELD, Provenance::GroundTruth);
        }
        self.gatekeeper.ensure_valid(&summary)?;

        metadata.overridden = merged.overridden;
        metadata.field_sources = provenance
            .into_iter()
            .map(|(path, source)| (path.to_string(), source))
            .collect();
        metadata.fields_filled = summary.mentioned_count();
        metadata.completeness = Some(check_completeness(&summary, portal));
        metadata.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            "Run {} complete: {} fields filled, {} unresolved, {} model requests",
            metadata.run_id,
            metadata.fields_filled,
            metadata.unresolved_fields.len(),
            metadata.total_usage().requests
        );
        debug!("{}", metadata.summary());

        Ok(ProcessingOutcome { summary, metadata })
    }

    async fn single_pass(
        &self,
        prompts: &PromptBuilder<'_>,
        text: &str,
        metadata: &mut RunMetadata,
    ) -> Result<NormalizedDraft, EngineError> {
        let context = build_context(text, self.config.context_token_budget);
        debug!("Single-pass context: ~{} tokens", estimate_tokens(&context));

        let call = InferenceCall::new(Stage::SinglePass, prompts.single_pass(context))
            .with_response_reserve(self.config.record_response_token_reserve);
        let completion = self.submit(call, metadata).await?;
        debug!("Single-pass response: {} bytes", completion.text.len());
        parse_draft(&completion.text, &self.gatekeeper, Stage::SinglePass)
    }

    async fn hierarchical(
        &self,
        prompts: &PromptBuilder<'_>,
        text: &str,
        metadata: &mut RunMetadata,
        cancel: &CancellationToken,
    ) -> Result<NormalizedDraft, EngineError> {
        checkpoint(cancel, Stage::MicroSummary)?;
        let chunks = TextChunker::new(self.config.max_chunk_tokens).chunk(text);
        metadata.chunk_count = chunks.len();

        let outcome = summarize_chunks(
            &self.gateway,
            prompts,
            &chunks,
            self.config.max_in_flight_chunks,
            self.config.response_token_reserve,
        )
        .await;
        metadata.record_usage(Stage::MicroSummary, outcome.usage);
        if outcome.failures.len() == chunks.len() && !chunks.is_empty() {
            warn!("Every chunk summary failed; merging an empty master context");
        }
        metadata.chunk_failures = outcome.failures;

        checkpoint(cancel, Stage::Merge)?;
        let rendered = outcome.master.render();
        let master = truncate_middle(&rendered, self.config.context_token_budget);
        if master.len() < rendered.len() {
            warn!(
                "Master context of ~{} tokens cut to the {} token budget",
                estimate_tokens(&rendered),
                self.config.context_token_budget
            );
        }

        let call = InferenceCall::new(Stage::Merge, prompts.merge(master))
            .with_response_reserve(self.config.record_response_token_reserve);
        let completion = self.submit(call, metadata).await?;
        debug!("Merge response: {} bytes", completion.text.len());
        parse_draft(&completion.text, &self.gatekeeper, Stage::Merge)
    }

    async fn submit(
        &self,
        call: InferenceCall,
        metadata: &mut RunMetadata,
    ) -> Result<Completion, EngineError> {
        let stage = call.stage;
        match self.gateway.submit(call).await {
            Ok(completion) => {
                metadata.record_usage(stage, completion.usage);
                Ok(completion)
            }
            Err(source) => {
                metadata.record_usage(stage, source.usage());
                Err(EngineError::Inference { stage, source })
            }
        }
    }
}

/// Set `tender_meta.portal` from the run portal when no source named it
fn fill_portal(summary: &mut TenderSummary, portal: Portal) -> Result<bool, EngineError> {
    if summary.get(PORTAL_FIELD).is_some_and(FieldValue::is_mentioned) {
        return Ok(false);
    }
    summary.set(PORTAL_FIELD, FieldValue::text(portal.as_str()))?;
    Ok(true)
}

fn checkpoint(cancel: &CancellationToken, stage: Stage) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        info!("Run cancelled before {}", stage);
        return Err(EngineError::Cancelled { stage });
    }
    Ok(())
}
