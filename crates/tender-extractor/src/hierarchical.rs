//! Chunk summarisation for the hierarchical path
//!
//! Every chunk gets one summary call. Calls run concurrently up to the
//! in-flight limit; each still waits for admission by the shared budget.
//! Summaries land in an arena indexed by chunk position, so completion order
//! never changes the order they are merged in. A chunk whose call fails
//! contributes an empty summary and is recorded; the run carries on.

use crate::chunking::Chunk;
use crate::prompt::PromptBuilder;
use futures::future::join_all;
use serde::Serialize;
use tender_domain::{InferenceProvider, Stage};
use tender_llm::{CallUsage, InferenceCall, InferenceGateway};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Summary of one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroSummary {
    /// Index of the summarised chunk
    pub index: usize,
    /// Summary text; empty when the call failed
    pub text: String,
}

impl MicroSummary {
    fn empty(index: usize) -> Self {
        Self {
            index,
            text: String::new(),
        }
    }
}

/// A chunk whose summary call failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    /// Chunk index
    pub index: usize,
    /// Failure description
    pub error: String,
}

/// Chunk summaries in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterContext {
    summaries: Vec<MicroSummary>,
}

impl MasterContext {
    /// Summaries in chunk order
    pub fn summaries(&self) -> &[MicroSummary] {
        &self.summaries
    }

    /// Number of chunks covered
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    /// True when no chunk was summarised
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Single text with a numbered header per non-empty summary
    pub fn render(&self) -> String {
        self.summaries
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| format!("--- CHUNK {} ---\n{}", s.index + 1, s.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result of summarising every chunk
#[derive(Debug, Clone, Default)]
pub struct HierarchicalOutcome {
    /// Ordered summaries
    pub master: MasterContext,
    /// Chunks whose call failed
    pub failures: Vec<ChunkFailure>,
    /// Budget charged across all chunk calls
    pub usage: CallUsage,
}

/// Summarise every chunk with at most `max_in_flight` calls at once
pub async fn summarize_chunks<P: InferenceProvider>(
    gateway: &InferenceGateway<P>,
    prompts: &PromptBuilder<'_>,
    chunks: &[Chunk],
    max_in_flight: usize,
    response_reserve: u64,
) -> HierarchicalOutcome {
    let total = chunks.len();
    let semaphore = Semaphore::new(max_in_flight.max(1));
    info!("Summarising {} chunks, {} in flight", total, max_in_flight.max(1));

    let calls = chunks.iter().map(|chunk| {
        let semaphore = &semaphore;
        let call = InferenceCall::new(Stage::MicroSummary, prompts.micro_summary(chunk, total))
            .with_response_reserve(response_reserve);
        async move {
            let result = match semaphore.acquire().await {
                Ok(_permit) => gateway.submit(call).await,
                Err(closed) => {
                    warn!("Chunk {} skipped: {}", chunk.index, closed);
                    return (chunk.index, None);
                }
            };
            (chunk.index, Some(result))
        }
    });
    let results = join_all(calls).await;

    let mut arena: Vec<Option<MicroSummary>> = vec![None; total];
    let mut failures = Vec::new();
    let mut usage = CallUsage::default();

    for (index, result) in results {
        let summary = match result {
            Some(Ok(completion)) => {
                usage += completion.usage;
                MicroSummary {
                    index,
                    text: completion.text.trim().to_string(),
                }
            }
            Some(Err(e)) => {
                usage += e.usage();
                warn!("Chunk {} of {} failed: {}", index + 1, total, e);
                failures.push(ChunkFailure {
                    index,
                    error: e.to_string(),
                });
                MicroSummary::empty(index)
            }
            None => {
                failures.push(ChunkFailure {
                    index,
                    error: "admission closed".to_string(),
                });
                MicroSummary::empty(index)
            }
        };
        if let Some(slot) = arena.get_mut(index) {
            *slot = Some(summary);
        }
    }

    let summaries = arena
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.unwrap_or_else(|| MicroSummary::empty(index)))
        .collect();

    if !failures.is_empty() {
        warn!("{} of {} chunk summaries failed", failures.len(), total);
    }

    HierarchicalOutcome {
        master: MasterContext { summaries },
        failures,
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TextChunker;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tender_domain::{GroundTruthFacts, InferenceRequest, Portal, ProviderError};
    use tender_llm::{BudgetConfig, MockProvider, RateBudget, RetryPolicy};

    fn gateway<P: InferenceProvider>(provider: P) -> InferenceGateway<P> {
        let budget = Arc::new(RateBudget::new(BudgetConfig::default()));
        InferenceGateway::new(provider, budget, RetryPolicy::none())
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        let text: String = (0..n).map(|i| format!("{:<39}\n", i)).collect();
        TextChunker::new(10).chunk(&text)
    }

    #[tokio::test]
    async fn test_summaries_are_in_chunk_order() {
        let provider = MockProvider::new("fact");
        for i in 1..=4 {
            provider.add_response(format!("Chunk {} of 4", i), format!("facts of chunk {}", i));
        }
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);
        let chunks = chunks(4);
        assert_eq!(chunks.len(), 4);

        let outcome = summarize_chunks(&gateway(provider), &prompts, &chunks, 2, 100).await;
        let rendered = outcome.master.render();
        let positions: Vec<usize> = (1..=4)
            .map(|i| rendered.find(&format!("--- CHUNK {} ---", i)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(rendered.contains("facts of chunk 3"));
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.usage.requests, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_order_does_not_change_merge_order() {
        let provider = MockProvider::new("fact");
        for i in 1..=4u64 {
            provider.add_response(format!("Chunk {} of 4", i), format!("summary {}", i));
            provider.add_delay(format!("Chunk {} of 4", i), Duration::from_millis(100 * (5 - i)));
        }
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);

        let outcome = summarize_chunks(&gateway(provider), &prompts, &chunks(4), 4, 100).await;
        let texts: Vec<&str> = outcome.master.summaries().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["summary 1", "summary 2", "summary 3", "summary 4"]);
    }

    #[tokio::test]
    async fn test_failed_chunk_contributes_empty_summary() {
        let provider = MockProvider::new("fact");
        provider.add_error("Chunk 2 of 3", ProviderError::Fatal("bad request".into()));
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);

        let outcome = summarize_chunks(&gateway(provider), &prompts, &chunks(3), 3, 100).await;
        assert_eq!(outcome.master.len(), 3);
        assert_eq!(outcome.master.summaries()[1].text, "");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert!(!outcome.master.render().contains("--- CHUNK 2 ---"));
    }

    struct CountingProvider {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InferenceProvider for CountingProvider {
        async fn complete(&self, _request: &InferenceRequest) -> Result<String, ProviderError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("fact".to_string())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_limit_is_respected() {
        let gateway = gateway(CountingProvider {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);

        let outcome = summarize_chunks(&gateway, &prompts, &chunks(10), 3, 100).await;
        assert_eq!(outcome.master.len(), 10);
        assert_eq!(gateway.provider().peak.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_render_skips_empty_summaries() {
        let master = MasterContext {
            summaries: vec![
                MicroSummary {
                    index: 0,
                    text: "a".into(),
                },
                MicroSummary::empty(1),
            ],
        };
        assert_eq!(master.render(), "--- CHUNK 1 ---\na");
    }
}
