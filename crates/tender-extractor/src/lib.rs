//! Tender Extractor
//!
//! The processing engine: turns a unified tender document into a validated
//! `TenderSummary` while keeping model cost bounded.
//!
//! # Architecture
//!
//! ```text
//! UnifiedDocument ─► ground truth ─► strategy ─┬─► single-pass context ──────────┐
//!                                              └─► chunks ─► summaries ─► merge ─┤
//!                                                                                ▼
//!                      final record ◄─ merge + validate ◄─ gap filling ◄─ draft
//! ```
//!
//! Every model call goes through one `InferenceGateway`, which charges a
//! shared `RateBudget`. Ground truth is extracted before any model call and
//! is never overwritten by model output.
//!
//! # Key Features
//!
//! - **Strategy selection**: one bounded call for small documents,
//!   chunk-summarise-merge for large ones
//! - **Bounded fan-out**: chunk summaries run concurrently up to a limit and
//!   merge in chunk order whatever order they finish in
//! - **Gap filling**: targeted recovery queries for missing checklist fields,
//!   bounded per field
//! - **Run metadata**: strategy, budget per stage, chunk failures, overrides
//!   and unresolved fields for every run
//!
//! # Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use tender_domain::UnifiedDocument;
//! use tender_extractor::{EngineConfig, ProcessingRequest, TenderEngine};
//! use tender_llm::{MockProvider, RateBudget};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let config = EngineConfig::default();
//! let budget = Arc::new(RateBudget::new(config.budget.clone()));
//! let provider = MockProvider::new(r#"{"tender_meta": {"tender_title": "Supply of laptops"}}"#);
//! let engine = TenderEngine::new(provider, budget, config).unwrap();
//!
//! let document = UnifiedDocument::single("nit.pdf", "Bid End Date: 12-03-2025").unwrap();
//! let outcome = engine
//!     .process(ProcessingRequest::new(document), &CancellationToken::new())
//!     .await
//!     .unwrap();
//!
//! let json = outcome.summary.to_json();
//! assert_eq!(json["key_dates"]["bid_end"], "12-03-2025");
//! assert_eq!(json["tender_meta"]["tender_title"], "Supply of laptops");
//! # });
//! ```

#![warn(missing_docs)]

mod chunking;
mod config;
mod context;
mod engine;
mod error;
mod gap_fill;
mod ground_truth;
mod hierarchical;
mod metadata;
mod parser;
mod prompt;
mod strategy;
mod types;


pub use chunking::{Chunk, TextChunker};
pub use config::EngineConfig;
pub use context::{build_context, truncate_middle, TRUNCATION_MARKER};
pub use engine::TenderEngine;
pub use error::EngineError;
pub use gap_fill::{fillable, select_passages, AttemptLedger, GapOutcome, GapReport, GapState};
pub use ground_truth::{detect_portal, GroundTruthExtractor, GroundTruthReport, NoiseRecord};
pub use hierarchical::{ChunkFailure, MasterContext, MicroSummary};
pub use metadata::RunMetadata;
pub use parser::parse_json_object;
pub use prompt::{schema_template, CHUNK_TASK, GAP_TASK, MERGE_TASK, SINGLE_PASS_TASK};
pub use strategy::{select_strategy, StrategyDecision};
pub use types::{ProcessingOutcome, ProcessingRequest};
