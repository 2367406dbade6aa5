//! Tender Domain Layer
//!
//! Core data model for the tender processing engine. Everything the engine
//! reads, produces or hands across a crate boundary is defined here:
//!
//! ## Key Concepts
//!
//! - **UnifiedDocument**: ordered, labelled text spans from every uploaded or linked file
//! - **GroundTruthFacts**: deterministic, immutable facts found by pattern rules
//! - **TenderSummary**: the target record; every schema field is a value or the sentinel
//! - **Portal**: procurement portal tag selecting rule sets and required-field checklists
//! - **ProcessingStrategy**: single-pass or hierarchical, fixed once per run
//! - **InferenceProvider**: the boundary to a language model
//!
//! ## Architecture
//!
//! - Pure data and pure functions only
//! - No I/O and no async runtime
//! - Infrastructure implementations live in other crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod facts;
pub mod portal;
pub mod run;
pub mod schema;
pub mod strategy;
pub mod summary;
pub mod tokens;
pub mod traits;

// Re-exports for convenience
pub use document::{DocumentError, SourceSpan, UnifiedDocument};
pub use facts::{Fact, FactsBuilder, GroundTruthFacts, RuleOrigin, SourceRef};
pub use portal::Portal;
pub use run::RunId;
pub use schema::{field_spec, FieldKind, FieldSpec, SCHEMA, SENTINEL};
pub use strategy::{ProcessingStrategy, Stage};
pub use summary::{FieldValue, SummaryError, TenderSummary};
pub use tokens::estimate_tokens;
pub use traits::{InferenceProvider, InferenceRequest, ProviderError};
