//! Error types for the processing engine

use tender_domain::{Stage, SummaryError};
use tender_gatekeeper::GatekeeperError;
use tender_llm::GatewayError;
use thiserror::Error;

/// Errors that abort a processing run
///
/// Chunk-level and gap-level failures never surface here; they are absorbed
/// and recorded in run metadata.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A stage-level model call failed (retries exhausted, fatal provider error,
    /// or a call the budget can never admit)
    #[error("Inference failed during {stage}: {source}")]
    Inference {
        /// Stage whose call failed
        stage: Stage,
        /// Gateway failure
        #[source]
        source: GatewayError,
    },

    /// The model's draft could not be parsed as a JSON object
    #[error("Invalid model output during {stage}: {message}")]
    InvalidFormat {
        /// Stage that produced the output
        stage: Stage,
        /// Parse failure
        message: String,
    },

    /// A field value is structurally malformed
    #[error("Schema violation at {path}: {reason}")]
    SchemaViolation {
        /// Offending field path
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// The run was cancelled before the given stage started
    #[error("Run cancelled before {stage}")]
    Cancelled {
        /// Stage that did not start
        stage: Stage,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Stage the failure belongs to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EngineError::Inference { stage, .. }
            | EngineError::InvalidFormat { stage, .. }
            | EngineError::Cancelled { stage } => Some(*stage),
            EngineError::SchemaViolation { .. } => Some(Stage::Validate),
            EngineError::Config(_) => None,
        }
    }
}

impl From<GatekeeperError> for EngineError {
    fn from(e: GatekeeperError) -> Self {
        match e {
            GatekeeperError::SchemaViolation { path, reason } => {
                EngineError::SchemaViolation { path, reason }
            }
            GatekeeperError::Config(msg) => EngineError::Config(msg),
        }
    }
}

impl From<SummaryError> for EngineError {
    fn from(e: SummaryError) -> Self {
        GatekeeperError::from(e).into()
    }
}
