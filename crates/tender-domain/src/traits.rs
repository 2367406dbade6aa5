//! Trait definitions for external interactions
//!
//! The language model is the only external collaborator the engine calls.
//! Implementations live in `tender-llm`.

use std::future::Future;
use thiserror::Error;

/// One request to a language model
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InferenceRequest {
    /// Task instructions
    pub prompt: String,

    /// Document material the task operates on
    pub context: String,

    /// Expected response shape, if the task expects JSON
    pub schema_hint: Option<String>,
}

impl InferenceRequest {
    /// Request with instructions and context and no schema hint
    pub fn new(prompt: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: context.into(),
            schema_hint: None,
        }
    }

    /// Attach a schema hint
    pub fn with_schema_hint(mut self, hint: impl Into<String>) -> Self {
        self.schema_hint = Some(hint.into());
        self
    }

    /// Single text as sent to a completion endpoint
    pub fn render(&self) -> String {
        let mut out = self.prompt.clone();
        if let Some(hint) = &self.schema_hint {
            out.push_str("\n\nRESPONSE SCHEMA:\n");
            out.push_str(hint);
        }
        if !self.context.is_empty() {
            out.push_str("\n\nDOCUMENT:\n");
            out.push_str(&self.context);
        }
        out
    }
}

/// Provider failures, classified by how the caller should react
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider throttled the call; retry after backing off
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Temporary failure (network, 5xx, timeout); retry
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Permanent failure (bad request, missing model, bad credentials); do not retry
    #[error("Fatal provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// True unless the failure is fatal
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Fatal(_))
    }
}

/// Trait for language model providers
///
/// Implemented by the infrastructure layer (tender-llm)
pub trait InferenceProvider: Send + Sync {
    /// Complete a request, returning the raw model text
    fn complete(
        &self,
        request: &InferenceRequest,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// Model name, recorded in run metadata
    fn model_name(&self) -> &str;
}
