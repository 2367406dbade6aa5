//! Tender LLM Layer
//!
//! Everything between the processing engine and a language model.
//!
//! # Architecture
//!
//! ```text
//! engine ──► InferenceGateway ──► RateBudget (shared, Arc)
//!                   │
//!                   └──► InferenceProvider (Ollama, Mock, ...)
//! ```
//!
//! The [`InferenceGateway`] is the only path to a provider. It charges every
//! attempt against the shared [`RateBudget`], retries throttled and transient
//! failures with exponential backoff and jitter, and fails hard once the
//! retry bound is reached.
//!
//! # Providers
//!
//! - `MockProvider`: scripted, deterministic provider for tests
//! - `OllamaProvider`: local Ollama API integration
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tender_domain::{InferenceRequest, Stage};
//! use tender_llm::{
//!     BudgetConfig, InferenceCall, InferenceGateway, MockProvider, RateBudget, RetryPolicy,
//! };
//!
//! # tokio_test::block_on(async {
//! let provider = MockProvider::new("{\"ok\": true}");
//! let budget = Arc::new(RateBudget::new(BudgetConfig::default()));
//! let gateway = InferenceGateway::new(provider, budget, RetryPolicy::default());
//!
//! let call = InferenceCall::new(Stage::SinglePass, InferenceRequest::new("Extract", "text"));
//! let completion = gateway.submit(call).await.unwrap();
//! assert_eq!(completion.text, "{\"ok\": true}");
//! assert_eq!(completion.usage.requests, 1);
//! # });
//! ```

#![warn(missing_docs)]

pub mod budget;
pub mod gateway;
pub mod ollama;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tender_domain::{InferenceProvider, InferenceRequest, ProviderError};
use thiserror::Error;

pub use budget::{BudgetConfig, BudgetError, BudgetSnapshot, CallCost, RateBudget};
pub use gateway::{
    CallUsage, Completion, GatewayError, GatewayStats, InferenceCall, InferenceGateway,
    RetryPolicy,
};
pub use ollama::OllamaProvider;

/// Errors that can occur while talking to an LLM backend
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server-side failure (5xx)
    #[error("Server error: {0}")]
    Server(String),

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Request rejected (4xx other than 404/429)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Client could not be constructed
    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl From<LlmError> for ProviderError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimitExceeded(_) => ProviderError::RateLimited(e.to_string()),
            LlmError::Communication(_)
            | LlmError::Timeout(_)
            | LlmError::Server(_)
            | LlmError::InvalidResponse(_) => ProviderError::Transient(e.to_string()),
            LlmError::ModelNotAvailable(_) | LlmError::Rejected(_) | LlmError::Setup(_) => {
                ProviderError::Fatal(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Error(ProviderError),
}

#[derive(Debug, Default)]
struct MockState {
    replies: Vec<(String, MockReply)>,
    queued_failures: VecDeque<(String, ProviderError)>,
    delays: Vec<(String, Duration)>,
    requests: Vec<InferenceRequest>,
}

/// Mock provider for deterministic testing
///
/// Replies are chosen by the first registered needle found in the request's
/// prompt; unmatched prompts get the default response. Clones share state,
/// so a test can keep a handle after moving the provider into a gateway.
///
/// # Examples
///
/// ```
/// use tender_domain::{InferenceProvider, InferenceRequest, ProviderError};
/// use tender_llm::MockProvider;
///
/// # tokio_test::block_on(async {
/// let provider = MockProvider::new("default");
/// provider.add_response("CHUNK", "chunk facts");
/// provider.fail_once("MERGE", ProviderError::Transient("503".into()));
///
/// let chunk = InferenceRequest::new("CHUNK 1", "");
/// assert_eq!(provider.complete(&chunk).await.unwrap(), "chunk facts");
///
/// let merge = InferenceRequest::new("MERGE", "");
/// assert!(provider.complete(&merge).await.is_err());
/// assert_eq!(provider.complete(&merge).await.unwrap(), "default");
/// assert_eq!(provider.call_count(), 3);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a MockProvider with a fixed response for unmatched prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reply with `response` to prompts containing `needle`
    pub fn add_response(&self, needle: impl Into<String>, response: impl Into<String>) {
        self.state()
            .replies
            .push((needle.into(), MockReply::Text(response.into())));
    }

    /// Always fail prompts containing `needle`
    pub fn add_error(&self, needle: impl Into<String>, error: ProviderError) {
        self.state()
            .replies
            .push((needle.into(), MockReply::Error(error)));
    }

    /// Fail the next prompt containing `needle` once; an empty needle matches any prompt
    pub fn fail_once(&self, needle: impl Into<String>, error: ProviderError) {
        self.state().queued_failures.push_back((needle.into(), error));
    }

    /// Delay replies to prompts containing `needle`
    pub fn add_delay(&self, needle: impl Into<String>, delay: Duration) {
        self.state().delays.push((needle.into(), delay));
    }

    /// Number of completed or failed calls
    pub fn call_count(&self) -> usize {
        self.state().requests.len()
    }

    /// Number of calls whose prompt contained `needle`
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.prompt.contains(needle))
            .count()
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.state().requests.clone()
    }

    /// Forget recorded requests
    pub fn reset_call_count(&self) {
        self.state().requests.clear();
    }

    fn plan(
        &self,
        request: &InferenceRequest,
    ) -> (Result<String, ProviderError>, Option<Duration>) {
        let mut state = self.state();
        state.requests.push(request.clone());

        let delay = state
            .delays
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, d)| *d);

        let queued = state
            .queued_failures
            .iter()
            .position(|(needle, _)| request.prompt.contains(needle.as_str()));
        if let Some(err) = queued.and_then(|i| state.queued_failures.remove(i)) {
            return (Err(err.1), delay);
        }

        let reply = state
            .replies
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());
        let result = match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Error(err)) => Err(err),
            None => Ok(self.default_response.clone()),
        };
        (result, delay)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

impl InferenceProvider for MockProvider {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, ProviderError> {
        let (result, delay) = self.plan(request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> InferenceRequest {
        InferenceRequest::new(prompt, "context")
    }

    #[tokio::test]
    async fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        assert_eq!(provider.complete(&request("any")).await.unwrap(), "Test response");
    }

    #[tokio::test]
    async fn test_mock_provider_specific_responses() {
        let provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.complete(&request("say hello")).await.unwrap(), "world");
        assert_eq!(provider.complete(&request("foo?")).await.unwrap(), "bar");
        assert_eq!(
            provider.complete(&request("unknown")).await.unwrap(),
            "Default mock response"
        );
        assert_eq!(provider.calls_matching("foo"), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_errors() {
        let provider = MockProvider::default();
        provider.add_error("bad", ProviderError::Fatal("400".into()));
        provider.fail_once("", ProviderError::RateLimited("429".into()));

        assert!(matches!(
            provider.complete(&request("good")).await,
            Err(ProviderError::RateLimited(_))
        ));
        assert!(provider.complete(&request("good")).await.is_ok());
        assert!(matches!(
            provider.complete(&request("bad")).await,
            Err(ProviderError::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();
        provider1.complete(&request("x")).await.unwrap();

        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
        assert_eq!(provider2.requests()[0].prompt, "x");

        provider2.reset_call_count();
        assert_eq!(provider1.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_provider_delay() {
        let provider = MockProvider::new("late");
        provider.add_delay("slow", Duration::from_secs(3));
        let start = tokio::time::Instant::now();
        provider.complete(&request("slow call")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn test_llm_error_classification() {
        assert!(matches!(
            ProviderError::from(LlmError::RateLimitExceeded("x".into())),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from(LlmError::Server("502".into())),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::from(LlmError::ModelNotAvailable("m".into())),
            ProviderError::Fatal(_)
        ));
    }
}
