//! Rate-limited inference gateway

use crate::budget::{BudgetError, CallCost, RateBudget};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tender_domain::{estimate_tokens, InferenceProvider, InferenceRequest, ProviderError, Stage};
use thiserror::Error;
use tracing::{debug, warn};

/// Default tokens reserved for the model's response
pub const DEFAULT_RESPONSE_RESERVE: u64 = 1_000;

/// Errors returned by [`InferenceGateway::submit`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The call can never be admitted by the budget
    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    /// Retryable failures continued until the retry bound
    #[error("{stage} call failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Stage the call belonged to
        stage: Stage,
        /// Attempts made
        attempts: u32,
        /// Last provider error
        last: ProviderError,
        /// Budget charged across all attempts
        usage: CallUsage,
    },

    /// Provider reported a non-retryable failure
    #[error("{stage} call failed: {error}")]
    Fatal {
        /// Stage the call belonged to
        stage: Stage,
        /// Provider error
        error: ProviderError,
        /// Budget charged across all attempts
        usage: CallUsage,
    },
}

impl GatewayError {
    /// Budget charged before the call failed
    pub fn usage(&self) -> CallUsage {
        match self {
            GatewayError::Budget(_) => CallUsage::default(),
            GatewayError::RetriesExhausted { usage, .. } | GatewayError::Fatal { usage, .. } => {
                *usage
            }
        }
    }
}

/// Retry and backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, first attempt included
    pub max_attempts: u32,

    /// Base backoff (milliseconds); attempt `n` waits `base * 2^n`
    pub base_delay_ms: u64,

    /// Backoff ceiling (milliseconds), before jitter
    pub max_delay_ms: u64,

    /// Extra wait after a rate-limited response (milliseconds)
    pub rate_limit_penalty_ms: u64,

    /// Upper bound of the uniform random jitter (milliseconds)
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
            rate_limit_penalty_ms: 5_000,
            jitter_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms cannot be less than base_delay_ms".to_string());
        }
        Ok(())
    }

    /// Backoff before the retry that follows failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32, rate_limited: bool) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.max_delay_ms);
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        let penalty = if rate_limited { self.rate_limit_penalty_ms } else { 0 };
        Duration::from_millis(exp + jitter + penalty)
    }
}

/// Budget charged by one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallUsage {
    /// Requests debited (one per attempt)
    pub requests: u64,
    /// Tokens debited
    pub tokens: u64,
    /// Retries performed
    pub retries: u32,
}

impl AddAssign for CallUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.requests += rhs.requests;
        self.tokens += rhs.tokens;
        self.retries += rhs.retries;
    }
}

/// One model call routed through the gateway
#[derive(Debug, Clone)]
pub struct InferenceCall {
    /// Pipeline stage, for accounting and logs
    pub stage: Stage,
    /// The request
    pub request: InferenceRequest,
    /// Tokens reserved for the response
    pub response_reserve: u64,
}

impl InferenceCall {
    /// Call with the default response reserve
    pub fn new(stage: Stage, request: InferenceRequest) -> Self {
        Self {
            stage,
            request,
            response_reserve: DEFAULT_RESPONSE_RESERVE,
        }
    }

    /// Override the response reserve
    pub fn with_response_reserve(mut self, tokens: u64) -> Self {
        self.response_reserve = tokens;
        self
    }

    /// Estimated tokens this call will consume
    pub fn estimated_tokens(&self) -> u64 {
        let hint = self
            .request
            .schema_hint
            .as_deref()
            .map(estimate_tokens)
            .unwrap_or(0);
        estimate_tokens(&self.request.prompt)
            + estimate_tokens(&self.request.context)
            + hint
            + self.response_reserve
    }
}

/// Successful model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Raw model text
    pub text: String,
    /// Budget charged, retries included
    pub usage: CallUsage,
}

/// Process-wide gateway counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Attempts admitted by the budget
    pub admitted: u64,
    /// Tokens debited
    pub tokens: u64,
    /// Retries performed
    pub retries: u64,
    /// Calls that ended in failure
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    tokens: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

/// The sole path to an inference provider
///
/// Every attempt, retries included, is admitted by the shared
/// [`RateBudget`] before it reaches the provider.
#[derive(Debug)]
pub struct InferenceGateway<P> {
    provider: Arc<P>,
    budget: Arc<RateBudget>,
    retry: RetryPolicy,
    counters: Counters,
}

impl<P: InferenceProvider> InferenceGateway<P> {
    /// Create a gateway owning the provider
    pub fn new(provider: P, budget: Arc<RateBudget>, retry: RetryPolicy) -> Self {
        Self::with_shared_provider(Arc::new(provider), budget, retry)
    }

    /// Create a gateway around an already shared provider
    pub fn with_shared_provider(
        provider: Arc<P>,
        budget: Arc<RateBudget>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            budget,
            retry,
            counters: Counters::default(),
        }
    }

    /// The provider behind this gateway
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The shared budget
    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    /// The retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Counters since creation
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            tokens: self.counters.tokens.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Submit a call: wait for budget, dispatch, retry on retryable failures
    pub async fn submit(&self, call: InferenceCall) -> Result<Completion, GatewayError> {
        let tokens = call.estimated_tokens();
        let cost = CallCost::request(tokens);
        let mut usage = CallUsage::default();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.budget.acquire(cost).await?;
            usage.requests += 1;
            usage.tokens += tokens;
            self.counters.admitted.fetch_add(1, Ordering::Relaxed);
            self.counters.tokens.fetch_add(tokens, Ordering::Relaxed);

            debug!(
                "{} call attempt {} dispatched (~{} tokens)",
                call.stage, attempt, tokens
            );

            let err = match self.provider.complete(&call.request).await {
                Ok(text) => {
                    debug!("{} call returned {} bytes", call.stage, text.len());
                    return Ok(Completion { text, usage });
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("{} call failed permanently: {}", call.stage, err);
                return Err(GatewayError::Fatal {
                    stage: call.stage,
                    error: err,
                    usage,
                });
            }

            if attempt >= self.retry.max_attempts {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "{} call gave up after {} attempts: {}",
                    call.stage, attempt, err
                );
                return Err(GatewayError::RetriesExhausted {
                    stage: call.stage,
                    attempts: attempt,
                    last: err,
                    usage,
                });
            }

            let delay = self
                .retry
                .backoff(attempt, matches!(err, ProviderError::RateLimited(_)));
            usage.retries += 1;
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                "{} call attempt {} failed: {}; retrying in {:?}",
                call.stage, attempt, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
