//! Process-wide rate budget
//!
//! Two token buckets, one counting requests and one counting model tokens.
//! Both refill continuously at their per-minute rate and are capped at their
//! burst size. A call is admitted only when both buckets cover its cost, and
//! both are debited in the same critical section.
//!
//! Waiters are admitted strictly first-come first-served: the admission gate
//! is a `tokio::sync::Mutex`, which hands the lock to waiters in FIFO order.
//! The waiter at the head of the queue sleeps until the buckets will have
//! refilled enough, so nobody spins.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Errors from budget admission
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// The cost is larger than a bucket's burst size and can never be admitted
    #[error("Call cost of {requested} {unit} exceeds bucket capacity of {capacity}")]
    ExceedsCapacity {
        /// Which bucket
        unit: &'static str,
        /// Requested amount
        requested: u64,
        /// Bucket capacity
        capacity: u64,
    },
}

/// Rate budget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Sustained requests per minute
    pub requests_per_minute: u64,

    /// Sustained model tokens per minute
    pub tokens_per_minute: u64,

    /// Request bucket capacity
    pub request_burst: u64,

    /// Token bucket capacity
    pub token_burst: u64,
}

impl BudgetConfig {
    /// Budget that starts full and never refills
    ///
    /// Used in tests to make admission depend only on explicit replenishment.
    pub fn fixed(requests: u64, tokens: u64) -> Self {
        Self {
            requests_per_minute: 0,
            tokens_per_minute: 0,
            request_burst: requests,
            token_burst: tokens,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.request_burst == 0 {
            return Err("request_burst must be greater than 0".to_string());
        }
        if self.token_burst == 0 {
            return Err("token_burst must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 3_000,
            tokens_per_minute: 1_000_000,
            request_burst: 3_000,
            token_burst: 1_000_000,
        }
    }
}

/// Cost of one model call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallCost {
    /// Requests (always 1 for a real call)
    pub requests: u64,
    /// Estimated tokens, prompt plus response reserve
    pub tokens: u64,
}

impl CallCost {
    /// One request carrying the given token estimate
    pub fn request(tokens: u64) -> Self {
        Self { requests: 1, tokens }
    }
}

/// Point-in-time view of the budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetSnapshot {
    /// Requests currently available
    pub available_requests: f64,
    /// Tokens currently available
    pub available_tokens: f64,
    /// Callers waiting for admission (including the one at the head)
    pub queued: usize,
    /// Calls admitted since creation
    pub admitted: u64,
}

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    available: f64,
}

impl TokenBucket {
    fn new(capacity: u64, per_minute: u64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: per_minute as f64 / 60.0,
            available: capacity as f64,
        }
    }

    fn refill(&mut self, elapsed: Duration) {
        self.available =
            (self.available + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
    }

    /// Time until `cost` is covered; `None` if the bucket never refills
    fn wait_for(&self, cost: f64) -> Option<Duration> {
        let deficit = cost - self.available;
        if deficit <= 0.0 {
            return Some(Duration::ZERO);
        }
        if self.refill_per_sec <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
    }
}

#[derive(Debug)]
struct Buckets {
    requests: TokenBucket,
    tokens: TokenBucket,
    last_refill: Instant,
    admitted: u64,
}

impl Buckets {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.requests.refill(elapsed);
        self.tokens.refill(elapsed);
        self.last_refill = now;
    }

    fn try_debit(&mut self, cost: CallCost) -> bool {
        let (r, t) = (cost.requests as f64, cost.tokens as f64);
        if self.requests.available >= r && self.tokens.available >= t {
            self.requests.available -= r;
            self.tokens.available -= t;
            self.admitted += 1;
            true
        } else {
            false
        }
    }
}

/// Shared request/token budget
///
/// One instance is shared (via `Arc`) by every gateway in the process.
#[derive(Debug)]
pub struct RateBudget {
    config: BudgetConfig,
    buckets: Mutex<Buckets>,
    admission: tokio::sync::Mutex<()>,
    replenished: Notify,
    queued: AtomicUsize,
}

struct QueuedGuard<'a>(&'a AtomicUsize);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RateBudget {
    /// Create a full budget
    pub fn new(config: BudgetConfig) -> Self {
        let buckets = Buckets {
            requests: TokenBucket::new(config.request_burst, config.requests_per_minute),
            tokens: TokenBucket::new(config.token_burst, config.tokens_per_minute),
            last_refill: Instant::now(),
            admitted: 0,
        };
        Self {
            config,
            buckets: Mutex::new(buckets),
            admission: tokio::sync::Mutex::new(()),
            replenished: Notify::new(),
            queued: AtomicUsize::new(0),
        }
    }

    /// The configuration this budget was built from
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    fn lock_buckets(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_capacity(&self, cost: CallCost) -> Result<(), BudgetError> {
        if cost.requests > self.config.request_burst {
            return Err(BudgetError::ExceedsCapacity {
                unit: "requests",
                requested: cost.requests,
                capacity: self.config.request_burst,
            });
        }
        if cost.tokens > self.config.token_burst {
            return Err(BudgetError::ExceedsCapacity {
                unit: "tokens",
                requested: cost.tokens,
                capacity: self.config.token_burst,
            });
        }
        Ok(())
    }

    /// Wait until the cost fits, then debit it
    ///
    /// Callers are admitted in arrival order. Returns immediately with an
    /// error if the cost can never fit.
    pub async fn acquire(&self, cost: CallCost) -> Result<(), BudgetError> {
        self.check_capacity(cost)?;

        self.queued.fetch_add(1, Ordering::SeqCst);
        let _queued = QueuedGuard(&self.queued);
        let _turn = self.admission.lock().await;

        loop {
            let wait = {
                let mut buckets = self.lock_buckets();
                buckets.refill(Instant::now());
                if buckets.try_debit(cost) {
                    return Ok(());
                }
                match (
                    buckets.requests.wait_for(cost.requests as f64),
                    buckets.tokens.wait_for(cost.tokens as f64),
                ) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                }
            };

            match wait {
                Some(delay) => {
                    let delay = delay.max(Duration::from_millis(1));
                    debug!("Rate budget: waiting {:?} for {:?}", delay, cost);
                    tokio::time::sleep(delay).await;
                }
                None => {
                    debug!("Rate budget: waiting for replenishment for {:?}", cost);
                    self.replenished.notified().await;
                }
            }
        }
    }

    /// Add capacity outside the refill schedule, capped at burst size
    pub fn replenish(&self, requests: u64, tokens: u64) {
        {
            let mut buckets = self.lock_buckets();
            buckets.refill(Instant::now());
            buckets.requests.available =
                (buckets.requests.available + requests as f64).min(buckets.requests.capacity);
            buckets.tokens.available =
                (buckets.tokens.available + tokens as f64).min(buckets.tokens.capacity);
        }
        // Stores a permit if the head waiter has not parked yet
        self.replenished.notify_one();
    }

    /// Current availability and queue length
    pub fn snapshot(&self) -> BudgetSnapshot {
        let mut buckets = self.lock_buckets();
        buckets.refill(Instant::now());
        BudgetSnapshot {
            available_requests: buckets.requests.available,
            available_tokens: buckets.tokens.available,
            queued: self.queued.load(Ordering::SeqCst),
            admitted: buckets.admitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_debits_both_buckets() {
        let budget = RateBudget::new(BudgetConfig::fixed(10, 1_000));
        budget.acquire(CallCost::request(300)).await.unwrap();

        let snap = budget.snapshot();
        assert_eq!(snap.available_requests, 9.0);
        assert_eq!(snap.available_tokens, 700.0);
        assert_eq!(snap.admitted, 1);
        assert_eq!(snap.queued, 0);
    }

    #[tokio::test]
    async fn test_oversized_cost_rejected() {
        let budget = RateBudget::new(BudgetConfig::fixed(10, 1_000));
        let err = budget.acquire(CallCost::request(1_001)).await.unwrap_err();
        assert!(matches!(err, BudgetError::ExceedsCapacity { unit: "tokens", .. }));
        let err = budget
            .acquire(CallCost { requests: 11, tokens: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, BudgetError::ExceedsCapacity { unit: "requests", .. }));
    }

    #[tokio::test]
    async fn test_admissible_prefix_proceeds_rest_queue() {
        let budget = Arc::new(RateBudget::new(BudgetConfig::fixed(3, 10_000)));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let budget = Arc::clone(&budget);
            handles.push(tokio::spawn(async move {
                budget.acquire(CallCost::request(100)).await
            }));
        }

        // Let the spawned tasks run up to their wait points
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        let snap = budget.snapshot();
        assert_eq!(snap.admitted, 3);
        assert_eq!(snap.queued, 2);
        assert_eq!(snap.available_requests, 0.0);

        budget.replenish(2, 0);
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let snap = budget.snapshot();
        assert_eq!(snap.admitted, 5);
        assert_eq!(snap.queued, 0);
    }

    #[tokio::test]
    async fn test_waiters_admitted_in_arrival_order() {
        let budget = Arc::new(RateBudget::new(BudgetConfig::fixed(1, 10_000)));
        budget.acquire(CallCost::request(1)).await.unwrap();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..4 {
            let budget = Arc::clone(&budget);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                budget.acquire(CallCost::request(1)).await.unwrap();
                order.lock().unwrap().push(i);
            }));
            // Make arrival order deterministic
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
        }

        for _ in 0..4 {
            budget.replenish(1, 0);
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time_never_overshoots() {
        // 60 requests per minute = 1 per second, burst of 2
        let config = BudgetConfig {
            requests_per_minute: 60,
            tokens_per_minute: 60_000,
            request_burst: 2,
            token_burst: 2_000,
        };
        let budget = RateBudget::new(config);
        let start = Instant::now();

        for _ in 0..6 {
            budget.acquire(CallCost::request(10)).await.unwrap();
        }

        // 2 from the burst, 4 more need at least 4 seconds of refill
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
        assert!(budget.snapshot().available_requests < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_burst() {
        let config = BudgetConfig {
            requests_per_minute: 600,
            tokens_per_minute: 600_000,
            request_burst: 5,
            token_burst: 5_000,
        };
        let budget = RateBudget::new(config);
        budget.acquire(CallCost::request(1_000)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;

        let snap = budget.snapshot();
        assert_eq!(snap.available_requests, 5.0);
        assert_eq!(snap.available_tokens, 5_000.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(BudgetConfig::default().validate().is_ok());
        assert!(BudgetConfig::fixed(0, 10).validate().is_err());
        assert!(BudgetConfig::fixed(10, 0).validate().is_err());
    }
}
