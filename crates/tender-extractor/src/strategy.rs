//! Strategy selection

use serde::Serialize;
use tender_domain::ProcessingStrategy;
use tracing::info;

/// Strategy chosen for a run, with the numbers behind it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyDecision {
    /// Chosen strategy
    pub strategy: ProcessingStrategy,
    /// Estimated tokens of the unified text
    pub estimated_tokens: u64,
    /// Threshold the estimate was compared against
    pub threshold: u64,
    /// Estimate fell within the near-threshold band
    pub near_threshold: bool,
}

/// Pick single-pass below the threshold, hierarchical at or above it
///
/// Estimates within `near_ratio` of the threshold are logged so that
/// borderline runs can be spotted.
pub fn select_strategy(estimated_tokens: u64, threshold: u64, near_ratio: f64) -> StrategyDecision {
    let strategy = if estimated_tokens < threshold {
        ProcessingStrategy::SinglePass
    } else {
        ProcessingStrategy::Hierarchical
    };

    let distance = estimated_tokens.abs_diff(threshold) as f64;
    let near_threshold = threshold > 0 && distance <= threshold as f64 * near_ratio;
    if near_threshold {
        info!(
            "Estimate of {} tokens is within {:.0}% of the {} token threshold; using {}",
            estimated_tokens,
            near_ratio * 100.0,
            threshold,
            strategy
        );
    }

    StrategyDecision {
        strategy,
        estimated_tokens,
        threshold,
        near_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_is_single_pass() {
        let decision = select_strategy(8_000, 40_000, 0.05);
        assert_eq!(decision.strategy, ProcessingStrategy::SinglePass);
        assert!(!decision.near_threshold);
    }

    #[test]
    fn test_threshold_itself_is_hierarchical() {
        let decision = select_strategy(40_000, 40_000, 0.05);
        assert_eq!(decision.strategy, ProcessingStrategy::Hierarchical);
        assert!(decision.near_threshold);
    }

    #[test]
    fn test_one_below_threshold_is_single_pass() {
        let decision = select_strategy(39_999, 40_000, 0.05);
        assert_eq!(decision.strategy, ProcessingStrategy::SinglePass);
        assert!(decision.near_threshold);
    }

    #[test]
    fn test_far_above_threshold() {
        let decision = select_strategy(120_000, 40_000, 0.05);
        assert_eq!(decision.strategy, ProcessingStrategy::Hierarchical);
        assert!(!decision.near_threshold);
    }
}
