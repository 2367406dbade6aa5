//! Configuration for the processing engine

use serde::{Deserialize, Serialize};
use tender_gatekeeper::ValidationConfig;
use tender_llm::{BudgetConfig, RetryPolicy};

/// Configuration for the processing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Estimated tokens at or above which a run goes hierarchical
    pub single_pass_token_threshold: u64,

    /// Maximum tokens of document material in a single-pass context
    pub context_token_budget: u64,

    /// Maximum tokens per chunk on the hierarchical path
    pub max_chunk_tokens: u64,

    /// Maximum micro-summary calls in flight at once
    pub max_in_flight_chunks: usize,

    /// Recovery calls allowed per missing field
    pub max_gap_attempts_per_field: u32,

    /// Maximum tokens of passages sent with one recovery query
    pub gap_context_tokens: u64,

    /// Tokens reserved for short responses (chunk summaries, recovery answers)
    pub response_token_reserve: u64,

    /// Tokens reserved for full-record responses (single pass, merge)
    pub record_response_token_reserve: u64,

    /// Relative distance to the threshold that is logged as a near tie
    pub near_threshold_ratio: f64,

    /// Version string recorded in run metadata
    pub pipeline_version: String,

    /// Shared rate budget
    pub budget: BudgetConfig,

    /// Gateway retry policy
    pub retry: RetryPolicy,

    /// Draft normalisation rules
    pub validation: ValidationConfig,
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.single_pass_token_threshold == 0 {
            return Err("single_pass_token_threshold must be greater than 0".to_string());
        }
        if self.context_token_budget == 0 {
            return Err("context_token_budget must be greater than 0".to_string());
        }
        if self.max_chunk_tokens == 0 {
            return Err("max_chunk_tokens must be greater than 0".to_string());
        }
        if self.max_in_flight_chunks == 0 {
            return Err("max_in_flight_chunks must be greater than 0".to_string());
        }
        if self.gap_context_tokens == 0 {
            return Err("gap_context_tokens must be greater than 0".to_string());
        }
        if !(0.0..1.0).contains(&self.near_threshold_ratio) {
            return Err("near_threshold_ratio must be in [0, 1)".to_string());
        }
        if self.pipeline_version.trim().is_empty() {
            return Err("pipeline_version must not be empty".to_string());
        }
        self.budget.validate()?;
        self.retry.validate()?;

        let largest_call = (self.context_token_budget + self.record_response_token_reserve)
            .max(self.max_chunk_tokens + self.response_token_reserve)
            .max(self.gap_context_tokens + self.response_token_reserve);
        if largest_call > self.budget.token_burst {
            return Err(format!(
                "largest call (~{} tokens) exceeds budget.token_burst ({})",
                largest_call, self.budget.token_burst
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            single_pass_token_threshold: 40_000,
            context_token_budget: 15_000,
            max_chunk_tokens: 2_000,
            max_in_flight_chunks: 4,
            max_gap_attempts_per_field: 1,
            gap_context_tokens: 6_000,
            response_token_reserve: 1_000,
            record_response_token_reserve: 2_000,
            near_threshold_ratio: 0.05,
            pipeline_version: concat!("tender-engine/", env!("CARGO_PKG_VERSION")).to_string(),
            budget: BudgetConfig::default(),
            retry: RetryPolicy::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Aggressive preset: hierarchical sooner, more parallelism, fewer retries
    pub fn aggressive() -> Self {
        Self {
            single_pass_token_threshold: 20_000,
            context_token_budget: 8_000,
            max_chunk_tokens: 1_500,
            max_in_flight_chunks: 8,
            max_gap_attempts_per_field: 1,
            gap_context_tokens: 3_000,
            retry: RetryPolicy {
                max_attempts: 3,
                ..RetryPolicy::default()
            },
            ..Self::default()
        }
    }

    /// Lenient preset: larger contexts, more recovery attempts, more retries
    pub fn lenient() -> Self {
        Self {
            single_pass_token_threshold: 60_000,
            context_token_budget: 24_000,
            max_chunk_tokens: 4_000,
            max_in_flight_chunks: 2,
            max_gap_attempts_per_field: 2,
            gap_context_tokens: 10_000,
            retry: RetryPolicy {
                max_attempts: 6,
                ..RetryPolicy::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_aggressive_config_is_valid() {
        assert!(EngineConfig::aggressive().validate().is_ok());
    }

    #[test]
    fn test_lenient_config_is_valid() {
        assert!(EngineConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = EngineConfig::default();
        config.single_pass_token_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_in_flight_limit() {
        let mut config = EngineConfig::default();
        config.max_in_flight_chunks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_context_must_fit_budget() {
        let mut config = EngineConfig::default();
        config.budget.token_burst = 10_000;
        let err = config.validate().unwrap_err();
        assert!(err.contains("token_burst"));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::lenient();
        let toml_str = config.to_toml().unwrap();
        let parsed = EngineConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = EngineConfig::from_toml(
            r#"
            single_pass_token_threshold = 1000

            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(parsed.single_pass_token_threshold, 1000);
        assert_eq!(parsed.retry.max_attempts, 2);
        assert_eq!(parsed.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
        assert_eq!(parsed.max_chunk_tokens, 2_000);
    }
}
