//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Processing failed
    #[error("Processing failed: {0}")]
    Engine(#[from] tender_extractor::EngineError),

    /// Provider could not be set up
    #[error("Provider error: {0}")]
    Provider(#[from] tender_llm::LlmError),

    /// Input files could not be combined
    #[error("Invalid document set: {0}")]
    Document(#[from] tender_domain::DocumentError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
