//! Gatekeeper error types

use thiserror::Error;

/// Errors that can occur during gatekeeper operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatekeeperError {
    /// A field value is structurally malformed (wrong type or unknown choice)
    #[error("Schema violation at {path}: {reason}")]
    SchemaViolation {
        /// Offending field path (`$` for the whole document)
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatekeeperError {
    pub(crate) fn violation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        GatekeeperError::SchemaViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<tender_domain::SummaryError> for GatekeeperError {
    fn from(e: tender_domain::SummaryError) -> Self {
        use tender_domain::SummaryError;
        match &e {
            SummaryError::UnknownField(path)
            | SummaryError::KindMismatch { path, .. }
            | SummaryError::InvalidChoice { path, .. } => {
                GatekeeperError::violation(path.clone(), e.to_string())
            }
        }
    }
}
