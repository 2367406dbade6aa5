//! Tender Gatekeeper
//!
//! Decides what is allowed into the final tender record.
//!
//! The Gatekeeper provides:
//! - Draft normalisation (lenient type coercion, sentinel canonicalisation)
//! - Trust-ordered merging: ground truth > gap filling > model output
//! - Schema validation of the final record
//! - Portal completeness reporting
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use tender_gatekeeper::{Gatekeeper, ValidationConfig};
//!
//! let gatekeeper = Gatekeeper::new(ValidationConfig::default());
//! let draft = gatekeeper
//!     .normalize_draft(&json!({"key_dates": {"bid_end": "N/A"}}))
//!     .unwrap();
//!
//! assert!(!draft.summary.get("key_dates.bid_end").unwrap().is_mentioned());
//! ```

#![warn(missing_docs)]

mod completeness;
mod config;
mod error;
mod merge;
mod validator;

pub use completeness::{check_completeness, CompletenessReport};
pub use config::ValidationConfig;
pub use error::GatekeeperError;
pub use merge::{MergeOutcome, Merger, Override, Provenance};
pub use validator::{
    Gatekeeper, NormalizedDraft, RejectionReason, ValidationResult, ValidationStatus,
};
