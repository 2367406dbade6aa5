//! Request and response types for processing

use crate::metadata::RunMetadata;
use serde::Serialize;
use tender_domain::{Portal, TenderSummary, UnifiedDocument};

/// Request to process one tender's document set
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    /// Unified text of every uploaded or linked file
    pub document: UnifiedDocument,

    /// Portal tag from upstream detection; detected from the text when absent
    pub portal: Option<Portal>,
}

impl ProcessingRequest {
    /// Request with portal detection left to the engine
    pub fn new(document: UnifiedDocument) -> Self {
        Self {
            document,
            portal: None,
        }
    }

    /// Request for a known portal
    pub fn with_portal(mut self, portal: Portal) -> Self {
        self.portal = Some(portal);
        self
    }
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    /// Validated record; every field is a value or the sentinel
    pub summary: TenderSummary,

    /// What happened during the run
    pub metadata: RunMetadata,
}
