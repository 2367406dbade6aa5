//! Portal completeness reporting

use serde::Serialize;
use tender_domain::{FieldValue, Portal, TenderSummary};
use tracing::warn;

/// Missing required fields and advisory warnings for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletenessReport {
    /// Portal whose checklist was applied
    pub portal: Portal,
    /// Checklist fields still at the sentinel
    pub missing_fields: Vec<String>,
    /// Advisory warnings
    pub warnings: Vec<String>,
}

impl CompletenessReport {
    /// True if no checklist field is missing
    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }

    /// Missing fields plus warnings
    pub fn total_issues(&self) -> usize {
        self.missing_fields.len() + self.warnings.len()
    }
}

fn is_missing(summary: &TenderSummary, path: &str) -> bool {
    !summary.get(path).is_some_and(FieldValue::is_mentioned)
}

/// Check a record against its portal's checklist
///
/// Never fails: gaps are reported, not rejected.
pub fn check_completeness(summary: &TenderSummary, portal: Portal) -> CompletenessReport {
    let missing_fields: Vec<String> = portal
        .required_fields()
        .into_iter()
        .filter(|path| is_missing(summary, path))
        .map(str::to_string)
        .collect();

    let mut warnings = Vec::new();
    if is_missing(summary, "tender_meta.tender_id") {
        warnings.push("Tender ID is missing - this is a critical field".to_string());
    }
    if is_missing(summary, "key_dates.bid_end") {
        warnings.push(
            "Bid end date is missing - this is critical for bidding timeline".to_string(),
        );
    }

    match portal {
        Portal::Gem => {
            match summary.get("pre_qualification_requirement") {
                Some(FieldValue::Text(pq)) if !pq.contains('|') => warnings.push(
                    "pre_qualification_requirement format may be incomplete (missing | separators)"
                        .to_string(),
                ),
                Some(FieldValue::NotMentioned) | None => warnings.push(
                    "pre_qualification_requirement is empty - GeM tenders must carry it"
                        .to_string(),
                ),
                _ => {}
            }
            if is_missing(summary, "documents_required") {
                warnings.push(
                    "documents_required is empty - should contain seller documents".to_string(),
                );
            }
        }
        Portal::Cppp => {
            let online = is_missing(summary, "online_submission_documents");
            let offline = is_missing(summary, "offline_submission_documents");
            if online && offline {
                warnings.push(
                    "Neither online nor offline submission documents found - \
                     envelope structure may not be extracted"
                        .to_string(),
                );
            }
            if is_missing(summary, "key_dates.date_and_time_of_issue")
                || is_missing(summary, "key_dates.due_date_and_time_of_submission")
            {
                warnings.push(
                    "CPPP date fields should have specific labels - verify extraction".to_string(),
                );
            }
        }
        Portal::Generic => {}
    }

    if !missing_fields.is_empty() {
        warn!(
            "{} record missing {} required fields: {:?}",
            portal,
            missing_fields.len(),
            missing_fields
        );
    }

    CompletenessReport {
        portal,
        missing_fields,
        warnings,
    }
}
