//! Procurement portals and their required-field checklists

use serde::{Deserialize, Serialize};
use std::fmt;

/// Procurement portal a tender was published on
///
/// The portal selects which portal-specific extraction rules run and which
/// fields are mandatory for the record to be considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Portal {
    /// Government e-Marketplace
    #[serde(rename = "GeM")]
    Gem,
    /// Central Public Procurement Portal
    #[serde(rename = "CPPP")]
    Cppp,
    /// Any other portal
    #[default]
    Generic,
}

/// Fields every tender must carry, whatever the portal
const COMMON_REQUIRED: &[&str] = &[
    "tender_meta.tender_id",
    "tender_meta.tender_title",
    "key_dates.bid_start",
    "key_dates.bid_end",
    "key_dates.bid_validity",
    "financial_requirements.emd",
    "financial_requirements.tender_fee",
    "financial_requirements.performance_security",
    "financial_requirements.payment_terms",
    "eligibility_snapshot.turnover_requirement",
    "eligibility_snapshot.experience_required",
    "eligibility_snapshot.who_can_bid",
    "scope_of_work.description",
];

const GEM_REQUIRED: &[&str] = &[
    "tender_meta.portal",
    "tender_meta.item_category",
    "tender_meta.total_quantity",
    "tender_meta.boq_title",
    "eligibility_snapshot.oem_turnover_requirement",
    "financial_requirements.epbg_details",
    "additional_important_information.evaluation_method",
    "additional_important_information.bid_to_ra_enabled",
    "additional_important_information.technical_clarification_time",
    "additional_important_information.special_conditions",
    "pre_qualification_requirement",
];

const CPPP_REQUIRED: &[&str] = &[
    "tender_meta.portal",
    "key_dates.date_and_time_of_issue",
    "key_dates.due_date_and_time_of_submission",
    "online_submission_documents",
    "offline_submission_documents",
    "eligibility_snapshot.bidder_technical_infrastructure",
];

impl Portal {
    /// Display name, matching the `tender_meta.portal` choice values
    pub fn as_str(&self) -> &'static str {
        match self {
            Portal::Gem => "GeM",
            Portal::Cppp => "CPPP",
            Portal::Generic => "Generic",
        }
    }

    /// Parse a portal tag (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gem" | "government e-marketplace" => Some(Portal::Gem),
            "cppp" | "central public procurement portal" => Some(Portal::Cppp),
            "generic" | "other" => Some(Portal::Generic),
            _ => None,
        }
    }

    /// Required-field checklist, common fields first
    pub fn required_fields(&self) -> Vec<&'static str> {
        let extra = match self {
            Portal::Gem => GEM_REQUIRED,
            Portal::Cppp => CPPP_REQUIRED,
            Portal::Generic => &[],
        };
        COMMON_REQUIRED.iter().chain(extra.iter()).copied().collect()
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
