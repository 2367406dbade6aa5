//! Target schema of a tender summary
//!
//! The schema is a static table of field specifications. Paths are
//! `section.field` for sectioned fields and a bare name for root fields.
//! Table order is the canonical field order used for rendering prompts and
//! for iterating a [`TenderSummary`](crate::TenderSummary).

/// Canonical marker for a field the documents do not mention
pub const SENTINEL: &str = "Not mentioned";

/// Shape a field's value must take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text
    Text,
    /// Ordered list of text items
    List,
    /// One of a fixed set of values
    Choice(&'static [&'static str]),
}

/// Specification of one schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Dotted path (`section.field`, or `field` at the root)
    pub path: &'static str,

    /// Value shape
    pub kind: FieldKind,

    /// Whether deterministic rules may supply this field
    /// (identifiers, dates, monetary amounts, quantities)
    pub verifiable: bool,

    /// Alternate phrasings tender documents use for this field
    pub aliases: &'static [&'static str],
}

impl FieldSpec {
    /// Section name, or `None` for root fields
    pub fn section(&self) -> Option<&'static str> {
        self.path.split_once('.').map(|(section, _)| section)
    }

    /// Field name without its section
    pub fn name(&self) -> &'static str {
        match self.path.split_once('.') {
            Some((_, name)) => name,
            None => self.path,
        }
    }

    /// Human readable label (`bid_end` → `bid end`)
    pub fn label(&self) -> String {
        self.name().replace('_', " ")
    }

    /// The label followed by every alias, without duplicates
    pub fn search_terms(&self) -> Vec<String> {
        let mut terms = vec![self.label()];
        for alias in self.aliases {
            if !terms.iter().any(|t| t.eq_ignore_ascii_case(alias)) {
                terms.push((*alias).to_string());
            }
        }
        terms
    }
}

const PORTALS: &[&str] = &["GeM", "CPPP", "Generic"];
const YES_NO: &[&str] = &["Yes", "No"];

const fn text(path: &'static str) -> FieldSpec {
    FieldSpec {
        path,
        kind: FieldKind::Text,
        verifiable: false,
        aliases: &[],
    }
}

const fn text_aka(path: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        path,
        kind: FieldKind::Text,
        verifiable: false,
        aliases,
    }
}

const fn fact(path: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        path,
        kind: FieldKind::Text,
        verifiable: true,
        aliases,
    }
}

const fn list(path: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        path,
        kind: FieldKind::List,
        verifiable: false,
        aliases,
    }
}

const fn choice(path: &'static str, allowed: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        path,
        kind: FieldKind::Choice(allowed),
        verifiable: false,
        aliases: &[],
    }
}

/// Every field of a tender summary, in canonical order
pub static SCHEMA: &[FieldSpec] = &[
    // tender_meta
    fact(
        "tender_meta.tender_id",
        &["Tender No", "Tender ID", "Bid Number", "NIT No", "Reference No"],
    ),
    text_aka(
        "tender_meta.tender_title",
        &["Name of Work", "Title of Work", "Tender Title", "Subject"],
    ),
    choice("tender_meta.portal", PORTALS),
    text_aka("tender_meta.department", &["Department Name", "Ministry"]),
    text_aka("tender_meta.issuing_authority", &["Organisation Name", "Buyer", "Office"]),
    text("tender_meta.country"),
    text("tender_meta.state"),
    text("tender_meta.funded_project"),
    text("tender_meta.funding_agency"),
    text_aka("tender_meta.boq_title", &["BOQ", "Bill of Quantities"]),
    text_aka("tender_meta.type_of_bid", &["Single Packet Bid", "Two Packet Bid", "Type of Bid"]),
    text_aka("tender_meta.item_category", &["Item Category", "Product Category"]),
    fact("tender_meta.total_quantity", &["Total Quantity", "Total Qty", "Quantity"]),
    // scope_of_work
    text_aka(
        "scope_of_work.description",
        &["Scope of Work", "Work Description", "Brief Description"],
    ),
    text_aka("scope_of_work.deliverables", &["Deliverables"]),
    text("scope_of_work.quantity"),
    text_aka(
        "scope_of_work.technical_specifications",
        &["Technical Specification", "Specifications"],
    ),
    text_aka("scope_of_work.location", &["Place of Work", "Consignee", "Delivery Location"]),
    text_aka("scope_of_work.duration", &["Completion Period", "Period of Work"]),
    // key_dates
    text_aka("key_dates.publication_date", &["Published Date", "Date of Publication"]),
    fact(
        "key_dates.bid_start",
        &["Bid Start Date", "Bid Opening Date", "Bid Submission Start Date"],
    ),
    fact(
        "key_dates.bid_end",
        &["Bid End Date", "Bid Closing Date", "Last Date of Submission", "Bid Submission End Date"],
    ),
    text_aka("key_dates.pre_bid_meeting_date", &["Pre-Bid Meeting", "Pre Bid Conference"]),
    text_aka("key_dates.pre_bid_meeting_location", &["Pre-Bid Meeting Venue"]),
    fact("key_dates.technical_bid_opening", &["Technical Bid Opening"]),
    fact("key_dates.financial_bid_opening", &["Financial Bid Opening", "Price Bid Opening"]),
    text("key_dates.contract_start"),
    fact("key_dates.bid_validity", &["Bid Validity", "Bid Offer Validity"]),
    text("key_dates.project_duration"),
    fact("key_dates.date_and_time_of_issue", &["Date & Time of Issue", "Date of Issue"]),
    fact(
        "key_dates.due_date_and_time_of_submission",
        &["Due Date & Time of Submission", "Due Date of Submission"],
    ),
    // eligibility_snapshot
    text_aka("eligibility_snapshot.who_can_bid", &["Eligible Bidders", "Eligibility"]),
    fact(
        "eligibility_snapshot.experience_required",
        &["Past Experience", "Years of Past Experience", "Similar Work Experience"],
    ),
    fact(
        "eligibility_snapshot.turnover_requirement",
        &["Turnover", "Annual Turnover", "Average Annual Turnover"],
    ),
    fact(
        "eligibility_snapshot.oem_turnover_requirement",
        &["OEM Average Turnover", "OEM Turnover"],
    ),
    text("eligibility_snapshot.minimum_years_in_business"),
    fact("eligibility_snapshot.local_content_requirement", &["Local Content", "Make in India"]),
    text_aka(
        "eligibility_snapshot.msme_startup_exemption",
        &["MSE Relaxation", "Startup Relaxation", "MSME Exemption"],
    ),
    choice("eligibility_snapshot.consortium_or_jv_allowed", YES_NO),
    choice("eligibility_snapshot.international_bidders_allowed", YES_NO),
    text("eligibility_snapshot.specific_licenses_required"),
    text("eligibility_snapshot.past_performance_requirement"),
    text_aka(
        "eligibility_snapshot.bidder_technical_infrastructure",
        &["Computer System", "Broadband", "Digital Signature Certificate", "DSC"],
    ),
    // financial_requirements
    fact(
        "financial_requirements.emd",
        &["EMD", "Earnest Money Deposit", "Earnest Money", "Security Deposit", "Bid Security"],
    ),
    text_aka("financial_requirements.emd_exemption", &["EMD Exemption"]),
    fact(
        "financial_requirements.tender_fee",
        &["Tender Fee", "Tender Document Fee", "Cost of Tender"],
    ),
    fact(
        "financial_requirements.performance_security",
        &["Performance Security", "Performance Bank Guarantee", "PBG"],
    ),
    fact("financial_requirements.epbg_details", &["ePBG", "e-PBG", "ePBG Percentage"]),
    text("financial_requirements.retention_money"),
    text_aka("financial_requirements.payment_terms", &["Terms of Payment", "Payment Schedule"]),
    text("financial_requirements.advance_payment"),
    text("financial_requirements.mobilization_advance"),
    // legal_and_risk_clauses
    text_aka("legal_and_risk_clauses.blacklisting_clause", &["Blacklisting", "Debarment"]),
    text_aka("legal_and_risk_clauses.arbitration_clause", &["Arbitration"]),
    text("legal_and_risk_clauses.mediation_clause"),
    text_aka("legal_and_risk_clauses.liquidated_damages", &["Liquidated Damages", "LD", "Penalty"]),
    text_aka("legal_and_risk_clauses.force_majeure", &["Force Majeure"]),
    text_aka("legal_and_risk_clauses.termination_clause", &["Termination"]),
    text_aka("legal_and_risk_clauses.warranty_period", &["Warranty", "Guarantee Period"]),
    text("legal_and_risk_clauses.special_restrictions"),
    text_aka("legal_and_risk_clauses.rejection_of_bid", &["Right to Reject", "Rejection of Bid"]),
    text_aka("legal_and_risk_clauses.splitting_of_work", &["Splitting of Work", "Split the Work"]),
    // vendor_decision_hint
    text("vendor_decision_hint.eligible_if"),
    text("vendor_decision_hint.not_eligible_if"),
    text("vendor_decision_hint.key_risks"),
    text("vendor_decision_hint.competitive_advantage_if"),
    // additional_important_information
    text_aka("additional_important_information.evaluation_criteria", &["Evaluation Criteria"]),
    text_aka(
        "additional_important_information.evaluation_method",
        &["Evaluation Method", "Evaluation Basis", "Item wise", "Total value wise"],
    ),
    text_aka(
        "additional_important_information.bid_to_ra_enabled",
        &["Bid to RA", "Reverse Auction"],
    ),
    text_aka(
        "additional_important_information.technical_clarification_time",
        &["Technical Clarification", "Clarification Response Time"],
    ),
    text("additional_important_information.selection_method"),
    text_aka("additional_important_information.price_preference", &["Purchase Preference"]),
    text_aka(
        "additional_important_information.special_conditions",
        &["Buyer Added ATC", "Additional Terms and Conditions", "ATC"],
    ),
    text_aka(
        "additional_important_information.contact_information",
        &["Contact", "Email", "Phone"],
    ),
    text("additional_important_information.clarification_process"),
    text("additional_important_information.other_critical_info"),
    // root
    list(
        "documents_required",
        &["Document required from seller", "Documents Required", "विक्रेता से मांगे गए दस्तावेज़"],
    ),
    list(
        "online_submission_documents",
        &["Envelope 1", "Online Submission", "Technical Bid Documents"],
    ),
    list(
        "offline_submission_documents",
        &["Offline Submission", "Hardcopy", "Physical Submission"],
    ),
    text_aka(
        "pre_qualification_requirement",
        &["Pre-Qualification", "Pre Qualification Criteria", "PQ Criteria"],
    ),
];

/// Look up a field specification by dotted path
pub fn field_spec(path: &str) -> Option<&'static FieldSpec> {
    SCHEMA.iter().find(|spec| spec.path == path)
}

/// Section names in canonical order, root fields excluded
pub fn sections() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for spec in SCHEMA {
        if let Some(section) = spec.section() {
            if !out.contains(&section) {
                out.push(section);
            }
        }
    }
    out
}

/// True if the text is a recognised "absent" marker
///
/// Matches the canonical sentinel plus the variants models and documents
/// commonly produce (`N/A`, `none`, `not specified`, `TBD`, blank...).
pub fn is_absent_marker(text: &str) -> bool {
    let t = text.trim().trim_end_matches('.').trim().to_ascii_lowercase();
    matches!(
        t.as_str(),
        "" | "not mentioned"
            | "n/a"
            | "na"
            | "none"
            | "nil"
            | "null"
            | "not specified"
            | "not found"
            | "not available"
            | "not applicable"
            | "not provided"
            | "tbd"
            | "-"
            | "--"
            | "unknown"
    )
}
