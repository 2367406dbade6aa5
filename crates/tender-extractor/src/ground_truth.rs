//! Deterministic fact extraction
//!
//! Pattern rules run over the unified text before any model call. Each rule
//! targets one verifiable field; generic rules run for every tender and
//! portal-specific rules only for their portal. Matches that fail a sanity
//! check are dropped as noise. When several rules or matches hit the same
//! field, [`FactsBuilder`] keeps the most specific rule, then the earliest
//! position.

use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;
use tender_domain::{
    Fact, FactsBuilder, GroundTruthFacts, Portal, RuleOrigin, SourceRef, UnifiedDocument,
};
use tracing::{debug, info, warn};

const DATE: &str = r"(?:\d{1,2}[-/\.]\d{1,2}[-/\.]\d{4}|\d{1,2}[-\s](?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*[-\s,]+\d{4})(?:\s+\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AP]M)?)?";
const MONEY: &str = r"(?:₹|Rs\.?|INR)?\s*(?P<v>\d[\d,]*(?:\.\d{1,2})?)\s*(?P<unit>Lakhs?|Crores?)?";
const CURRENCY_NOTE: &str = r"(?:\s*\(\s*(?:in\s+)?(?:Rs\.?|INR|₹)\s*\))?";
const NEXT_VALUE_LINE: &str = r"[^\n]*\n(?:[^\n\d]*\n)?\s*";

/// How a raw capture becomes a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Whitespace-collapsed capture
    Verbatim,
    /// Rupee amount with an optional unit
    Amount,
    /// Amount whose unit defaults to lakhs
    Lakhs,
    /// Number of days
    Days,
    /// Number of years
    Years,
    /// Percentage
    Percent,
}

struct FactRule {
    name: &'static str,
    field: &'static str,
    portal: Option<Portal>,
    regex: Regex,
    shape: Shape,
}

impl FactRule {
    fn new(
        name: &'static str,
        field: &'static str,
        portal: Option<Portal>,
        pattern: &str,
        shape: Shape,
    ) -> Self {
        Self {
            name,
            field,
            portal,
            regex: Regex::new(pattern).expect("valid regex"),
            shape,
        }
    }

    fn origin(&self) -> RuleOrigin {
        match self.portal {
            Some(_) => RuleOrigin::PortalSpecific,
            None => RuleOrigin::Generic,
        }
    }

    fn applies_to(&self, portal: Portal) -> bool {
        self.portal.is_none_or(|p| p == portal)
    }
}

static RULES: LazyLock<Vec<FactRule>> = LazyLock::new(|| {
    use Shape::*;
    let gem = Some(Portal::Gem);
    let cppp = Some(Portal::Cppp);
    vec![
        // Generic rules
        FactRule::new(
            "tender_id",
            "tender_meta.tender_id",
            None,
            r"(?i)\b(?:Tender\s+(?:No|ID|Reference)|Ref(?:\.?\s*No)?|NIT\s*(?:No|ID|Ref)?|Solicitation\s+No)\.?[\s:]+(?P<v>[A-Z0-9][A-Z0-9\-_/\.]{3,})",
            Verbatim,
        ),
        FactRule::new(
            "emd",
            "financial_requirements.emd",
            None,
            &format!(r"(?i)\b(?:EMD|Earnest\s+Money(?:\s+Deposit)?)(?:\s+Amount)?{CURRENCY_NOTE}\s*[:\-]?\s*{MONEY}"),
            Amount,
        ),
        FactRule::new(
            "tender_fee",
            "financial_requirements.tender_fee",
            None,
            &format!(r"(?i)\bTender\s+(?:Document\s+)?Fees?{CURRENCY_NOTE}\s*[:\-]?\s*{MONEY}"),
            Amount,
        ),
        FactRule::new(
            "performance_security",
            "financial_requirements.performance_security",
            None,
            r"(?i)\bPerformance\s+(?:Security|Bank\s+Guarantee|Guarantee)\s*[:\-]?\s*(?P<v>\d+(?:\.\d+)?\s*%|(?:₹|Rs\.?)\s*\d[\d,]*)",
            Verbatim,
        ),
        FactRule::new(
            "bid_end",
            "key_dates.bid_end",
            None,
            &format!(r"(?i)\bBid\s+(?:Submission\s+)?(?:End|Closing)\s+Date(?:\s*/\s*Time)?\s*[:\-]?\s*(?P<v>{DATE})"),
            Verbatim,
        ),
        FactRule::new(
            "last_date_of_submission",
            "key_dates.bid_end",
            None,
            &format!(r"(?i)\bLast\s+Date\s+(?:and\s+Time\s+)?(?:of|for)\s+(?:Bid\s+)?Submission\s*[:\-]?\s*(?P<v>{DATE})"),
            Verbatim,
        ),
        FactRule::new(
            "bid_start",
            "key_dates.bid_start",
            None,
            &format!(r"(?i)\bBid\s+(?:Submission\s+)?(?:Start|Opening|Open)\s+Date(?:\s*/\s*Time)?\s*[:\-]?\s*(?P<v>{DATE})"),
            Verbatim,
        ),
        FactRule::new(
            "technical_bid_opening",
            "key_dates.technical_bid_opening",
            None,
            &format!(r"(?i)\bTechnical\s+Bid\s+Opening(?:\s+Date)?(?:\s*/\s*Time)?\s*[:\-]?\s*(?P<v>{DATE})"),
            Verbatim,
        ),
        FactRule::new(
            "financial_bid_opening",
            "key_dates.financial_bid_opening",
            None,
            &format!(r"(?i)\bFinancial\s+Bid\s+Opening(?:\s+Date)?(?:\s*/\s*Time)?\s*[:\-]?\s*(?P<v>{DATE})"),
            Verbatim,
        ),
        FactRule::new(
            "bid_validity",
            "key_dates.bid_validity",
            None,
            r"(?i)\bBid\s+(?:Offer\s+)?Validity(?:\s*\(\s*From\s+End\s+Date\s*\))?(?:\s+Period)?\s*[:\-]?\s*(?P<v>\d+)",
            Days,
        ),
        FactRule::new(
            "turnover",
            "eligibility_snapshot.turnover_requirement",
            None,
            r"(?i)\b(?:Annual\s+)?Turnover\s*[:\-]?\s*(?:of\s+)?(?:₹|Rs\.?|INR)?\s*(?P<v>\d[\d,]*(?:\.\d{1,2})?)\s*(?P<unit>Lakhs?|Crores?)",
            Amount,
        ),
        FactRule::new(
            "experience_years",
            "eligibility_snapshot.experience_required",
            None,
            r"(?i)\b(?:Experience\s+of\s+|Minimum\s+)(?P<v>\d+)\s+(?:years?|yrs)\b",
            Years,
        ),
        FactRule::new(
            "local_content",
            "eligibility_snapshot.local_content_requirement",
            None,
            r"(?i)\b(?:Minimum\s+)?(?:Local\s+Content|Make\s+in\s+India)(?:\s+Requirement)?\s*[:\-]?\s*(?P<v>\d+(?:\.\d+)?)\s*%",
            Percent,
        ),
        // GeM bid documents
        FactRule::new(
            "gem_bid_number",
            "tender_meta.tender_id",
            gem,
            r"\bGEM/\d{4}/[A-Z]/\d+",
            Verbatim,
        ),
        FactRule::new(
            "gem_total_quantity",
            "tender_meta.total_quantity",
            gem,
            r"(?i)\bTotal\s+(?:Quantity|Qty\.?)\s*[:\-]?\s*(?P<v>\d[\d,]*(?:\.\d+)?)",
            Verbatim,
        ),
        FactRule::new(
            "gem_epbg",
            "financial_requirements.epbg_details",
            gem,
            r"(?i)\bePBG(?:\s+Percentage)?(?:\s*\(%\))?\s*[:\-]?\s*(?P<v>\d+(?:\.\d+)?)\s*%?",
            Percent,
        ),
        FactRule::new(
            "gem_bidder_turnover",
            "eligibility_snapshot.turnover_requirement",
            gem,
            &format!(r"(?i)(?:Minimum\s+Average\s+Annual\s+Turnover\s+of\s+the\s+bidder|बिडर का न्यूनतम औसत वार्षिक टर्नओवर){NEXT_VALUE_LINE}(?P<v>\d[\d,]*)\s*(?P<unit>Lakhs?|Crores?|लाख|करोड़)?"),
            Lakhs,
        ),
        FactRule::new(
            "gem_oem_turnover",
            "eligibility_snapshot.oem_turnover_requirement",
            gem,
            &format!(r"(?i)(?:OEM\s+Average\s+Turnover|मूल उपकरण निर्माता का औसत टर्नओवर){NEXT_VALUE_LINE}(?P<v>\d[\d,]*)\s*(?P<unit>Lakhs?|Crores?|लाख|करोड़)?"),
            Lakhs,
        ),
        FactRule::new(
            "gem_past_experience",
            "eligibility_snapshot.experience_required",
            gem,
            &format!(r"(?i)(?:Years?\s+of\s+Past\s+Experience\s+Required|समान सेवा के लिए अपेक्षित विगत अनुभव के वर्ष){NEXT_VALUE_LINE}(?P<v>\d+)"),
            Years,
        ),
        // CPPP notices
        FactRule::new(
            "cppp_tender_id",
            "tender_meta.tender_id",
            cppp,
            r"(?i)\bTender\s+(?:Reference\s+)?(?:No|Number|ID)\.?\s*[:\-]?\s*(?P<v>[A-Z0-9][A-Z0-9\-_/\.]{3,})",
            Verbatim,
        ),
        FactRule::new(
            "cppp_date_of_issue",
            "key_dates.date_and_time_of_issue",
            cppp,
            &format!(r"(?i)\b(?:Date\s*(?:&|and)\s*Time\s+of\s+Issue|Published\s+Date)\s*[:\-]?\s*(?P<v>{DATE})"),
            Verbatim,
        ),
        FactRule::new(
            "cppp_due_date",
            "key_dates.due_date_and_time_of_submission",
            cppp,
            &format!(r"(?i)\bDue\s+Date\s*(?:&|and)\s*Time\s+of\s+Submission\s*[:\-]?\s*(?P<v>{DATE})"),
            Verbatim,
        ),
    ]
});

static DATE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}[-/\.]\d{1,2}[-/\.]\d{2,4}$").expect("valid regex"));

static GEM_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Government\s+e-?Marketplace|GeM\s+Portal|gem\.gov\.in|\bGEM/\d{4}/")
        .expect("valid regex")
});

static CPPP_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Central\s+Public\s+Procurement\s+Portal|\bCPPP\b|eprocure\.gov\.in")
        .expect("valid regex")
});

/// Guess the portal from marker phrases in the text
///
/// GeM markers are checked first; anything unrecognised is generic.
pub fn detect_portal(text: &str) -> Portal {
    if GEM_MARKERS.is_match(text) {
        Portal::Gem
    } else if CPPP_MARKERS.is_match(text) {
        Portal::Cppp
    } else {
        Portal::Generic
    }
}

/// A rule match dropped by the sanity checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoiseRecord {
    /// Rule that matched
    pub rule: &'static str,
    /// Field it targeted
    pub field: &'static str,
    /// Rejected value
    pub value: String,
}

/// Facts plus the matches rejected as noise
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruthReport {
    /// Winning fact per field
    pub facts: GroundTruthFacts,
    /// Rejected matches
    pub noise: Vec<NoiseRecord>,
}

/// Runs the pattern rules over a unified document
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundTruthExtractor;

impl GroundTruthExtractor {
    /// Create an extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract facts for the given portal
    pub fn extract(&self, document: &UnifiedDocument, portal: Portal) -> GroundTruthReport {
        let text = document.text();
        let mut builder = FactsBuilder::new();
        let mut noise = Vec::new();

        for rule in RULES.iter().filter(|r| r.applies_to(portal)) {
            for caps in rule.regex.captures_iter(text) {
                let Some(matched) = caps.name("v").or_else(|| caps.get(0)) else {
                    continue;
                };
                let value = shape_value(rule.shape, matched.as_str(), unit(&caps));
                if is_noise(rule.field, &value) {
                    warn!("Rule {} produced noise for {}: {:?}", rule.name, rule.field, value);
                    noise.push(NoiseRecord {
                        rule: rule.name,
                        field: rule.field,
                        value,
                    });
                    continue;
                }

                let label = document.label_at(matched.start()).unwrap_or_default().to_string();
                let fact = Fact {
                    value,
                    source: SourceRef {
                        label,
                        range: matched.range(),
                    },
                    origin: rule.origin(),
                    rule: rule.name,
                };
                if builder.offer(rule.field, fact) {
                    debug!("Rule {} set {}", rule.name, rule.field);
                }
                break;
            }
        }

        let facts = builder.build();
        info!(
            "Ground truth: {} facts, {} noisy matches ({} rules for {})",
            facts.len(),
            noise.len(),
            RULES.iter().filter(|r| r.applies_to(portal)).count(),
            portal
        );
        GroundTruthReport { facts, noise }
    }
}

fn unit<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.name("unit").map(|m| m.as_str())
}

fn shape_value(shape: Shape, raw: &str, unit: Option<&str>) -> String {
    let raw = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match shape {
        Shape::Verbatim => raw,
        Shape::Amount => match unit.map(normalize_unit) {
            Some(unit) => format!("₹{} {}", raw, unit),
            None => format!("₹{}", raw),
        },
        Shape::Lakhs => format!("₹{} {}", raw, unit.map(normalize_unit).unwrap_or("Lakh")),
        Shape::Days => format!("{} days", raw),
        Shape::Years => format!("{} Year(s)", raw),
        Shape::Percent => format!("{}%", raw.trim_end_matches('%').trim()),
    }
}

fn normalize_unit(unit: &str) -> &'static str {
    let lower = unit.to_lowercase();
    if lower.starts_with("crore") || unit == "करोड़" {
        "Crore"
    } else {
        "Lakh"
    }
}

fn is_noise(field: &str, value: &str) -> bool {
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    field == "tender_meta.tender_id" && DATE_ONLY.is_match(value)
}
