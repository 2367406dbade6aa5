//! Draft normalisation and record validation

use crate::{GatekeeperError, ValidationConfig};
use serde_json::{Map, Value};
use tender_domain::schema::{is_absent_marker, sections};
use tender_domain::summary::check_kind;
use tender_domain::{
    field_spec, FieldKind, FieldSpec, FieldValue, Portal, TenderSummary, SCHEMA,
};
use tracing::{debug, warn};

/// Result of validating a final record
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Whether the record passed validation
    pub status: ValidationStatus,

    /// Rejection reasons (if any)
    pub reasons: Vec<RejectionReason>,
}

/// Validation status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Record accepted
    Accepted,

    /// Record rejected
    Rejected,
}

/// Reasons for rejection
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// Field value has the wrong shape or an unknown choice
    Malformed {
        /// Field path
        path: String,
        /// Description of the issue
        issue: String,
    },

    /// A text value is an absent marker that was not canonicalised
    NonCanonicalAbsence {
        /// Field path
        path: String,
        /// The raw marker
        value: String,
    },
}

/// A model draft mapped onto the schema
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDraft {
    /// Schema-complete record; fields the model omitted are at the sentinel
    pub summary: TenderSummary,

    /// Keys in the draft that are not part of the schema
    pub ignored_keys: Vec<String>,

    /// Schema fields whose draft value could not be coerced; left at the sentinel
    pub malformed_keys: Vec<String>,
}

/// The Gatekeeper normalises model drafts and validates final records
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    config: ValidationConfig,
}

impl Gatekeeper {
    /// Create a new Gatekeeper with the given configuration
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Create a Gatekeeper with default configuration
    pub fn default_config() -> Self {
        Self::new(ValidationConfig::default())
    }

    /// Map a model's JSON draft onto the schema
    ///
    /// Missing fields become the sentinel. A field whose value cannot be
    /// coerced to its kind is left at the sentinel and listed in
    /// `malformed_keys`, so later stages can still supply it. Only a draft
    /// that is not an object, or an unknown key under `reject_unknown_keys`,
    /// fails with [`GatekeeperError::SchemaViolation`].
    pub fn normalize_draft(&self, draft: &Value) -> Result<NormalizedDraft, GatekeeperError> {
        let root = draft
            .as_object()
            .ok_or_else(|| GatekeeperError::violation("$", "draft must be a JSON object"))?;

        let known_sections = sections();
        let mut normalized = NormalizedDraft {
            summary: TenderSummary::blank(),
            ignored_keys: Vec::new(),
            malformed_keys: Vec::new(),
        };

        for (key, value) in root {
            if known_sections.contains(&key.as_str()) {
                match value {
                    Value::Object(fields) => self.absorb_section(key, fields, &mut normalized)?,
                    Value::Null => {}
                    _ => {
                        warn!("Draft section {} is not an object; dropping it", key);
                        normalized.malformed_keys.push(key.clone());
                    }
                }
                continue;
            }

            if let Some(spec) = field_spec(key).filter(|s| s.section().is_none()) {
                // Some drafts nest the document lists under a `documents_required` object
                if let (FieldKind::List, Value::Object(nested)) = (spec.kind, value) {
                    self.absorb_section("", nested, &mut normalized)?;
                    continue;
                }
                self.absorb_field(spec, value, &mut normalized)?;
                continue;
            }

            normalized.ignored_keys.push(key.clone());
        }

        if !normalized.ignored_keys.is_empty() {
            if self.config.reject_unknown_keys {
                return Err(GatekeeperError::violation(
                    normalized.ignored_keys[0].clone(),
                    "unknown key in draft",
                ));
            }
            debug!("Ignoring unknown draft keys: {:?}", normalized.ignored_keys);
        }

        Ok(normalized)
    }

    fn absorb_section(
        &self,
        section: &str,
        fields: &Map<String, Value>,
        normalized: &mut NormalizedDraft,
    ) -> Result<(), GatekeeperError> {
        for (name, value) in fields {
            let path = if section.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", section, name)
            };
            match field_spec(&path) {
                Some(spec) => self.absorb_field(spec, value, normalized)?,
                None => normalized.ignored_keys.push(path),
            }
        }
        Ok(())
    }

    fn absorb_field(
        &self,
        spec: &'static FieldSpec,
        value: &Value,
        normalized: &mut NormalizedDraft,
    ) -> Result<(), GatekeeperError> {
        match self.coerce_field(spec, value) {
            Ok(coerced) => normalized.summary.set(spec.path, coerced)?,
            Err(e) => {
                warn!("Dropping malformed draft value: {}", e);
                normalized.summary.set(spec.path, FieldValue::NotMentioned)?;
                normalized.malformed_keys.push(spec.path.to_string());
            }
        }
        Ok(())
    }

    /// Coerce one JSON value into a field value of the field's kind
    pub fn coerce_field(
        &self,
        spec: &FieldSpec,
        value: &Value,
    ) -> Result<FieldValue, GatekeeperError> {
        match spec.kind {
            FieldKind::Text => self.coerce_text(spec, value),
            FieldKind::List => coerce_list(spec, value),
            FieldKind::Choice(allowed) => self.coerce_choice(spec, allowed, value),
        }
    }

    fn coerce_text(
        &self,
        spec: &FieldSpec,
        value: &Value,
    ) -> Result<FieldValue, GatekeeperError> {
        match value {
            Value::Null => Ok(FieldValue::NotMentioned),
            Value::String(s) => Ok(FieldValue::text(s.as_str())),
            Value::Number(n) => Ok(FieldValue::text(n.to_string())),
            Value::Bool(b) => Ok(FieldValue::text(if *b { "Yes" } else { "No" })),
            Value::Array(items) if self.config.join_text_lists => {
                let parts = scalar_items(spec, items)?;
                let parts: Vec<String> =
                    parts.into_iter().filter(|p| !is_absent_marker(p)).collect();
                Ok(FieldValue::text(parts.join(&self.config.list_separator)))
            }
            Value::Array(_) => Err(GatekeeperError::violation(
                spec.path,
                "expected text, found a list",
            )),
            Value::Object(_) => Err(GatekeeperError::violation(
                spec.path,
                "expected text, found an object",
            )),
        }
    }

    fn coerce_choice(
        &self,
        spec: &FieldSpec,
        allowed: &[&'static str],
        value: &Value,
    ) -> Result<FieldValue, GatekeeperError> {
        let raw = match value {
            Value::Null => return Ok(FieldValue::NotMentioned),
            Value::String(s) => s.trim().to_string(),
            Value::Bool(b) if self.config.lenient_choices => {
                (if *b { "Yes" } else { "No" }).to_string()
            }
            _ => {
                return Err(GatekeeperError::violation(
                    spec.path,
                    "expected one of the allowed values",
                ))
            }
        };
        if is_absent_marker(&raw) {
            return Ok(FieldValue::NotMentioned);
        }
        if let Some(exact) = allowed.iter().find(|a| a.eq_ignore_ascii_case(&raw)) {
            return Ok(FieldValue::Text((*exact).to_string()));
        }
        if self.config.lenient_choices {
            if let Some(mapped) = lenient_choice(allowed, &raw) {
                return Ok(FieldValue::Text(mapped.to_string()));
            }
        }
        Err(GatekeeperError::violation(
            spec.path,
            format!("{:?} is not one of {:?}", raw, allowed),
        ))
    }

    /// Validate a final record against the schema
    pub fn validate(&self, summary: &TenderSummary) -> ValidationResult {
        let mut reasons = Vec::new();
        for (spec, value) in summary.iter() {
            if let Err(e) = check_kind(spec, value) {
                reasons.push(RejectionReason::Malformed {
                    path: spec.path.to_string(),
                    issue: e.to_string(),
                });
                continue;
            }
            let raw_markers: Vec<&str> = match value {
                FieldValue::Text(s) => vec![s.as_str()],
                FieldValue::List(items) => items.iter().map(String::as_str).collect(),
                FieldValue::NotMentioned => Vec::new(),
            };
            if let Some(marker) = raw_markers.into_iter().find(|s| is_absent_marker(s)) {
                reasons.push(RejectionReason::NonCanonicalAbsence {
                    path: spec.path.to_string(),
                    value: marker.to_string(),
                });
            }
        }

        let json = summary.to_json();
        for spec in SCHEMA {
            let present = match spec.section() {
                Some(section) => json.get(section).and_then(|s| s.get(spec.name())).is_some(),
                None => json.get(spec.path).is_some(),
            };
            if !present {
                reasons.push(RejectionReason::Malformed {
                    path: spec.path.to_string(),
                    issue: "missing from serialized record".to_string(),
                });
            }
        }

        let status = if reasons.is_empty() {
            ValidationStatus::Accepted
        } else {
            ValidationStatus::Rejected
        };
        ValidationResult { status, reasons }
    }

    /// Validate and turn a rejection into a schema violation
    pub fn ensure_valid(&self, summary: &TenderSummary) -> Result<(), GatekeeperError> {
        let result = self.validate(summary);
        match result.reasons.into_iter().next() {
            None => Ok(()),
            Some(RejectionReason::Malformed { path, issue }) => {
                Err(GatekeeperError::violation(path, issue))
            }
            Some(RejectionReason::NonCanonicalAbsence { path, value }) => {
                Err(GatekeeperError::violation(
                    path,
                    format!("absent marker {:?} not canonicalised", value),
                ))
            }
        }
    }
}

fn scalar_items(spec: &FieldSpec, items: &[Value]) -> Result<Vec<String>, GatekeeperError> {
    items
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| match item {
            Value::String(s) => Ok(s.trim().to_string()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(GatekeeperError::violation(spec.path, "list items must be scalars")),
        })
        .collect()
}

fn coerce_list(spec: &FieldSpec, value: &Value) -> Result<FieldValue, GatekeeperError> {
    match value {
        Value::Null => Ok(FieldValue::NotMentioned),
        Value::Array(items) => Ok(FieldValue::list(scalar_items(spec, items)?)),
        Value::String(s) => Ok(FieldValue::list([s.as_str()])),
        Value::Number(n) => Ok(FieldValue::list([n.to_string()])),
        Value::Bool(_) => Err(GatekeeperError::violation(
            spec.path,
            "expected a list, found a boolean",
        )),
        Value::Object(_) => Err(GatekeeperError::violation(
            spec.path,
            "expected a list, found an object",
        )),
    }
}

fn lenient_choice(allowed: &[&'static str], raw: &str) -> Option<&'static str> {
    let lower = raw.to_ascii_lowercase();
    if allowed == ["Yes", "No"] {
        const NEGATIVE: &[&str] =
            &["no", "not allowed", "not permitted", "disallowed", "prohibited"];
        const POSITIVE: &[&str] = &["yes", "allowed", "permitted", "true"];
        if NEGATIVE.iter().any(|p| lower.starts_with(p)) {
            return Some("No");
        }
        if POSITIVE.iter().any(|p| lower.starts_with(p)) {
            return Some("Yes");
        }
        return None;
    }
    if allowed.contains(&"GeM") {
        return Portal::parse(raw).map(|p| p.as_str());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gatekeeper() -> Gatekeeper {
        Gatekeeper::default_config()
    }

    fn text_of(summary: &TenderSummary, path: &str) -> Option<String> {
        summary.get(path).and_then(|v| v.as_text()).map(str::to_string)
    }

    #[test]
    fn test_missing_fields_become_sentinel() {
        let draft = gatekeeper()
            .normalize_draft(&json!({"tender_meta": {"tender_id": "RFP-9"}}))
            .unwrap();
        assert_eq!(text_of(&draft.summary, "tender_meta.tender_id").as_deref(), Some("RFP-9"));
        assert_eq!(draft.summary.mentioned_count(), 1);
    }

    #[test]
    fn test_sentinel_variants_normalised() {
        let draft = gatekeeper()
            .normalize_draft(&json!({
                "key_dates": {
                    "bid_end": "N/A",
                    "bid_start": "not specified",
                    "publication_date": null
                },
                "financial_requirements": {"emd": "TBD"}
            }))
            .unwrap();
        for path in [
            "key_dates.bid_end",
            "key_dates.bid_start",
            "key_dates.publication_date",
            "financial_requirements.emd",
        ] {
            assert!(!draft.summary.get(path).unwrap().is_mentioned(), "{}", path);
        }
    }

    #[test]
    fn test_scalar_coercion() {
        let draft = gatekeeper()
            .normalize_draft(&json!({
                "tender_meta": {"total_quantity": 250},
                "scope_of_work": {"deliverables": ["Survey", "Design", "n/a"]},
                "documents_required": "PAN card"
            }))
            .unwrap();
        let s = &draft.summary;
        assert_eq!(text_of(s, "tender_meta.total_quantity").as_deref(), Some("250"));
        assert_eq!(text_of(s, "scope_of_work.deliverables").as_deref(), Some("Survey; Design"));
        assert_eq!(
            s.get("documents_required"),
            Some(&FieldValue::List(vec!["PAN card".to_string()]))
        );
    }

    #[test]
    fn test_nested_document_lists_accepted() {
        let draft = gatekeeper()
            .normalize_draft(&json!({
                "documents_required": {
                    "documents_required": ["GST certificate"],
                    "online_submission_documents": ["Technical bid"],
                    "offline_submission_documents": []
                }
            }))
            .unwrap();
        let s = &draft.summary;
        assert!(s.get("documents_required").unwrap().is_mentioned());
        assert!(s.get("online_submission_documents").unwrap().is_mentioned());
        assert!(!s.get("offline_submission_documents").unwrap().is_mentioned());
    }

    #[test]
    fn test_object_in_text_field_is_dropped_not_fatal() {
        let draft = gatekeeper()
            .normalize_draft(&json!({
                "financial_requirements": {"emd": {"amount": 5}, "tender_fee": "₹1,180"}
            }))
            .unwrap();
        assert_eq!(draft.malformed_keys, vec!["financial_requirements.emd".to_string()]);
        assert!(!draft.summary.get("financial_requirements.emd").unwrap().is_mentioned());
        assert_eq!(
            text_of(&draft.summary, "financial_requirements.tender_fee").as_deref(),
            Some("₹1,180")
        );
        assert!(gatekeeper().ensure_valid(&draft.summary).is_ok());
    }

    #[test]
    fn test_non_object_draft_is_violation() {
        assert!(gatekeeper().normalize_draft(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_scalar_section_is_recorded_as_malformed() {
        let draft = gatekeeper()
            .normalize_draft(&json!({
                "key_dates": "12-03-2025",
                "tender_meta": {"tender_id": "T-1"}
            }))
            .unwrap();
        assert_eq!(draft.malformed_keys, vec!["key_dates".to_string()]);
        assert_eq!(text_of(&draft.summary, "tender_meta.tender_id").as_deref(), Some("T-1"));
    }

    #[test]
    fn test_choice_fields() {
        let draft = gatekeeper()
            .normalize_draft(&json!({
                "tender_meta": {"portal": "gem"},
                "eligibility_snapshot": {
                    "consortium_or_jv_allowed": "Not permitted under this tender",
                    "international_bidders_allowed": true
                }
            }))
            .unwrap();
        let s = &draft.summary;
        assert_eq!(text_of(s, "tender_meta.portal").as_deref(), Some("GeM"));
        assert_eq!(
            text_of(s, "eligibility_snapshot.consortium_or_jv_allowed").as_deref(),
            Some("No")
        );
        assert_eq!(
            text_of(s, "eligibility_snapshot.international_bidders_allowed").as_deref(),
            Some("Yes")
        );

        let draft = gatekeeper()
            .normalize_draft(&json!({
                "eligibility_snapshot": {"consortium_or_jv_allowed": "Only for MSEs"}
            }))
            .unwrap();
        assert_eq!(
            draft.malformed_keys,
            vec!["eligibility_snapshot.consortium_or_jv_allowed".to_string()]
        );
        assert!(!draft
            .summary
            .get("eligibility_snapshot.consortium_or_jv_allowed")
            .unwrap()
            .is_mentioned());
    }

    #[test]
    fn test_unknown_keys() {
        let draft = gatekeeper()
            .normalize_draft(&json!({
                "executive_summary": "x",
                "key_dates": {"moon_phase": "full"}
            }))
            .unwrap();
        assert_eq!(
            draft.ignored_keys,
            vec!["executive_summary".to_string(), "key_dates.moon_phase".to_string()]
        );

        let strict = Gatekeeper::new(ValidationConfig::strict());
        assert!(strict.normalize_draft(&json!({"executive_summary": "x"})).is_err());
    }

    #[test]
    fn test_strict_drops_list_in_text_field() {
        let strict = Gatekeeper::new(ValidationConfig::strict());
        let draft = strict
            .normalize_draft(&json!({"scope_of_work": {"deliverables": ["a", "b"]}}))
            .unwrap();
        assert_eq!(draft.malformed_keys, vec!["scope_of_work.deliverables".to_string()]);
        assert!(strict
            .coerce_field(field_spec("scope_of_work.deliverables").unwrap(), &json!(["a", "b"]))
            .is_err());
    }

    #[test]
    fn test_validate_accepts_normalised_record() {
        let draft = gatekeeper()
            .normalize_draft(&json!({"key_dates": {"bid_end": "12-03-2025"}}))
            .unwrap();
        let result = gatekeeper().validate(&draft.summary);
        assert_eq!(result.status, ValidationStatus::Accepted);
        assert!(gatekeeper().ensure_valid(&draft.summary).is_ok());
    }

    #[test]
    fn test_validate_flags_raw_absent_marker() {
        let mut summary = TenderSummary::blank();
        summary
            .set("key_dates.bid_end", FieldValue::Text("N/A".to_string()))
            .unwrap();
        let result = gatekeeper().validate(&summary);
        assert_eq!(result.status, ValidationStatus::Rejected);
        assert!(matches!(result.reasons[0], RejectionReason::NonCanonicalAbsence { .. }));
        assert!(gatekeeper().ensure_valid(&summary).is_err());
    }
}
