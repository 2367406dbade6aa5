//! Parse model output into drafts and field answers

use crate::error::EngineError;
use serde_json::Value;
use tender_domain::{FieldSpec, FieldValue, Stage};
use tender_gatekeeper::{Gatekeeper, NormalizedDraft};
use tracing::{debug, warn};

/// Parse a full-record response and normalise it into a draft
pub fn parse_draft(
    response: &str,
    gatekeeper: &Gatekeeper,
    stage: Stage,
) -> Result<NormalizedDraft, EngineError> {
    let json = parse_json_object(response)
        .map_err(|message| EngineError::InvalidFormat { stage, message })?;
    let draft = gatekeeper.normalize_draft(&json)?;
    if !draft.ignored_keys.is_empty() {
        debug!("{} draft carried unknown keys: {:?}", stage, draft.ignored_keys);
    }
    Ok(draft)
}

/// Parse a recovery answer for one field
///
/// Accepts a JSON object keyed by the field path, the bare field name or
/// `value`, a bare JSON value, or plain text. Returns `None` when the answer
/// is the sentinel or cannot be coerced to the field's kind.
pub fn parse_gap_answer(
    response: &str,
    spec: &FieldSpec,
    gatekeeper: &Gatekeeper,
) -> Option<FieldValue> {
    let raw = match parse_json_value(response) {
        Ok(Value::Object(map)) => [spec.path, spec.name(), "value"]
            .iter()
            .find_map(|key| map.get(*key).cloned())
            .or_else(|| (map.len() == 1).then(|| map.values().next().cloned()).flatten())?,
        Ok(value) => value,
        Err(_) => Value::String(strip_quotes(response.trim()).to_string()),
    };

    match gatekeeper.coerce_field(spec, &raw) {
        Ok(value) if value.is_mentioned() => Some(value),
        Ok(_) => None,
        Err(e) => {
            warn!("Discarding recovery answer for {}: {}", spec.path, e);
            None
        }
    }
}

/// Extract and parse the first JSON object in a response
pub fn parse_json_object(response: &str) -> Result<Value, String> {
    match parse_json_value(response)? {
        value @ Value::Object(_) => Ok(value),
        other => Err(format!("Expected JSON object, got {}", type_name(&other))),
    }
}

fn parse_json_value(response: &str) -> Result<Value, String> {
    let candidate = extract_json(response)?;
    match serde_json::from_str(&candidate) {
        Ok(value) => Ok(value),
        Err(first) => {
            let repaired = escape_raw_control_chars(&candidate);
            serde_json::from_str(&repaired).map_err(|_| format!("JSON parse error: {}", first))
        }
    }
}

/// Extract JSON from a response, handling markdown code blocks and chatter
fn extract_json(response: &str) -> Result<String, String> {
    let mut body = response.trim();

    if let Some(fence) = body.find("```") {
        let after = &body[fence + 3..];
        let after = after.split_once('\n').map(|(_, rest)| rest).unwrap_or(after);
        body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
        body = body.trim();
    }

    if body.is_empty() {
        return Err("Empty response".to_string());
    }

    let first = body.find(['{', '[']);
    let object = match (first, body.rfind(['}', ']'])) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => body,
    };
    Ok(object.to_string())
}

/// Escape raw newlines and tabs that appear inside JSON strings
fn escape_raw_control_chars(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_domain::field_spec;

    fn gatekeeper() -> Gatekeeper {
        Gatekeeper::default_config()
    }

    #[test]
    fn test_parse_plain_object() {
        let value = parse_json_object(r#"{"key_dates": {"bid_end": "12-03-2025"}}"#).unwrap();
        assert_eq!(value["key_dates"]["bid_end"], "12-03-2025");
    }

    #[test]
    fn test_parse_json_with_markdown_wrapper() {
        let response =
            "Here you go:\n```json\n{\"tender_meta\": {\"tender_id\": \"T-1\"}}\n```\nThanks";
        let value = parse_json_object(response).unwrap();
        assert_eq!(value["tender_meta"]["tender_id"], "T-1");
    }

    #[test]
    fn test_parse_json_with_chatter() {
        let value = parse_json_object("Sure! {\"a\": 1} Hope this helps.").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_repairs_raw_newlines_in_strings() {
        let value =
            parse_json_object("{\"scope_of_work\": {\"description\": \"Line one\nLine two\"}}")
                .unwrap();
        assert_eq!(value["scope_of_work"]["description"], "Line one\nLine two");
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(parse_json_object("This is not JSON").is_err());
        assert!(parse_json_object("").is_err());
    }

    #[test]
    fn test_rejects_array() {
        let err = parse_json_object("[1, 2]").unwrap_err();
        assert!(err.contains("array"));
    }

    #[test]
    fn test_parse_draft_reports_stage() {
        let err = parse_draft("garbage", &gatekeeper(), Stage::Merge).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFormat { stage: Stage::Merge, .. }));
    }

    #[test]
    fn test_parse_draft_normalises() {
        let draft = parse_draft(
            r#"{"key_dates": {"bid_end": "12-03-2025", "bid_start": "N/A"}}"#,
            &gatekeeper(),
            Stage::SinglePass,
        )
        .unwrap();
        assert_eq!(
            draft.summary.get("key_dates.bid_end"),
            Some(&FieldValue::text("12-03-2025"))
        );
        assert!(!draft.summary.get("key_dates.bid_start").unwrap().is_mentioned());
    }

    #[test]
    fn test_gap_answer_keyed_by_path() {
        let spec = field_spec("eligibility_snapshot.turnover_requirement").unwrap();
        let answer = parse_gap_answer(
            r#"{"eligibility_snapshot.turnover_requirement": "₹5 Crore"}"#,
            spec,
            &gatekeeper(),
        );
        assert_eq!(answer, Some(FieldValue::text("₹5 Crore")));
    }

    #[test]
    fn test_gap_answer_keyed_by_name_or_value() {
        let spec = field_spec("financial_requirements.emd").unwrap();
        let gk = gatekeeper();
        assert_eq!(
            parse_gap_answer(r#"{"emd": "25,000"}"#, spec, &gk),
            Some(FieldValue::text("25,000"))
        );
        assert_eq!(
            parse_gap_answer(r#"{"value": "25,000"}"#, spec, &gk),
            Some(FieldValue::text("25,000"))
        );
    }

    #[test]
    fn test_gap_answer_plain_text() {
        let spec = field_spec("scope_of_work.location").unwrap();
        assert_eq!(
            parse_gap_answer("\"New Delhi\"", spec, &gatekeeper()),
            Some(FieldValue::text("New Delhi"))
        );
    }

    #[test]
    fn test_gap_answer_sentinel_is_none() {
        let spec = field_spec("scope_of_work.location").unwrap();
        assert_eq!(parse_gap_answer("Not mentioned", spec, &gatekeeper()), None);
        assert_eq!(
            parse_gap_answer(r#"{"scope_of_work.location": "Not mentioned"}"#, spec, &gatekeeper()),
            None
        );
    }

    #[test]
    fn test_gap_answer_list_field() {
        let spec = field_spec("documents_required").unwrap();
        let answer = parse_gap_answer(
            r#"{"documents_required": ["PAN card", "GST certificate"]}"#,
            spec,
            &gatekeeper(),
        );
        assert_eq!(answer, Some(FieldValue::list(["PAN card", "GST certificate"])));
    }
}
