//! Tender summary record

use crate::schema::{field_spec, is_absent_marker, FieldKind, FieldSpec, SCHEMA, SENTINEL};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised when a value does not fit the schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummaryError {
    /// Path is not part of the schema
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Value has the wrong shape for the field
    #[error("Field {path} expects {expected}")]
    KindMismatch {
        /// Field path
        path: String,
        /// Expected shape
        expected: &'static str,
    },

    /// Value is not one of the field's allowed choices
    #[error("Field {path} does not allow value {value:?}")]
    InvalidChoice {
        /// Field path
        path: String,
        /// Rejected value
        value: String,
    },
}

/// Value of one summary field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Concrete text
    Text(String),
    /// Concrete list of items
    List(Vec<String>),
    /// The documents do not mention this field
    NotMentioned,
}

impl FieldValue {
    /// Text value, collapsing absent markers to [`FieldValue::NotMentioned`]
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if is_absent_marker(&value) {
            FieldValue::NotMentioned
        } else {
            FieldValue::Text(value.trim().to_string())
        }
    }

    /// List value; absent-marker items are dropped and an empty list
    /// collapses to [`FieldValue::NotMentioned`]
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items
            .into_iter()
            .map(Into::into)
            .filter(|item| !is_absent_marker(item))
            .map(|item| item.trim().to_string())
            .collect();
        if items.is_empty() {
            FieldValue::NotMentioned
        } else {
            FieldValue::List(items)
        }
    }

    /// True for anything other than the sentinel
    pub fn is_mentioned(&self) -> bool {
        !matches!(self, FieldValue::NotMentioned)
    }

    /// Text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON form; the sentinel serializes as the string `"Not mentioned"`
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            FieldValue::NotMentioned => Value::String(SENTINEL.to_string()),
        }
    }

    /// Short single-line rendering for prompts and logs
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join("; "),
            FieldValue::NotMentioned => SENTINEL.to_string(),
        }
    }
}

/// A schema-complete tender record
///
/// Every schema field is always present: a fresh summary holds the sentinel
/// everywhere. Values are stored in schema order, so iteration and JSON
/// output are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenderSummary {
    values: Vec<FieldValue>,
}

impl TenderSummary {
    /// A summary with every field at the sentinel
    pub fn blank() -> Self {
        Self {
            values: vec![FieldValue::NotMentioned; SCHEMA.len()],
        }
    }

    fn index_of(path: &str) -> Option<usize> {
        SCHEMA.iter().position(|spec| spec.path == path)
    }

    /// Value of a field
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        Self::index_of(path).map(|i| &self.values[i])
    }

    /// Set a field, checking the value against the field's kind
    pub fn set(&mut self, path: &str, value: FieldValue) -> Result<(), SummaryError> {
        let idx = Self::index_of(path).ok_or_else(|| SummaryError::UnknownField(path.to_string()))?;
        check_kind(&SCHEMA[idx], &value)?;
        self.values[idx] = value;
        Ok(())
    }

    /// Fields paired with their specification, in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&'static FieldSpec, &FieldValue)> {
        SCHEMA.iter().zip(self.values.iter())
    }

    /// Number of fields holding a concrete value
    pub fn mentioned_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_mentioned()).count()
    }

    /// Nested JSON object keyed by section
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (spec, value) in self.iter() {
            match spec.section() {
                Some(section) => {
                    let entry = root
                        .entry(section.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(map) = entry {
                        map.insert(spec.name().to_string(), value.to_json());
                    }
                }
                None => {
                    root.insert(spec.path.to_string(), value.to_json());
                }
            }
        }
        Value::Object(root)
    }
}

impl Default for TenderSummary {
    fn default() -> Self {
        Self::blank()
    }
}

impl serde::Serialize for TenderSummary {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Check a value against a field's declared kind
pub fn check_kind(spec: &FieldSpec, value: &FieldValue) -> Result<(), SummaryError> {
    match (spec.kind, value) {
        (_, FieldValue::NotMentioned) => Ok(()),
        (FieldKind::Text, FieldValue::Text(_)) => Ok(()),
        (FieldKind::List, FieldValue::List(_)) => Ok(()),
        (FieldKind::Choice(allowed), FieldValue::Text(s)) => {
            if allowed.contains(&s.as_str()) {
                Ok(())
            } else {
                Err(SummaryError::InvalidChoice {
                    path: spec.path.to_string(),
                    value: s.clone(),
                })
            }
        }
        (FieldKind::List, _) => Err(SummaryError::KindMismatch {
            path: spec.path.to_string(),
            expected: "a list",
        }),
        _ => Err(SummaryError::KindMismatch {
            path: spec.path.to_string(),
            expected: "text",
        }),
    }
}

/// Look up a spec, turning a miss into [`SummaryError::UnknownField`]
pub fn require_spec(path: &str) -> Result<&'static FieldSpec, SummaryError> {
    field_spec(path).ok_or_else(|| SummaryError::UnknownField(path.to_string()))
}
