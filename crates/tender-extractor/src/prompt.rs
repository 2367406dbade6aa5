//! Prompts for each model-calling stage
//!
//! Every prompt opens with a `TASK:` line naming the stage, so providers,
//! logs and test doubles can tell the calls apart.

use crate::chunking::Chunk;
use serde_json::{Map, Value};
use tender_domain::{FieldKind, FieldSpec, GroundTruthFacts, InferenceRequest, Portal, SCHEMA};

/// Task line of the single-pass extraction call
pub const SINGLE_PASS_TASK: &str = "TASK: SINGLE_PASS_EXTRACTION";
/// Task line of a chunk summary call
pub const CHUNK_TASK: &str = "TASK: CHUNK_SUMMARY";
/// Task line of the final merge call
pub const MERGE_TASK: &str = "TASK: FINAL_MERGE";
/// Task line of a field recovery call
pub const GAP_TASK: &str = "TASK: FIELD_RECOVERY";

/// Builds stage prompts for one run
pub struct PromptBuilder<'a> {
    portal: Portal,
    facts: &'a GroundTruthFacts,
}

impl<'a> PromptBuilder<'a> {
    /// Create a builder for the run's portal and ground truth
    pub fn new(portal: Portal, facts: &'a GroundTruthFacts) -> Self {
        Self { portal, facts }
    }

    /// Full-record extraction over a bounded context
    pub fn single_pass(&self, context: impl Into<String>) -> InferenceRequest {
        let mut prompt = String::new();
        prompt.push_str(SINGLE_PASS_TASK);
        prompt.push_str("\n\n");
        prompt.push_str(EXTRACTION_INSTRUCTIONS);
        self.push_portal_notes(&mut prompt);
        self.push_anchor_data(&mut prompt);
        prompt.push_str(OUTPUT_FORMAT_REMINDER);

        InferenceRequest::new(prompt, context).with_schema_hint(schema_template())
    }

    /// Dense fact summary of one chunk
    pub fn micro_summary(&self, chunk: &Chunk, total: usize) -> InferenceRequest {
        let prompt = format!(
            "{CHUNK_TASK}\nChunk {} of {}\nPortal: {}\n\n{CHUNK_INSTRUCTIONS}",
            chunk.index + 1,
            total,
            self.portal.as_str()
        );
        InferenceRequest::new(prompt, chunk.text.clone())
    }

    /// Full-record extraction over the ordered chunk summaries
    pub fn merge(&self, master_context: impl Into<String>) -> InferenceRequest {
        let mut prompt = String::new();
        prompt.push_str(MERGE_TASK);
        prompt.push_str("\n\n");
        prompt.push_str(MERGE_INSTRUCTIONS);
        self.push_portal_notes(&mut prompt);
        self.push_anchor_data(&mut prompt);
        prompt.push_str(OUTPUT_FORMAT_REMINDER);

        InferenceRequest::new(prompt, master_context).with_schema_hint(schema_template())
    }

    /// Targeted recovery of a single field from selected passages
    pub fn field_recovery(
        &self,
        spec: &FieldSpec,
        passages: impl Into<String>,
    ) -> InferenceRequest {
        let mut prompt = format!("{GAP_TASK} field={}\n\n", spec.path);
        prompt.push_str(&format!(
            "A previous extraction pass could not find the {} of this tender.\n",
            spec.label()
        ));
        prompt.push_str(&format!(
            "It may appear as: {}.\n",
            spec.search_terms().join(", ")
        ));
        if let FieldKind::Choice(allowed) = spec.kind {
            prompt.push_str(&format!("Answer with one of: {}.\n", allowed.join(", ")));
        }
        if let FieldKind::List = spec.kind {
            prompt.push_str("Answer with a JSON array of strings.\n");
        }
        prompt.push_str(GAP_INSTRUCTIONS);

        let mut hint = Map::new();
        hint.insert(spec.path.to_string(), field_template(spec));
        InferenceRequest::new(prompt, passages).with_schema_hint(pretty(&Value::Object(hint)))
    }

    fn push_portal_notes(&self, prompt: &mut String) {
        let notes = match self.portal {
            Portal::Gem => GEM_NOTES,
            Portal::Cppp => CPPP_NOTES,
            Portal::Generic => return,
        };
        prompt.push_str("\n\n");
        prompt.push_str(notes);
    }

    fn push_anchor_data(&self, prompt: &mut String) {
        if self.facts.is_empty() {
            prompt.push_str("\n\n");
            return;
        }
        prompt.push_str("\n\nPRE-EXTRACTED DATA (verified, copy these values exactly):\n");
        prompt.push_str(&self.facts.render());
        prompt.push_str("\n\n");
    }
}

/// JSON template of the full record, nested by section
pub fn schema_template() -> String {
    let mut root = Map::new();
    for spec in SCHEMA {
        match spec.section() {
            Some(section) => {
                let entry = root
                    .entry(section.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(map) = entry {
                    map.insert(spec.name().to_string(), field_template(spec));
                }
            }
            None => {
                root.insert(spec.path.to_string(), field_template(spec));
            }
        }
    }
    pretty(&Value::Object(root))
}

fn field_template(spec: &FieldSpec) -> Value {
    match spec.kind {
        FieldKind::Text => Value::String(String::new()),
        FieldKind::List => Value::Array(Vec::new()),
        FieldKind::Choice(allowed) => Value::String(allowed.join(" | ")),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

const EXTRACTION_INSTRUCTIONS: &str = r#"You are a tender analyst preparing a bid/no-bid summary for a vendor.
Extract every field of the response schema from the tender document.

Rules:
- Copy identifiers, dates and amounts exactly as written
- Keep each value short and factual; no commentary
- Use "Not mentioned" for anything the document does not state
- Lists hold one item per entry
- vendor_decision_hint summarises who should and should not bid"#;

const MERGE_INSTRUCTIONS: &str = r#"You are a tender analyst preparing a bid/no-bid summary for a vendor.
The document was too large to read at once. Below are fact summaries of its
chunks, in document order. Build the complete record from them.

Rules:
- When chunks disagree, prefer the later chunk (corrigenda come last)
- Copy identifiers, dates and amounts exactly as written
- Use "Not mentioned" for anything no chunk states"#;

const CHUNK_INSTRUCTIONS: &str = r#"Summarise the facts in this part of a tender document as terse bullet points.
Keep every identifier, date, amount, percentage, quantity, eligibility
condition, required document and penalty clause exactly as written.
Skip boilerplate. If the part holds no such facts, reply with an empty line."#;

const GAP_INSTRUCTIONS: &str = r#"Search the passages below for this value only.
Reply with a JSON object mapping the field path to the exact value.
If the passages do not state it, use "Not mentioned"."#;

const GEM_NOTES: &str = r#"This is a GeM (Government e-Marketplace) bid document:
- The bid number looks like GEM/YYYY/B/NNNNNNN
- Turnover and experience tables put the value on the line after the label
- pre_qualification_requirement lists each criterion separated by " | "
- documents_required holds the documents required from the seller"#;

const CPPP_NOTES: &str = r#"This is a CPPP (Central Public Procurement Portal) notice:
- Use the "Date & Time of Issue" and "Due Date & Time of Submission" labels
- Split submission documents into online and offline envelopes
- Record the bidder's required technical infrastructure"#;

const OUTPUT_FORMAT_REMINDER: &str =
    "Return ONLY a JSON object matching the response schema. No markdown, no explanations.";
