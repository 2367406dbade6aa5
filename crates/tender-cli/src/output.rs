//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};
use tender_extractor::{ProcessingOutcome, RunMetadata};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format a processing outcome.
    pub fn format_outcome(&self, outcome: &ProcessingOutcome) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
            OutputFormat::Table => Ok(format!(
                "{}\n\n{}",
                self.format_fields_table(outcome),
                self.run_summary(&outcome.metadata)
            )),
        }
    }

    /// Format the record as a field/value table.
    fn format_fields_table(&self, outcome: &ProcessingOutcome) -> String {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);

        for (spec, value) in outcome.summary.iter() {
            let rendered = value.render();
            let rendered = if value.is_mentioned() {
                rendered
            } else {
                self.colorize(&rendered, "yellow")
            };
            builder.push_record([spec.path.to_string(), rendered]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));

        table.to_string()
    }

    /// Format the run summary, highlighting unresolved fields.
    pub fn run_summary(&self, metadata: &RunMetadata) -> String {
        let mut lines = vec![metadata.summary()];
        if metadata.unresolved_fields.is_empty() {
            lines.push(self.success("Every checklist field resolved"));
        } else {
            lines.push(self.warning(&format!(
                "{} checklist field(s) left at \"Not mentioned\"",
                metadata.unresolved_fields.len()
            )));
        }
        if !metadata.chunk_failures.is_empty() {
            lines.push(self.warning(&format!(
                "{} chunk summary call(s) failed",
                metadata.chunk_failures.len()
            )));
        }
        lines.join("\n")
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_domain::{FieldValue, Portal, RunId, TenderSummary};

    fn outcome() -> ProcessingOutcome {
        let mut summary = TenderSummary::blank();
        summary
            .set("key_dates.bid_end", FieldValue::text("12-03-2025"))
            .unwrap();
        let mut metadata =
            RunMetadata::new(RunId::from_value(1), "test/1", "mock", Portal::Generic, true);
        metadata.unresolved_fields = vec!["financial_requirements.emd".to_string()];
        ProcessingOutcome { summary, metadata }
    }

    #[test]
    fn test_json_format() {
        let formatter = Formatter::new(OutputFormat::Json, false);
        let output = formatter.format_outcome(&outcome()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["summary"]["key_dates"]["bid_end"], "12-03-2025");
        assert_eq!(json["metadata"]["model"], "mock");
    }

    #[test]
    fn test_table_format() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_outcome(&outcome()).unwrap();
        assert!(output.contains("key_dates.bid_end"));
        assert!(output.contains("12-03-2025"));
        assert!(output.contains("Not mentioned"));
        assert!(output.contains("1 checklist field(s)"));
    }

    #[test]
    fn test_messages_without_color() {
        let formatter = Formatter::new(OutputFormat::Json, false);
        assert_eq!(formatter.success("done"), "✓ done");
        assert_eq!(formatter.error("failed"), "✗ failed");
    }
}
