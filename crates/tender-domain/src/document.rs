//! Unified document - all source text of one tender, in a fixed order

use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

/// Errors raised while assembling a unified document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Two spans share a label, so offsets could not be traced to one file
    #[error("Duplicate source label: {0}")]
    DuplicateLabel(String),

    /// A span label is blank
    #[error("Source label must not be empty")]
    EmptyLabel,
}

/// Text of one uploaded or linked file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// Unique label of the file the text came from (usually the file name)
    pub label: String,

    /// Extracted plain text
    pub text: String,
}

impl SourceSpan {
    /// Create a new span
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Ordered sequence of labelled spans, rendered once into a single text
///
/// The rendered text places a `=== label ===` header before each span.
/// Rendering is deterministic: the same spans in the same order always
/// produce the same text, and every byte offset maps back to exactly one
/// source label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedDocument {
    spans: Vec<SourceSpan>,
    rendered: String,
    // Byte range of each span's section (header included) inside `rendered`
    segments: Vec<Range<usize>>,
}

impl UnifiedDocument {
    /// Build a document from spans in their concatenation order
    ///
    /// # Examples
    ///
    /// ```
    /// use tender_domain::{SourceSpan, UnifiedDocument};
    ///
    /// let doc = UnifiedDocument::new(vec![
    ///     SourceSpan::new("nit.pdf", "Tender No: ABC/2025/17"),
    ///     SourceSpan::new("corrigendum.pdf", "Bid End Date: 12-03-2025"),
    /// ]).unwrap();
    ///
    /// assert!(doc.text().starts_with("=== nit.pdf ==="));
    /// assert_eq!(doc.len_spans(), 2);
    /// ```
    pub fn new(spans: Vec<SourceSpan>) -> Result<Self, DocumentError> {
        let mut seen = HashSet::new();
        for span in &spans {
            if span.label.trim().is_empty() {
                return Err(DocumentError::EmptyLabel);
            }
            if !seen.insert(span.label.as_str()) {
                return Err(DocumentError::DuplicateLabel(span.label.clone()));
            }
        }

        let mut rendered = String::new();
        let mut segments = Vec::with_capacity(spans.len());
        for (i, span) in spans.iter().enumerate() {
            if i > 0 {
                rendered.push_str("\n\n");
            }
            let start = rendered.len();
            rendered.push_str("=== ");
            rendered.push_str(&span.label);
            rendered.push_str(" ===\n");
            rendered.push_str(&span.text);
            segments.push(start..rendered.len());
        }

        Ok(Self {
            spans,
            rendered,
            segments,
        })
    }

    /// Build a document holding a single span
    pub fn single(
        label: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, DocumentError> {
        Self::new(vec![SourceSpan::new(label, text)])
    }

    /// An empty document
    pub fn empty() -> Self {
        Self {
            spans: Vec::new(),
            rendered: String::new(),
            segments: Vec::new(),
        }
    }

    /// The rendered text of every span, headers included
    pub fn text(&self) -> &str {
        &self.rendered
    }

    /// The source spans, in concatenation order
    pub fn spans(&self) -> &[SourceSpan] {
        &self.spans
    }

    /// Number of spans
    pub fn len_spans(&self) -> usize {
        self.spans.len()
    }

    /// True if the document carries no text at all
    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|s| s.text.trim().is_empty())
    }

    /// Label of the span containing the given byte offset of [`Self::text`]
    pub fn label_at(&self, offset: usize) -> Option<&str> {
        let idx = self.segments.iter().position(|r| {
            // The separator between sections belongs to the preceding span
            offset >= r.start && offset < r.end + 2
        })?;
        Some(self.spans[idx].label.as_str())
    }
}
