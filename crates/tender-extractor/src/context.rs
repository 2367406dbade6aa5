//! Bounded context for the single-pass call
//!
//! A document that fits comfortably is sent whole. Otherwise the sections
//! that matter most for a bid decision are pulled out by heading and packed
//! in priority order. Each section gets a share of the budget; whatever a
//! section leaves unused rolls over to the next one. Oversized sections keep
//! their head and tail around a truncation marker.

use regex::Regex;
use std::sync::LazyLock;
use tender_domain::estimate_tokens;
use tender_domain::tokens::BYTES_PER_TOKEN;
use tracing::debug;

/// Marker placed where the middle of an oversized section was dropped
pub const TRUNCATION_MARKER: &str = "\n... [truncated] ...\n";

const FULL_TEXT_HEADER: &str = "=== COMPLETE TENDER DOCUMENT ===\n";
const FALLBACK_HEADER: &str = "=== TENDER DOCUMENT (TRUNCATED) ===\n";
const FULL_TEXT_RATIO: f64 = 0.9;

struct SectionRule {
    title: &'static str,
    share: f64,
    heading: Regex,
}

static SECTIONS: LazyLock<Vec<SectionRule>> = LazyLock::new(|| {
    let rule = |title, share, pattern: &str| SectionRule {
        title,
        share,
        heading: Regex::new(pattern).expect("valid regex"),
    };
    vec![
        rule(
            "ELIGIBILITY CRITERIA",
            0.30,
            r"(?im)^[^\n]*\b(?:Eligibility|Qualification|Who\s+Can\s+Bid)\b[^\n]*$",
        ),
        rule(
            "FINANCIAL REQUIREMENTS",
            0.25,
            r"(?im)^[^\n]*\b(?:Financial\s+Requirements?|EMD|Earnest\s+Money|Tender\s+Fee)\b[^\n]*$",
        ),
        rule(
            "IMPORTANT DATES",
            0.15,
            r"(?im)^[^\n]*\b(?:Important\s+Dates?|Critical\s+Dates?|Timeline|Schedule)\b[^\n]*$",
        ),
        rule(
            "SCOPE OF WORK",
            0.15,
            r"(?im)^[^\n]*\b(?:Scope\s+of\s+Work|Technical\s+Spec(?:ification)?s?)\b[^\n]*$",
        ),
        rule(
            "TERMS & CONDITIONS",
            0.15,
            r"(?im)^[^\n]*\b(?:Terms\s+and\s+Conditions|Special\s+Conditions|General\s+Conditions)\b[^\n]*$",
        ),
    ]
});

static SECTION_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:\d+\.\s+\S|===\s)").expect("valid regex"));

/// Build the single-pass context within `budget_tokens`
///
/// The result never estimates above the budget.
pub fn build_context(text: &str, budget_tokens: u64) -> String {
    let full = format!("{FULL_TEXT_HEADER}{text}");
    if (estimate_tokens(&full) as f64) < budget_tokens as f64 * FULL_TEXT_RATIO {
        debug!("Context: full text ({} tokens)", estimate_tokens(&full));
        return full;
    }

    let mut remaining = budget_tokens;
    let mut carry = 0u64;
    let mut parts: Vec<String> = Vec::new();

    for (i, section) in SECTIONS.iter().enumerate() {
        let is_last = i + 1 == SECTIONS.len();
        let share = (budget_tokens as f64 * section.share) as u64 + carry;
        let allowance = if is_last { remaining } else { share.min(remaining) };
        carry = allowance;

        let Some(body) = find_section(text, &section.heading) else {
            continue;
        };
        let header = format!("\n=== {} ===\n", section.title);
        let header_tokens = estimate_tokens(&header) + 1;
        if allowance <= header_tokens {
            continue;
        }

        let piece = format!(
            "{}{}",
            header,
            truncate_middle(body.trim(), allowance - header_tokens)
        );
        let used = estimate_tokens(&piece).min(allowance);
        debug!("Context: {} section uses {} of {} tokens", section.title, used, allowance);
        remaining -= used;
        carry = allowance - used;
        parts.push(piece);
    }

    if parts.is_empty() {
        let header_tokens = estimate_tokens(FALLBACK_HEADER) + 1;
        if budget_tokens <= header_tokens {
            return String::new();
        }
        debug!("Context: no sections found, using truncated full text");
        return format!("{FALLBACK_HEADER}{}", truncate_middle(text, budget_tokens - header_tokens));
    }

    parts.concat()
}

/// Body of the first section whose heading matches
fn find_section<'t>(text: &'t str, heading: &Regex) -> Option<&'t str> {
    let m = heading.find(text)?;
    let body_start = (m.end() + 1).min(text.len());
    let rest = &text[body_start..];
    let body_end = SECTION_END
        .find(rest)
        .map(|end| body_start + end.start())
        .unwrap_or(text.len());
    let body = &text[body_start..body_end];
    (!body.trim().is_empty()).then_some(body)
}

/// Keep head and tail of `text` so that it fits `max_tokens`
///
/// Text that already fits is returned unchanged.
pub fn truncate_middle(text: &str, max_tokens: u64) -> String {
    let max_bytes = usize::try_from(max_tokens)
        .unwrap_or(usize::MAX / BYTES_PER_TOKEN)
        .saturating_mul(BYTES_PER_TOKEN);
    if text.len() <= max_bytes {
        return text.to_string();
    }
    if max_bytes <= TRUNCATION_MARKER.len() {
        return text[..floor_boundary(text, max_bytes)].to_string();
    }

    let keep = max_bytes - TRUNCATION_MARKER.len();
    let head_end = floor_boundary(text, keep / 2);
    let tail_len = keep - head_end;
    let tail_start = ceil_boundary(text, text.len() - tail_len);
    format!("{}{}{}", &text[..head_end], TRUNCATION_MARKER, &text[tail_start..])
}

/// Largest char boundary at or below `index`, clamped to the text
pub(crate) fn floor_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or above `index`, clamped to the text
pub(crate) fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: the context never exceeds its budget
        #[test]
        fn test_context_within_budget(
            text in "(?:[a-zA-Z ]{0,80}\n|1\\. Eligibility\n|2\\. EMD details\n|Important Dates\n){0,200}",
            budget in 20u64..800
        ) {
            let context = build_context(&text, budget);
            prop_assert!(estimate_tokens(&context) <= budget);
        }
    }
}
