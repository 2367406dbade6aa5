//! Targeted recovery of missing checklist fields
//!
//! After the first merge, every field on the portal checklist that is still
//! at the sentinel is a gap. Each gap gets its own recovery query over
//! passages selected from the full unified text, not the reduced context the
//! draft was built from. Attempts per field are bounded; a failed call or a
//! sentinel answer still spends an attempt.
//!
//! The loop is driven by a small state machine:
//!
//! ```text
//! Pending --draft--> Filling --round--> Filling
//!    |                  |
//!    +--(no gaps)--> Resolved <--(no gaps or attempts left)
//! ```

use crate::context::{ceil_boundary, floor_boundary, truncate_middle};
use crate::error::EngineError;
use crate::parser::parse_gap_answer;
use crate::prompt::PromptBuilder;
use regex::RegexBuilder;
use std::collections::BTreeMap;
use tender_domain::tokens::BYTES_PER_TOKEN;
use tender_domain::{
    field_spec, FieldSpec, FieldValue, InferenceProvider, Portal, Stage, TenderSummary,
};
use tender_gatekeeper::Gatekeeper;
use tender_llm::{CallUsage, InferenceCall, InferenceGateway};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PASSAGE_BEFORE: usize = 600;
const PASSAGE_AFTER: usize = 1_200;
const PASSAGE_SEPARATOR: &str = "\n...\n";

/// Checklist fields still at the sentinel, in checklist order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapReport {
    /// Missing field paths
    pub fields: Vec<&'static str>,
}

impl GapReport {
    /// Compute the gaps of a merged record for a portal
    pub fn compute(summary: &TenderSummary, portal: Portal) -> Self {
        let fields = portal
            .required_fields()
            .into_iter()
            .filter(|path| !summary.get(path).is_some_and(FieldValue::is_mentioned))
            .collect();
        Self { fields }
    }

    /// True when nothing is missing
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Recovery attempts spent per field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptLedger {
    attempts: BTreeMap<&'static str, u32>,
}

impl AttemptLedger {
    /// Attempts spent on a field
    pub fn spent(&self, path: &str) -> u32 {
        self.attempts.get(path).copied().unwrap_or(0)
    }

    /// Record one attempt
    pub fn record(&mut self, path: &'static str) {
        *self.attempts.entry(path).or_insert(0) += 1;
    }

    /// Total attempts across all fields
    pub fn total(&self) -> u32 {
        self.attempts.values().sum()
    }

    /// Per-field attempts
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        self.attempts.iter().map(|(path, n)| (*path, *n))
    }
}

/// Gap-filling lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapState {
    /// Waiting for the first merged draft
    Pending,
    /// Recovery rounds in progress
    Filling,
    /// No gaps left, or no attempts left for the remaining ones
    Resolved,
}

impl GapState {
    /// Transition on receiving the first merged draft
    pub fn on_draft(self, report: &GapReport) -> GapState {
        match self {
            GapState::Pending if report.is_empty() => GapState::Resolved,
            GapState::Pending => GapState::Filling,
            other => other,
        }
    }

    /// Transition after a recovery round
    pub fn after_round(
        self,
        report: &GapReport,
        ledger: &AttemptLedger,
        max_attempts: u32,
    ) -> GapState {
        match self {
            GapState::Filling if fillable(report, ledger, max_attempts).is_empty() => {
                GapState::Resolved
            }
            other => other,
        }
    }
}

/// Gaps that still have attempts left
pub fn fillable(
    report: &GapReport,
    ledger: &AttemptLedger,
    max_attempts: u32,
) -> Vec<&'static str> {
    report
        .fields
        .iter()
        .copied()
        .filter(|path| ledger.spent(path) < max_attempts)
        .collect()
}

/// Result of the gap-filling stage
#[derive(Debug, Clone, Default)]
pub struct GapOutcome {
    /// Values recovered, keyed by path
    pub recovered: BTreeMap<&'static str, FieldValue>,
    /// Fields still missing when filling stopped
    pub unresolved: Vec<&'static str>,
    /// Attempts spent per field
    pub ledger: AttemptLedger,
    /// Budget charged by recovery calls
    pub usage: CallUsage,
}

/// Settings for the gap filler
#[derive(Debug, Clone, Copy)]
pub struct GapFillSettings {
    /// Attempts allowed per field
    pub max_attempts: u32,
    /// Token limit of the passages sent with one query
    pub context_tokens: u64,
    /// Tokens reserved for the answer
    pub response_reserve: u64,
}

/// Runs recovery rounds until the gap state resolves
pub struct GapFiller<'a, P> {
    gateway: &'a InferenceGateway<P>,
    prompts: &'a PromptBuilder<'a>,
    gatekeeper: &'a Gatekeeper,
    settings: GapFillSettings,
}

impl<'a, P: InferenceProvider> GapFiller<'a, P> {
    /// Create a gap filler
    pub fn new(
        gateway: &'a InferenceGateway<P>,
        prompts: &'a PromptBuilder<'a>,
        gatekeeper: &'a Gatekeeper,
        settings: GapFillSettings,
    ) -> Self {
        Self {
            gateway,
            prompts,
            gatekeeper,
            settings,
        }
    }

    /// Fill gaps in `merged` using passages from `full_text`
    pub async fn run(
        &self,
        merged: &TenderSummary,
        portal: Portal,
        full_text: &str,
        cancel: &CancellationToken,
    ) -> Result<GapOutcome, EngineError> {
        let mut current = merged.clone();
        let mut outcome = GapOutcome::default();
        let mut report = GapReport::compute(&current, portal);
        let mut state = GapState::Pending.on_draft(&report);

        if state == GapState::Filling && full_text.trim().is_empty() {
            info!("No source text to search; {} gaps left unresolved", report.fields.len());
            state = GapState::Resolved;
        }
        if state == GapState::Filling {
            info!("Gap filling {} missing {} fields", report.fields.len(), portal);
        }

        while state == GapState::Filling {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled { stage: Stage::GapFill });
            }

            for path in fillable(&report, &outcome.ledger, self.settings.max_attempts) {
                let Some(spec) = field_spec(path) else {
                    continue;
                };
                outcome.ledger.record(path);
                if let Some(value) = self.query(spec, full_text, &mut outcome.usage).await {
                    debug!("Recovered {}", path);
                    current.set(path, value.clone())?;
                    outcome.recovered.insert(path, value);
                }
            }

            report = GapReport::compute(&current, portal);
            state = state.after_round(&report, &outcome.ledger, self.settings.max_attempts);
        }

        outcome.unresolved = report.fields;
        if !outcome.unresolved.is_empty() {
            warn!(
                "{} fields unresolved after {} recovery attempts: {:?}",
                outcome.unresolved.len(),
                outcome.ledger.total(),
                outcome.unresolved
            );
        }
        Ok(outcome)
    }

    async fn query(
        &self,
        spec: &'static FieldSpec,
        full_text: &str,
        usage: &mut CallUsage,
    ) -> Option<FieldValue> {
        let passages = select_passages(full_text, spec, self.settings.context_tokens);
        let call = InferenceCall::new(Stage::GapFill, self.prompts.field_recovery(spec, passages))
            .with_response_reserve(self.settings.response_reserve);

        match self.gateway.submit(call).await {
            Ok(completion) => {
                *usage += completion.usage;
                parse_gap_answer(&completion.text, spec, self.gatekeeper)
            }
            Err(e) => {
                *usage += e.usage();
                warn!("Recovery query for {} failed: {}", spec.path, e);
                None
            }
        }
    }
}

/// Windows of the full text around mentions of a field, within a token limit
///
/// Falls back to the head and tail of the text when no search term occurs.
pub fn select_passages(text: &str, spec: &FieldSpec, max_tokens: u64) -> String {
    let max_bytes = usize::try_from(max_tokens)
        .unwrap_or(usize::MAX / BYTES_PER_TOKEN)
        .saturating_mul(BYTES_PER_TOKEN);
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let pattern = spec
        .search_terms()
        .iter()
        .map(|term| {
            term.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"[\s_]+")
        })
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\b(?:{})\b", pattern);
    let windows = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => merge_windows(
            re.find_iter(text)
                .map(|m| {
                    (
                        floor_boundary(text, m.start().saturating_sub(PASSAGE_BEFORE)),
                        ceil_boundary(text, m.end() + PASSAGE_AFTER),
                    )
                })
                .collect(),
        ),
        Err(e) => {
            warn!("Search pattern for {} did not compile: {}", spec.path, e);
            Vec::new()
        }
    };

    if windows.is_empty() {
        return truncate_middle(text, max_tokens);
    }

    let mut out = String::new();
    for (start, end) in windows {
        let sep = if out.is_empty() { "" } else { PASSAGE_SEPARATOR };
        let room = max_bytes.saturating_sub(out.len() + sep.len());
        if room == 0 {
            break;
        }
        let end = floor_boundary(text, end.min(start + room));
        if end <= start {
            break;
        }
        out.push_str(sep);
        out.push_str(&text[start..end]);
    }
    out
}

fn merge_windows(mut windows: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    windows.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in windows {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tender_domain::{estimate_tokens, GroundTruthFacts, ProviderError};
    use tender_llm::{BudgetConfig, MockProvider, RateBudget, RetryPolicy};

    fn gateway(provider: MockProvider) -> InferenceGateway<MockProvider> {
        let budget = Arc::new(RateBudget::new(BudgetConfig::default()));
        InferenceGateway::new(provider, budget, RetryPolicy::none())
    }

    fn settings(max_attempts: u32) -> GapFillSettings {
        GapFillSettings {
            max_attempts,
            context_tokens: 1_000,
            response_reserve: 100,
        }
    }

    fn complete_generic_except(missing: &[&str]) -> TenderSummary {
        let mut summary = TenderSummary::blank();
        for path in Portal::Generic.required_fields() {
            if !missing.contains(&path) {
                summary.set(path, FieldValue::text("known")).unwrap();
            }
        }
        summary
    }

    #[test]
    fn test_state_transitions() {
        let empty = GapReport::default();
        let gaps = GapReport {
            fields: vec!["financial_requirements.emd"],
        };
        let mut ledger = AttemptLedger::default();

        assert_eq!(GapState::Pending.on_draft(&empty), GapState::Resolved);
        assert_eq!(GapState::Pending.on_draft(&gaps), GapState::Filling);
        assert_eq!(GapState::Filling.after_round(&gaps, &ledger, 1), GapState::Filling);

        ledger.record("financial_requirements.emd");
        assert_eq!(GapState::Filling.after_round(&gaps, &ledger, 1), GapState::Resolved);
        assert_eq!(GapState::Filling.after_round(&gaps, &ledger, 2), GapState::Filling);
        assert_eq!(GapState::Filling.after_round(&empty, &ledger, 2), GapState::Resolved);
        assert_eq!(GapState::Resolved.on_draft(&gaps), GapState::Resolved);
    }

    #[test]
    fn test_report_follows_portal_checklist() {
        let summary = TenderSummary::blank();
        let generic = GapReport::compute(&summary, Portal::Generic);
        let gem = GapReport::compute(&summary, Portal::Gem);
        assert_eq!(generic.fields, Portal::Generic.required_fields());
        assert!(gem.fields.len() > generic.fields.len());
        assert!(!generic.fields.contains(&"scope_of_work.location"));
        for path in [
            "key_dates.bid_validity",
            "financial_requirements.performance_security",
            "financial_requirements.payment_terms",
            "eligibility_snapshot.who_can_bid",
        ] {
            assert!(generic.fields.contains(&path), "{} not reported", path);
        }
        assert!(gem.fields.contains(&"additional_important_information.special_conditions"));
        assert!(gem.fields.contains(&"tender_meta.portal"));

        let mut named = TenderSummary::blank();
        named.set("tender_meta.portal", FieldValue::text("GeM")).unwrap();
        assert!(!GapReport::compute(&named, Portal::Gem).fields.contains(&"tender_meta.portal"));
    }

    #[tokio::test]
    async fn test_recovers_missing_field() {
        let provider = MockProvider::new("Not mentioned");
        provider.add_response(
            "field=financial_requirements.emd",
            r#"{"financial_requirements.emd": "₹25,000"}"#,
        );
        let gateway = gateway(provider);
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);
        let gatekeeper = Gatekeeper::default_config();
        let filler = GapFiller::new(&gateway, &prompts, &gatekeeper, settings(1));

        let merged = complete_generic_except(&["financial_requirements.emd"]);
        let outcome = filler
            .run(&merged, Portal::Generic, "EMD is 25,000", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.recovered.get("financial_requirements.emd"),
            Some(&FieldValue::text("₹25,000"))
        );
        assert!(outcome.unresolved.is_empty());
        assert_eq!(outcome.ledger.spent("financial_requirements.emd"), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded_per_field() {
        let provider = MockProvider::new("Not mentioned");
        let gateway = gateway(provider.clone());
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);
        let gatekeeper = Gatekeeper::default_config();
        let filler = GapFiller::new(&gateway, &prompts, &gatekeeper, settings(2));

        let merged = complete_generic_except(&[
            "financial_requirements.emd",
            "eligibility_snapshot.turnover_requirement",
        ]);
        let outcome = filler
            .run(&merged, Portal::Generic, "nothing useful", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 4);
        assert_eq!(outcome.unresolved.len(), 2);
        assert_eq!(outcome.ledger.total(), 4);
        assert!(outcome.recovered.is_empty());
    }

    #[tokio::test]
    async fn test_failed_query_spends_attempt() {
        let provider = MockProvider::new("Not mentioned");
        provider.add_error("field=financial_requirements.emd", ProviderError::Fatal("down".into()));
        let gateway = gateway(provider.clone());
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);
        let gatekeeper = Gatekeeper::default_config();
        let filler = GapFiller::new(&gateway, &prompts, &gatekeeper, settings(1));

        let merged = complete_generic_except(&["financial_requirements.emd"]);
        let outcome = filler
            .run(&merged, Portal::Generic, "text", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.unresolved, vec!["financial_requirements.emd"]);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_gaps_means_no_calls() {
        let provider = MockProvider::new("Not mentioned");
        let gateway = gateway(provider.clone());
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);
        let gatekeeper = Gatekeeper::default_config();
        let filler = GapFiller::new(&gateway, &prompts, &gatekeeper, settings(1));

        let outcome = filler
            .run(&complete_generic_except(&[]), Portal::Generic, "text", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 0);
        assert!(outcome.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_skips_recovery() {
        let provider = MockProvider::new("Not mentioned");
        let gateway = gateway(provider.clone());
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);
        let gatekeeper = Gatekeeper::default_config();
        let filler = GapFiller::new(&gateway, &prompts, &gatekeeper, settings(3));

        let outcome = filler
            .run(&TenderSummary::blank(), Portal::Generic, "  \n", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 0);
        assert_eq!(outcome.unresolved, Portal::Generic.required_fields());
        assert_eq!(outcome.ledger.total(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_round() {
        let provider = MockProvider::new("Not mentioned");
        let gateway = gateway(provider.clone());
        let facts = GroundTruthFacts::empty();
        let prompts = PromptBuilder::new(Portal::Generic, &facts);
        let gatekeeper = Gatekeeper::default_config();
        let filler = GapFiller::new(&gateway, &prompts, &gatekeeper, settings(1));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = filler
            .run(&TenderSummary::blank(), Portal::Generic, "text", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled { stage: Stage::GapFill });
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_passages_center_on_mentions() {
        let filler = "unrelated clause text. ".repeat(2_000);
        let text = format!("{filler}The Earnest Money Deposit shall be Rs 50,000.{filler}");
        let spec = field_spec("financial_requirements.emd").unwrap();
        let passages = select_passages(&text, spec, 500);
        assert!(passages.contains("Earnest Money Deposit shall be Rs 50,000"));
        assert!(estimate_tokens(&passages) <= 500);
    }

    #[test]
    fn test_passages_match_labels_with_spaces() {
        let filler = "x ".repeat(10_000);
        let text = format!("{filler}Turnover requirement: 5 Crore{filler}");
        let spec = field_spec("eligibility_snapshot.turnover_requirement").unwrap();
        assert!(select_passages(&text, spec, 300).contains("5 Crore"));
    }

    #[test]
    fn test_passages_without_mentions_fall_back() {
        let text = "lorem ipsum ".repeat(5_000);
        let spec = field_spec("financial_requirements.emd").unwrap();
        let passages = select_passages(&text, spec, 200);
        assert!(estimate_tokens(&passages) <= 200);
        assert!(passages.contains(crate::context::TRUNCATION_MARKER));
    }

    #[test]
    fn test_short_text_is_sent_whole() {
        let spec = field_spec("financial_requirements.emd").unwrap();
        assert_eq!(select_passages("EMD 5,000", spec, 200), "EMD 5,000");
    }
}
