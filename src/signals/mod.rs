//! Enriched-signal extraction: provider abstraction + the degrade-never-fail wrapper
//! the pipeline calls.
//!
//! Providers:
//! * `MockExtractor`: deterministic keyword heuristics (default, no network).
//! * `OpenAiExtractor`: chat-completions call returning the record as JSON.
//! * `DisabledExtractor`: always the minimal record.

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ExtractorConfig;
use crate::model::{
    AdditionalSignal, Channel, Direction, FamilyContext, FinancialSignals, Intent,
    InteractionStatus, Objection, SchedulingConstraints, Sentiment,
};

pub mod mock;
pub mod openai;

pub use mock::MockExtractor;
pub use openai::OpenAiExtractor;

pub const EXTRACTION_FAILED_SUMMARY: &str =
    "[LLM extraction failed — raw transcript available]";

/// Structured signals for one completed interaction. Every field tolerates absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub financial_signals: FinancialSignals,
    #[serde(default)]
    pub scheduling_constraints: SchedulingConstraints,
    #[serde(default)]
    pub family_context: FamilyContext,
    #[serde(default)]
    pub objections: Vec<Objection>,
    #[serde(default)]
    pub additional_signals: Vec<AdditionalSignal>,
}

impl ExtractionRecord {
    /// No enriched signals at all.
    pub fn minimal(summary: impl Into<String>, intent: Intent) -> Self {
        Self {
            summary: summary.into(),
            facts: Vec::new(),
            intent,
            sentiment: Sentiment::Neutral,
            open_questions: Vec::new(),
            financial_signals: FinancialSignals::default(),
            scheduling_constraints: SchedulingConstraints::default(),
            family_context: FamilyContext::default(),
            objections: Vec::new(),
            additional_signals: Vec::new(),
        }
    }

    pub fn failed() -> Self {
        Self::minimal(EXTRACTION_FAILED_SUMMARY, Intent::Unclear)
    }
}

/// Everything a provider may use to interpret a transcript.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    pub transcript: Option<String>,
    pub lead_name: String,
    pub child_info: String,
    pub sport: String,
    pub academy_name: String,
    pub campaign_goal: String,
    pub channel: Option<Channel>,
    pub direction: Option<Direction>,
    pub status: Option<InteractionStatus>,
}

impl ExtractionRequest {
    pub fn channel_str(&self) -> &'static str {
        self.channel.map(|c| c.as_str()).unwrap_or("unknown")
    }
    pub fn direction_str(&self) -> &'static str {
        self.direction.map(|d| d.as_str()).unwrap_or("unknown")
    }
    pub fn status_str(&self) -> &'static str {
        self.status.map(|s| s.as_str()).unwrap_or("unknown")
    }
}

#[async_trait::async_trait]
pub trait SignalExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> anyhow::Result<ExtractionRecord>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynExtractor = Arc<dyn SignalExtractor>;

/// Provider that never calls out.
pub struct DisabledExtractor;

#[async_trait::async_trait]
impl SignalExtractor for DisabledExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> anyhow::Result<ExtractionRecord> {
        Ok(ExtractionRecord::minimal(
            no_content_summary(request),
            Intent::Unclear,
        ))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

fn no_content_summary(request: &ExtractionRequest) -> String {
    format!(
        "{} {} — {}. No conversation content.",
        title_case(request.channel_str()),
        request.direction_str(),
        request.status_str()
    )
}

pub(crate) fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The only extraction entry point used by the pipeline. Never fails:
/// * no transcript, or status no_answer/failed → minimal record, provider not called;
/// * provider error → `ExtractionRecord::failed()` plus a warning and a counter.
pub async fn extract_or_default(
    extractor: &dyn SignalExtractor,
    request: &ExtractionRequest,
) -> ExtractionRecord {
    let has_transcript = request
        .transcript
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    let unreachable = matches!(
        request.status,
        Some(InteractionStatus::NoAnswer) | Some(InteractionStatus::Failed)
    );

    if !has_transcript || unreachable {
        let intent = if request.status == Some(InteractionStatus::NoAnswer) {
            Intent::NoResponse
        } else {
            Intent::Unclear
        };
        return ExtractionRecord::minimal(no_content_summary(request), intent);
    }

    match extractor.extract(request).await {
        Ok(record) => record,
        Err(e) => {
            counter!("signal_extraction_failures_total").increment(1);
            warn!(
                target: "signals",
                provider = extractor.name(),
                error = %e,
                "extraction failed; continuing with minimal record"
            );
            ExtractionRecord::failed()
        }
    }
}

/// Factory: pick the provider named in config.
///
/// `openai` without `OPENAI_API_KEY` falls back to disabled with a warning.
pub fn build_extractor(cfg: &ExtractorConfig) -> DynExtractor {
    match cfg.provider.as_str() {
        "mock" => Arc::new(MockExtractor),
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Arc::new(OpenAiExtractor::new(key, cfg)),
            _ => {
                warn!(target: "signals", "OPENAI_API_KEY missing; extractor disabled");
                Arc::new(DisabledExtractor)
            }
        },
        "disabled" => Arc::new(DisabledExtractor),
        other => {
            warn!(target: "signals", provider = other, "unknown extractor; using mock");
            Arc::new(MockExtractor)
        }
    }
}
