//! OpenAI provider (Chat Completions API). One call per interaction, all signal
//! dimensions in a single prompt.

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use crate::config::ExtractorConfig;
use crate::model::{
    AdditionalSignal, ConcernLevel, FamilyContext, FinancialSignals, Intent, Objection,
    SchedulingConstraints, Sentiment, Severity, Urgency,
};

use super::{ExtractionRecord, ExtractionRequest, SignalExtractor};

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const PROMPT: &str = r#"You are an AI assistant for a sports academy outreach system.
Analyze the following interaction transcript and extract structured information.

CONTEXT:
- Lead: {lead_name} (parent/guardian)
- Child: {child_info}
- Sport: {sport}
- Academy: {academy_name}
- Campaign Goal: {campaign_goal}
- Channel: {channel} ({direction})
- Interaction Status: {status}

TRANSCRIPT:
{transcript}

Respond with ONLY valid JSON with these keys:
summary (2-3 sentences), facts (list), intent (one of: interested, considering, objecting,
scheduling, requesting_info, declining, no_response, unclear), sentiment (positive, neutral,
negative), open_questions (list), financial_signals {concern_level: none|low|moderate|high,
mentions: list}, scheduling_constraints {constraints: list, preferred_times: list},
family_context {siblings: list, decision_makers: list, notes: list},
objections (list of {topic, detail, severity: low|moderate|high}),
additional_signals (list of {label, urgency: low|moderate|high, suggestion}).

Only extract what is actually in the transcript. Leave dimensions empty when not discussed."#;

pub struct OpenAiExtractor {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiExtractor {
    pub fn new(api_key: String, cfg: &ExtractorConfig) -> Self {
        // Builder only fails on TLS backend init; fall back to the default client.
        let http = reqwest::Client::builder()
            .user_agent("lead-nba-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
        }
    }
}

pub(crate) fn render_prompt(r: &ExtractionRequest) -> String {
    let or = |s: &str, dflt: &str| {
        if s.trim().is_empty() {
            dflt.to_string()
        } else {
            s.to_string()
        }
    };
    PROMPT
        .replace("{lead_name}", &r.lead_name)
        .replace("{child_info}", &or(&r.child_info, "Unknown"))
        .replace("{sport}", &or(&r.sport, "Unknown"))
        .replace("{academy_name}", &or(&r.academy_name, "Sports Academy"))
        .replace("{campaign_goal}", &or(&r.campaign_goal, "General outreach"))
        .replace("{channel}", r.channel_str())
        .replace("{direction}", r.direction_str())
        .replace("{status}", r.status_str())
        .replace("{transcript}", r.transcript.as_deref().unwrap_or_default())
}

/// Model output is untrusted: enum fields arrive as free strings.
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    facts: Vec<String>,
    #[serde(default)]
    intent: String,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    open_questions: Vec<String>,
    #[serde(default)]
    financial_signals: Option<RawFinancial>,
    #[serde(default)]
    scheduling_constraints: Option<SchedulingConstraints>,
    #[serde(default)]
    family_context: Option<FamilyContext>,
    #[serde(default)]
    objections: Vec<RawObjection>,
    #[serde(default)]
    additional_signals: Vec<RawSignal>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFinancial {
    #[serde(default)]
    concern_level: String,
    #[serde(default)]
    mentions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawObjection {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    severity: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawSignal {
    #[serde(default)]
    label: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    suggestion: Option<String>,
}

impl From<RawRecord> for ExtractionRecord {
    fn from(raw: RawRecord) -> Self {
        let financial_signals = raw
            .financial_signals
            .map(|f| FinancialSignals {
                concern_level: ConcernLevel::parse(&f.concern_level).unwrap_or_default(),
                mentions: f.mentions,
            })
            .unwrap_or_default();
        let objections = raw
            .objections
            .into_iter()
            .map(|o| Objection {
                topic: if o.topic.trim().is_empty() {
                    "unknown".to_string()
                } else {
                    o.topic
                },
                detail: o.detail,
                severity: Severity::parse(&o.severity).unwrap_or_default(),
            })
            .collect();
        let additional_signals = raw
            .additional_signals
            .into_iter()
            .filter(|s| !s.label.trim().is_empty())
            .map(|s| AdditionalSignal {
                label: s.label,
                urgency: Urgency::parse(&s.urgency).unwrap_or_default(),
                suggestion: s.suggestion.filter(|t| !t.trim().is_empty()),
            })
            .collect();

        ExtractionRecord {
            summary: raw.summary,
            facts: raw.facts,
            intent: Intent::parse_or_unclear(&raw.intent),
            sentiment: Sentiment::parse_or_neutral(&raw.sentiment),
            open_questions: raw.open_questions,
            financial_signals,
            scheduling_constraints: raw.scheduling_constraints.unwrap_or_default(),
            family_context: raw.family_context.unwrap_or_default(),
            objections,
            additional_signals,
        }
    }
}

/// Strips a surrounding markdown code fence if the model added one.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = trimmed.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

pub(crate) fn parse_completion(content: &str) -> anyhow::Result<ExtractionRecord> {
    let raw: RawRecord = serde_json::from_str(strip_code_fence(content))
        .context("extraction payload is not valid JSON")?;
    Ok(raw.into())
}

#[async_trait::async_trait]
impl SignalExtractor for OpenAiExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> anyhow::Result<ExtractionRecord> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let prompt = render_prompt(request);
        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.1,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .http
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;

        if !resp.status().is_success() {
            bail!("openai returned {}", resp.status());
        }
        let body: Resp = resp.json().await.context("openai response body")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("openai returned no choices"))?;
        parse_completion(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
