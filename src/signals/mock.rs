//! Deterministic keyword extractor for development and tests (no API key needed).

use crate::model::{
    AdditionalSignal, ConcernLevel, FamilyContext, FinancialSignals, Intent,
    InteractionStatus, Objection, SchedulingConstraints, Sentiment, Severity, Urgency,
};

use super::{title_case, ExtractionRecord, ExtractionRequest, SignalExtractor};

pub struct MockExtractor;

#[async_trait::async_trait]
impl SignalExtractor for MockExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> anyhow::Result<ExtractionRecord> {
        Ok(mock_extract(request))
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

fn any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn objection(topic: &str, detail: &str, severity: Severity) -> Objection {
    Objection {
        topic: topic.to_string(),
        detail: detail.to_string(),
        severity,
    }
}

/// Pure heuristic pass over the lowercased transcript.
pub fn mock_extract(request: &ExtractionRequest) -> ExtractionRecord {
    let raw = request.transcript.as_deref().unwrap_or_default();
    let text = raw.to_lowercase();

    // ---- intent & sentiment ----
    let refusal = any(&text, &["no thanks", "not interested"]);
    let (intent, sentiment) = if !refusal
        && any(&text, &["interested", "sounds great", "love to", "sign up", "excited"])
    {
        (Intent::Interested, Sentiment::Positive)
    } else if any(&text, &["schedule", "visit", "tour", "come by", "appointment"]) {
        (Intent::Scheduling, Sentiment::Positive)
    } else if any(&text, &["think about", "consider", "not sure", "maybe", "let me"]) {
        (Intent::Considering, Sentiment::Neutral)
    } else if refusal || any(&text, &["don't", "can't afford", "too expensive"]) {
        (Intent::Declining, Sentiment::Negative)
    } else if any(&text, &["how much", "what time", "where", "tell me more", "information"]) {
        (Intent::RequestingInfo, Sentiment::Neutral)
    } else if request.status == Some(InteractionStatus::Voicemail) {
        (Intent::NoResponse, Sentiment::Neutral)
    } else {
        (Intent::Unclear, Sentiment::Neutral)
    };

    // ---- facts ----
    let mut facts = Vec::new();
    if any(&text, &["soccer", "football"]) {
        facts.push("Child is involved in soccer/football");
    }
    if text.contains("basketball") {
        facts.push("Child is involved in basketball");
    }
    if text.contains("swimming") {
        facts.push("Child does swimming");
    }
    if text.contains("tennis") {
        facts.push("Child plays tennis");
    }
    if text.contains("weekend") {
        facts.push("Weekends are relevant to scheduling");
    }
    if any(&text, &["after school", "afternoon"]) {
        facts.push("After-school availability mentioned");
    }
    if any(&text, &["busy", "schedule conflict"]) {
        facts.push("Has scheduling constraints");
    }
    if any(&text, &["scholarship", "financial"]) {
        facts.push("Financial considerations are a factor");
    }
    let facts: Vec<String> = facts.into_iter().map(str::to_string).collect();

    // ---- financial ----
    let mut objections = Vec::new();
    let financial_signals = if any(&text, &["can't afford", "too expensive", "budget", "costly"]) {
        objections.push(objection(
            "cost",
            "Lead indicated the program may be too expensive",
            Severity::High,
        ));
        FinancialSignals {
            concern_level: ConcernLevel::High,
            mentions: vec!["Lead expressed affordability concerns".into()],
        }
    } else if any(&text, &["scholarship", "financial aid", "discount", "payment plan"]) {
        FinancialSignals {
            concern_level: ConcernLevel::Moderate,
            mentions: vec!["Lead asked about financial assistance options".into()],
        }
    } else if any(&text, &["how much", "cost", "price", "fee"]) {
        FinancialSignals {
            concern_level: ConcernLevel::Low,
            mentions: vec!["Lead asked about pricing".into()],
        }
    } else {
        FinancialSignals::default()
    };

    // ---- scheduling ----
    let mut scheduling_constraints = SchedulingConstraints::default();
    if any(&text, &["busy weekends", "weekends are", "saturday", "sunday"]) {
        scheduling_constraints
            .constraints
            .push("Weekend availability limited".into());
    }
    if any(&text, &["after school", "afternoon", "3pm", "4pm"]) {
        scheduling_constraints
            .preferred_times
            .push("Weekday afternoons".into());
    }
    if any(&text, &["traveling", "vacation", "out of town", "away"]) {
        scheduling_constraints
            .constraints
            .push("Has upcoming travel/absence".into());
    }
    if any(&text, &["morning", "before school"]) {
        scheduling_constraints.preferred_times.push("Mornings".into());
    }
    if any(&text, &["conflict", "overlap", "same time"]) {
        scheduling_constraints
            .constraints
            .push("Has time conflicts with other activities".into());
    }

    // ---- family ----
    let mut family_context = FamilyContext::default();
    if any(
        &text,
        &["brother", "sister", "sibling", "other child", "younger", "older"],
    ) {
        family_context
            .siblings
            .push("Has sibling(s) who may also be interested".into());
    }
    if any(&text, &["husband", "wife", "spouse", "partner"]) {
        family_context
            .decision_makers
            .push("Spouse/partner is part of the decision".into());
    }
    if text.contains("single") && text.contains("parent") {
        family_context.notes.push("Single parent household".into());
    }
    if any(&text, &["grandparent", "grandmother", "grandfather"]) {
        family_context
            .decision_makers
            .push("Grandparent involved in decision-making".into());
    }
    if any(&text, &["moved", "relocated", "new to the area"]) {
        family_context.notes.push("Family recently relocated".into());
    }

    // ---- objections ----
    if any(&text, &["too far", "distance", "drive", "commute"]) {
        objections.push(objection(
            "distance",
            "Location or commute is a concern",
            Severity::Moderate,
        ));
    }
    if any(&text, &["injury", "hurt", "safety", "dangerous"]) {
        objections.push(objection(
            "safety",
            "Concerned about injury or safety risks",
            Severity::Moderate,
        ));
    }
    if any(&text, &["no time", "too busy", "overcommitted"]) {
        objections.push(objection(
            "time",
            "Family is time-constrained",
            Severity::Moderate,
        ));
    }

    // ---- open-ended signals ----
    let mut additional_signals = Vec::new();
    if any(&text, &["other academy", "another program", "other club"]) {
        additional_signals.push(
            AdditionalSignal::new("competitor_mentioned", Urgency::Moderate).suggesting(
                "Highlight what sets the academy apart from the other program they mentioned",
            ),
        );
    }
    if any(&text, &["this week", "before the season", "tryouts"]) {
        additional_signals.push(
            AdditionalSignal::new("time_sensitive", Urgency::High)
                .suggesting("Acknowledge their timeline and offer the earliest available slot"),
        );
    }

    // ---- open questions ----
    let mut open_questions = Vec::new();
    if raw.contains('?') {
        open_questions.push("Lead asked questions that need follow-up".to_string());
    }
    if intent == Intent::RequestingInfo {
        open_questions
            .push("Lead requested more information — need to provide details".to_string());
    }

    // ---- summary ----
    let channel = request.channel_str();
    let prefix = if channel == "voice" {
        format!("{} {} call", title_case(channel), request.direction_str())
    } else {
        format!("{} {}", channel.to_uppercase(), request.direction_str())
    };
    let mut summary = format!(
        "{prefix} - {}. Lead appears {}.",
        request.status_str(),
        intent.as_str().replace('_', " ")
    );
    if !facts.is_empty() {
        let key: Vec<&str> = facts.iter().take(2).map(String::as_str).collect();
        summary.push_str(&format!(" Key info: {}.", key.join("; ")));
    }

    ExtractionRecord {
        summary,
        facts,
        intent,
        sentiment,
        open_questions,
        financial_signals,
        scheduling_constraints,
        family_context,
        objections,
        additional_signals,
    }
}
