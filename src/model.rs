//! Domain vocabulary shared by every stage of the decisioning core.
//!
//! String vocabularies are closed enums (`as_str` / `parse`, serde `snake_case`).
//! Persisted entities are plain serde structs keyed by uuid v4; the store owns them,
//! the core only ever holds copies for the duration of one decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decision::ActionBrief;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Case-insensitive parse; `None` for anything outside the vocabulary.
            pub fn parse(raw: &str) -> Option<Self> {
                match raw.trim().to_ascii_lowercase().as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Lead lifecycle. Acquisition: new → contacted → interested → trial → enrolled.
    /// Retention: enrolled → active → at_risk → inactive. Terminal: declined, unresponsive.
    LeadStatus {
        New => "new",
        Contacted => "contacted",
        Interested => "interested",
        Trial => "trial",
        Enrolled => "enrolled",
        Active => "active",
        AtRisk => "at_risk",
        Inactive => "inactive",
        Declined => "declined",
        Unresponsive => "unresponsive",
    }
);

impl LeadStatus {
    pub fn is_retention(self) -> bool {
        matches!(
            self,
            LeadStatus::Enrolled | LeadStatus::Active | LeadStatus::AtRisk | LeadStatus::Inactive
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeadStatus::Declined | LeadStatus::Unresponsive)
    }

    /// Position in the acquisition funnel; `None` outside of it.
    pub fn funnel_rank(self) -> Option<usize> {
        match self {
            LeadStatus::New => Some(0),
            LeadStatus::Contacted => Some(1),
            LeadStatus::Interested => Some(2),
            LeadStatus::Trial => Some(3),
            LeadStatus::Enrolled => Some(4),
            _ => None,
        }
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        LeadStatus::New
    }
}

string_enum!(
    /// Second half of the RL state key.
    ContextBucket {
        Unreached => "unreached",
        Negative => "negative",
        SchedulingIntent => "scheduling_intent",
        PositiveEngagement => "positive_engagement",
        FinancialConcern => "financial_concern",
        HasObjections => "has_objections",
        FamilyContext => "family_context",
        Considering => "considering",
        NovelSignal => "novel_signal",
        Neutral => "neutral",
    }
);

string_enum!(
    /// Semantic outreach actions. Declaration order is the catalog order used for
    /// UCB tie-breaking.
    Action {
        WarmFollowUp => "warm_follow_up",
        SchedulingPush => "scheduling_push",
        ScholarshipOutreach => "scholarship_outreach",
        InfoSend => "info_send",
        GentleNudge => "gentle_nudge",
        ObjectionAddress => "objection_address",
        WelcomeOnboard => "welcome_onboard",
        RetentionCheckIn => "retention_check_in",
        FamilyEngage => "family_engage",
        ChannelSwitch => "channel_switch",
        Wait => "wait",
        Stop => "stop",
    }
);

impl Action {
    pub const CATALOG: &'static [Action] = Action::ALL;

    /// Actions that never produce outreach.
    pub fn is_passive(self) -> bool {
        matches!(self, Action::Wait | Action::Stop)
    }
}

string_enum!(
    Channel {
        Voice => "voice",
        Sms => "sms",
        Email => "email",
        None => "none",
    }
);

string_enum!(
    Direction {
        Inbound => "inbound",
        Outbound => "outbound",
    }
);

string_enum!(
    InteractionStatus {
        Completed => "completed",
        NoAnswer => "no_answer",
        Voicemail => "voicemail",
        Failed => "failed",
        OptedOut => "opted_out",
    }
);

impl InteractionStatus {
    pub fn is_unreached(self) -> bool {
        matches!(self, InteractionStatus::NoAnswer | InteractionStatus::Voicemail)
    }
}

string_enum!(
    Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
);

string_enum!(
    Intent {
        Interested => "interested",
        Considering => "considering",
        Objecting => "objecting",
        Scheduling => "scheduling",
        RequestingInfo => "requesting_info",
        Declining => "declining",
        NoResponse => "no_response",
        Unclear => "unclear",
        Attending => "attending",
    }
);

impl Default for Intent {
    fn default() -> Self {
        Intent::Unclear
    }
}

impl Intent {
    pub fn parse_or_unclear(raw: &str) -> Self {
        Intent::parse(raw).unwrap_or(Intent::Unclear)
    }
}

string_enum!(
    Sentiment {
        Positive => "positive",
        Neutral => "neutral",
        Negative => "negative",
    }
);

impl Default for Sentiment {
    fn default() -> Self {
        Sentiment::Neutral
    }
}

impl Sentiment {
    pub fn parse_or_neutral(raw: &str) -> Self {
        Sentiment::parse(raw).unwrap_or(Sentiment::Neutral)
    }
}

string_enum!(
    /// Ordinal: none < low < moderate < high.
    ConcernLevel {
        None => "none",
        Low => "low",
        Moderate => "moderate",
        High => "high",
    }
);

impl ConcernLevel {
    pub fn is_elevated(self) -> bool {
        self >= ConcernLevel::Moderate
    }
}

impl Default for ConcernLevel {
    fn default() -> Self {
        ConcernLevel::None
    }
}

string_enum!(
    /// Ordinal: low < moderate < high.
    Urgency {
        Low => "low",
        Moderate => "moderate",
        High => "high",
    }
);

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Low
    }
}

string_enum!(
    Severity {
        Low => "low",
        Moderate => "moderate",
        High => "high",
    }
);

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

string_enum!(
    DecisionStatus {
        Pending => "pending",
        Superseded => "superseded",
    }
);

string_enum!(
    ScheduledStatus {
        Pending => "pending",
        Cancelled => "cancelled",
        Completed => "completed",
    }
);

string_enum!(
    EventKind {
        InteractionCompleted => "interaction_completed",
        ContextEnriched => "context_enriched",
        StatusChanged => "status_changed",
        NbaProduced => "nba_produced",
    }
);

string_enum!(
    ArtifactKind {
        Summary => "summary",
        ExtractedFacts => "extracted_facts",
        DetectedIntent => "detected_intent",
        OpenQuestions => "open_questions",
        FinancialSignals => "financial_signals",
        SchedulingConstraints => "scheduling_constraints",
        FamilyContext => "family_context",
        Objections => "objections",
        AdditionalSignals => "additional_signals",
    }
);

// ---------------------------------------------------------------------------
// Enriched signal payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSignals {
    #[serde(default)]
    pub concern_level: ConcernLevel,
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConstraints {
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub preferred_times: Vec<String>,
}

impl SchedulingConstraints {
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.preferred_times.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyContext {
    #[serde(default)]
    pub siblings: Vec<String>,
    #[serde(default)]
    pub decision_makers: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl FamilyContext {
    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty() && self.decision_makers.is_empty() && self.notes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objection {
    pub topic: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub severity: Severity,
}

/// Open-ended signal with no fixed schema beyond its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalSignal {
    pub label: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl AdditionalSignal {
    pub fn new(label: impl Into<String>, urgency: Urgency) -> Self {
        Self {
            label: label.into(),
            urgency,
            suggestion: None,
        }
    }

    pub fn suggesting(mut self, text: impl Into<String>) -> Self {
        self.suggestion = Some(text.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Persisted entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub child_name: Option<String>,
    pub child_age: Option<u32>,
    pub sport: Option<String>,
    pub academy_name: Option<String>,
    pub campaign_goal: Option<String>,
    pub status: LeadStatus,
    pub preferred_channel: Option<Channel>,
    pub total_interactions: u32,
    pub total_voice_attempts: u32,
    pub total_sms_attempts: u32,
    pub total_email_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn has_phone(&self) -> bool {
        non_blank(self.phone.as_deref())
    }

    pub fn has_email(&self) -> bool {
        non_blank(self.email.as_deref())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// "Maya (age 9)" style description used in extraction prompts.
    pub fn child_info(&self) -> String {
        match (&self.child_name, self.child_age) {
            (Some(name), Some(age)) => format!("{name} (age {age})"),
            (Some(name), None) => name.clone(),
            (None, Some(age)) => format!("child age {age}"),
            (None, None) => String::new(),
        }
    }
}

fn non_blank(v: Option<&str>) -> bool {
    v.is_some_and(|s| !s.trim().is_empty())
}

/// Inbound payload for creating a lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
    #[serde(default)]
    pub child_age: Option<u32>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub academy_name: Option<String>,
    #[serde(default)]
    pub campaign_goal: Option<String>,
    #[serde(default)]
    pub preferred_channel: Option<Channel>,
    #[serde(default)]
    pub status: Option<LeadStatus>,
}

impl NewLead {
    pub fn named(first_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            ..Self::default()
        }
    }

    pub fn into_lead(self, now: DateTime<Utc>) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            email: self.email,
            child_name: self.child_name,
            child_age: self.child_age,
            sport: self.sport,
            academy_name: self.academy_name,
            campaign_goal: self.campaign_goal,
            status: self.status.unwrap_or_default(),
            preferred_channel: self.preferred_channel,
            total_interactions: 0,
            total_voice_attempts: 0,
            total_sms_attempts: 0,
            total_email_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub channel: Channel,
    pub direction: Direction,
    pub status: InteractionStatus,
    pub transcript: Option<String>,
    pub duration_seconds: Option<u32>,
    // LLM-derived
    pub summary: Option<String>,
    pub extracted_facts: Vec<String>,
    pub detected_intent: Option<Intent>,
    pub sentiment: Option<Sentiment>,
    pub open_questions: Vec<String>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Inbound payload describing a completed interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInteraction {
    pub channel: Channel,
    pub direction: Direction,
    pub status: InteractionStatus,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// Defaults to the processing time.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewInteraction {
    pub fn new(channel: Channel, direction: Direction, status: InteractionStatus) -> Self {
        Self {
            channel,
            direction,
            status,
            transcript: None,
            duration_seconds: None,
            occurred_at: None,
        }
    }

    pub fn transcript(mut self, text: impl Into<String>) -> Self {
        self.transcript = Some(text.into());
        self
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    pub fn into_interaction(self, lead_id: Uuid, now: DateTime<Utc>) -> Interaction {
        Interaction {
            id: Uuid::new_v4(),
            lead_id,
            channel: self.channel,
            direction: self.direction,
            status: self.status,
            transcript: self.transcript,
            duration_seconds: self.duration_seconds,
            summary: None,
            extracted_facts: Vec::new(),
            detected_intent: None,
            sentiment: None,
            open_questions: Vec::new(),
            processed: false,
            processed_at: None,
            created_at: self.occurred_at.unwrap_or(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ArtifactPayload {
    Summary(String),
    ExtractedFacts(Vec<String>),
    DetectedIntent(Intent),
    OpenQuestions(Vec<String>),
    FinancialSignals(FinancialSignals),
    SchedulingConstraints(SchedulingConstraints),
    FamilyContext(FamilyContext),
    Objections(Vec<Objection>),
    AdditionalSignals(Vec<AdditionalSignal>),
}

impl ArtifactPayload {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactPayload::Summary(_) => ArtifactKind::Summary,
            ArtifactPayload::ExtractedFacts(_) => ArtifactKind::ExtractedFacts,
            ArtifactPayload::DetectedIntent(_) => ArtifactKind::DetectedIntent,
            ArtifactPayload::OpenQuestions(_) => ArtifactKind::OpenQuestions,
            ArtifactPayload::FinancialSignals(_) => ArtifactKind::FinancialSignals,
            ArtifactPayload::SchedulingConstraints(_) => ArtifactKind::SchedulingConstraints,
            ArtifactPayload::FamilyContext(_) => ArtifactKind::FamilyContext,
            ArtifactPayload::Objections(_) => ArtifactKind::Objections,
            ArtifactPayload::AdditionalSignals(_) => ArtifactKind::AdditionalSignals,
        }
    }
}

/// Versioned per (lead, kind): only the newest one is `is_current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextArtifact {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub interaction_id: Option<Uuid>,
    pub payload: ArtifactPayload,
    pub version: u32,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

impl ContextArtifact {
    pub fn kind(&self) -> ArtifactKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NbaDecision {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub interaction_id: Option<Uuid>,
    pub action: Action,
    pub channel: Channel,
    pub priority: Priority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub reasoning: String,
    pub brief: ActionBrief,
    /// Snapshot of the policy inputs the decision was computed from.
    pub policy_inputs: serde_json::Value,
    /// RL state the action was selected in; `None` when the RL path was bypassed.
    pub rl_state: Option<String>,
    pub is_current: bool,
    pub status: DecisionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub decision_id: Uuid,
    pub action: Action,
    pub channel: Channel,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub state: String,
    pub action: Action,
    pub value: f64,
    pub visit_count: u32,
    pub total_reward: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl QEntry {
    /// Zero prior for a (state, action) pair never seen before.
    pub fn empty(state: &str, action: Action) -> Self {
        Self {
            state: state.to_string(),
            action,
            value: 0.0,
            visit_count: 0,
            total_reward: 0.0,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub decision_id: Uuid,
    pub state_before: String,
    pub action_taken: Action,
    pub state_after: String,
    pub reward: f64,
    pub q_before: f64,
    pub q_after: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub direction: Direction,
    pub body: String,
    pub sender: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_urgent: bool,
    pub flushed: bool,
    /// Display record created on arrival.
    pub interaction_id: Option<Uuid>,
}

/// Append-only audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub kind: EventKind,
    pub source: String,
    pub source_id: Option<String>,
    pub payload: serde_json::Value,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn system(
        lead_id: Uuid,
        kind: EventKind,
        source_id: impl ToString,
        payload: serde_json::Value,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            kind,
            source: "system".to_string(),
            source_id: Some(source_id.to_string()),
            payload,
            description: description.into(),
            created_at: now,
        }
    }
}
