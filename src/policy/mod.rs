//! Policy layer: the immutable snapshot every decision is computed from, plus the
//! deterministic stages that read it (state encoding, compliance, action space).

use serde::{Deserialize, Serialize};

use crate::model::{
    AdditionalSignal, Channel, ConcernLevel, Direction, Intent, InteractionStatus, LeadStatus,
    Sentiment, Urgency,
};

pub mod action_space;
pub mod compliance;
pub mod context;
pub mod state;

pub use action_space::filter_actions;
pub use compliance::{compliance_override, ComplianceStop};
pub use context::{aggregate, load_policy_inputs};
pub use state::{context_bucket, encode_state};

/// Everything the policy evaluates for one lead, rebuilt on every decision.
/// Owned values only; stored verbatim with the decision it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyInputs {
    pub lead_status: LeadStatus,
    pub total_interactions: u32,
    pub total_voice_attempts: u32,
    pub total_sms_attempts: u32,
    pub total_email_attempts: u32,

    pub last_interaction_channel: Option<Channel>,
    pub last_interaction_status: Option<InteractionStatus>,
    pub last_interaction_direction: Option<Direction>,
    pub last_detected_intent: Option<Intent>,
    pub last_sentiment: Option<Sentiment>,
    pub hours_since_last_interaction: Option<f64>,

    pub campaign_goal: Option<String>,
    pub preferred_channel: Option<Channel>,
    pub has_phone: bool,
    pub has_email: bool,

    // Enriched signals, accumulated across the lead's artifact history
    pub financial_concern_level: ConcernLevel,
    pub has_unaddressed_objections: bool,
    pub objection_topics: Vec<String>,
    pub has_scheduling_constraints: bool,
    pub has_siblings: bool,
    pub has_pending_decision_makers: bool,
    pub additional_signals: Vec<AdditionalSignal>,

    // Personalization for the brief
    pub first_name: String,
    pub child_name: Option<String>,
    pub sport: Option<String>,
    /// e.g. "in the evening"
    pub response_hint: Option<String>,
}

impl PolicyInputs {
    /// Blank snapshot for a lead in `status`; tests build fixtures from this.
    pub fn for_status(status: LeadStatus) -> Self {
        Self {
            lead_status: status,
            total_interactions: 0,
            total_voice_attempts: 0,
            total_sms_attempts: 0,
            total_email_attempts: 0,
            last_interaction_channel: None,
            last_interaction_status: None,
            last_interaction_direction: None,
            last_detected_intent: None,
            last_sentiment: None,
            hours_since_last_interaction: None,
            campaign_goal: None,
            preferred_channel: None,
            has_phone: false,
            has_email: false,
            financial_concern_level: ConcernLevel::None,
            has_unaddressed_objections: false,
            objection_topics: Vec::new(),
            has_scheduling_constraints: false,
            has_siblings: false,
            has_pending_decision_makers: false,
            additional_signals: Vec::new(),
            first_name: String::new(),
            child_name: None,
            sport: None,
            response_hint: None,
        }
    }

    pub fn has_family_signal(&self) -> bool {
        self.has_pending_decision_makers || self.has_siblings
    }

    pub fn has_urgent_additional_signal(&self) -> bool {
        self.additional_signals
            .iter()
            .any(|s| s.urgency >= Urgency::Moderate)
    }

    pub fn has_contact_method(&self) -> bool {
        self.has_phone || self.has_email
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
