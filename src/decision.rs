//! Output shapes of the decisioning core.
//!
//! `ActionBrief` is what the engine hands to the outbound side: the semantic action
//! plus channel, timing, tone and talking points, with an audit snapshot attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Action, Channel, ConcernLevel, Intent, LeadStatus, Priority, Sentiment};

/// Tone the outreach should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Enthusiastic,
    Empathetic,
    Informational,
    Gentle,
    Warm,
    None,
}

/// One talking point. Lower `priority` = more important.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub point: String,
    pub priority: u8,
    /// Signal that caused an enrichment directive to be added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

impl Directive {
    pub fn new(point: impl Into<String>, priority: u8) -> Self {
        Self {
            point: point.into(),
            priority,
            signal: None,
        }
    }

    /// Tag with the originating signal (builder style).
    pub fn signal(mut self, tag: impl Into<String>) -> Self {
        self.signal = Some(tag.into());
        self
    }
}

/// Flat snapshot of the signals that were active when the brief was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    pub lead_status: LeadStatus,
    pub last_intent: Option<Intent>,
    pub last_sentiment: Option<Sentiment>,
    pub financial_concern_level: ConcernLevel,
    pub has_objections: bool,
    pub objection_topics: Vec<String>,
    pub has_siblings: bool,
    pub has_pending_decision_makers: bool,
    pub has_scheduling_constraints: bool,
    pub additional_signals_count: usize,
    pub total_interactions: u32,
}

/// Fully rendered recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBrief {
    pub semantic_action: Action,
    pub channel: Channel,
    pub priority: Priority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub timing_rationale: String,
    /// Sorted by priority ascending.
    #[serde(default)]
    pub content_directives: Vec<Directive>,
    pub overall_tone: Tone,
    #[serde(default)]
    pub info_to_prepare: Vec<String>,
    #[serde(default)]
    pub things_to_avoid: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_draft: Option<String>,

    // Auditability
    pub state: String,
    pub q_value: f64,
    pub signal_context: SignalContext,
}

impl ActionBrief {
    pub fn is_terminal(&self) -> bool {
        self.semantic_action == Action::Stop
    }

    /// Highest-priority directives first, capped at `n`.
    pub fn top_directives(&self, n: usize) -> impl Iterator<Item = &Directive> {
        self.content_directives.iter().take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_builder_sets_signal() {
        let d = Directive::new("Mention aid", 5).signal("financial_concern");
        assert_eq!(d.priority, 5);
        assert_eq!(d.signal.as_deref(), Some("financial_concern"));
    }

    #[test]
    fn untagged_directive_omits_signal_in_json() {
        let v = serde_json::to_value(Directive::new("Ask about the child", 1)).unwrap();
        assert!(v.get("signal").is_none());
        assert_eq!(v["priority"], 1);
    }
}
