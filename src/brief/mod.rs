//! Action Brief Builder: turns a semantic action plus the lead's context into a
//! concrete, human-readable recommendation.
//!
//! Order of operations: template → channel → priority → schedule → enrichment →
//! rationale → directive sort → list dedup → signal snapshot → message draft.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::decision::{ActionBrief, Directive, SignalContext};
use crate::model::{Action, Channel, LeadStatus, Priority};
use crate::policy::PolicyInputs;

pub mod enrich;
pub mod templates;

pub use enrich::enrich;
pub use templates::{template, Template};

const DRAFT_POINTS: usize = 2;

pub fn build_brief(
    action: Action,
    inputs: &PolicyInputs,
    state: &str,
    q_value: f64,
    now: DateTime<Utc>,
) -> ActionBrief {
    let t = template(action);
    let channel = resolve_channel(action, inputs);
    let priority = derive_priority(q_value, action, inputs.lead_status);
    let scheduled_for = (t.delay_hours > 0).then(|| now + Duration::hours(t.delay_hours));

    let mut brief = ActionBrief {
        semantic_action: action,
        channel,
        priority,
        scheduled_for,
        timing_rationale: t.timing_rationale.to_string(),
        content_directives: t
            .directives
            .iter()
            .map(|(point, prio)| Directive::new(*point, *prio))
            .collect(),
        overall_tone: t.tone,
        info_to_prepare: t.prepare.iter().map(|s| s.to_string()).collect(),
        things_to_avoid: t.avoid.iter().map(|s| s.to_string()).collect(),
        message_draft: None,
        state: state.to_string(),
        q_value,
        signal_context: SignalContext::default(),
    };

    enrich(&mut brief, inputs);
    if let Some(text) = rationale(&brief, inputs) {
        brief.timing_rationale = text;
    }
    // stable: enrichment keeps its insertion order within a priority
    brief.content_directives.sort_by_key(|d| d.priority);
    dedup_in_order(&mut brief.info_to_prepare);
    dedup_in_order(&mut brief.things_to_avoid);
    brief.signal_context = signal_context(inputs);
    brief.message_draft = message_draft(&brief, inputs);
    brief
}

/// String entry point for callers holding a raw action name. Names outside the
/// catalog render as gentle_nudge.
pub fn build_brief_named(
    name: &str,
    inputs: &PolicyInputs,
    state: &str,
    q_value: f64,
    now: DateTime<Utc>,
) -> ActionBrief {
    let action = Action::parse(name).unwrap_or_else(|| {
        warn!(target: "nba", action = name, "unknown semantic action, falling back to gentle_nudge");
        Action::GentleNudge
    });
    build_brief(action, inputs, state, q_value, now)
}

/// Concrete channel for `action`, honouring preference then reachability.
pub fn resolve_channel(action: Action, p: &PolicyInputs) -> Channel {
    let base = template(action).channel;
    if base == Channel::None {
        return Channel::None;
    }

    if action == Action::ChannelSwitch {
        let mut available: Vec<(Channel, u32)> = Vec::new();
        if p.has_phone {
            available.push((Channel::Voice, p.total_voice_attempts));
            available.push((Channel::Sms, p.total_sms_attempts));
        }
        if p.has_email {
            available.push((Channel::Email, p.total_email_attempts));
        }
        // first of equal minimums wins: voice, sms, email
        return available
            .into_iter()
            .min_by_key(|(_, attempts)| *attempts)
            .map(|(c, _)| c)
            .unwrap_or(Channel::Sms);
    }

    match (base, p.preferred_channel) {
        (Channel::Voice, Some(pref @ (Channel::Sms | Channel::Email))) => return pref,
        (Channel::Sms, Some(Channel::Email)) => return Channel::Email,
        _ => {}
    }

    match base {
        Channel::Voice if !p.has_phone => {
            if p.has_email {
                Channel::Email
            } else {
                Channel::Sms
            }
        }
        Channel::Sms if !p.has_phone => {
            if p.has_email {
                Channel::Email
            } else {
                Channel::Voice
            }
        }
        Channel::Email if !p.has_email => {
            if p.has_phone {
                Channel::Sms
            } else {
                Channel::Voice
            }
        }
        other => other,
    }
}

/// Heuristic priority; meaningful even while every Q is still near zero.
pub fn derive_priority(q_value: f64, action: Action, status: LeadStatus) -> Priority {
    if action == Action::SchedulingPush || q_value > 0.5 {
        return Priority::High;
    }
    if matches!(
        action,
        Action::ObjectionAddress | Action::RetentionCheckIn | Action::ChannelSwitch
    ) || status == LeadStatus::AtRisk
    {
        return Priority::High;
    }
    if matches!(
        action,
        Action::WarmFollowUp
            | Action::ScholarshipOutreach
            | Action::WelcomeOnboard
            | Action::FamilyEngage
    ) || matches!(
        status,
        LeadStatus::Interested | LeadStatus::Trial | LeadStatus::Enrolled
    ) || q_value > 0.2
    {
        return Priority::Normal;
    }
    Priority::Low
}

fn channel_verb(channel: Channel) -> &'static str {
    match channel {
        Channel::Voice => "call",
        Channel::Sms => "text",
        Channel::Email => "email",
        Channel::None => "reach out to",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn non_blank(v: &str) -> Option<&str> {
    let v = v.trim();
    (!v.is_empty()).then_some(v)
}

/// Personalised replacement for the template rationale; `None` for wait/stop.
fn rationale(brief: &ActionBrief, p: &PolicyInputs) -> Option<String> {
    let action = brief.semantic_action;
    if action.is_passive() {
        return None;
    }

    let child = p
        .child_name
        .as_deref()
        .and_then(non_blank)
        .unwrap_or("their child");
    let name = non_blank(&p.first_name).unwrap_or("them");
    let ch = channel_verb(brief.channel);
    let verb = capitalize(ch);

    let core = match action {
        Action::SchedulingPush => format!("{verb} {name} now while they're ready to schedule"),
        Action::WarmFollowUp => format!("{verb} {name} to keep the conversation going"),
        Action::GentleNudge => format!("{verb} {name} with a light check-in"),
        Action::ScholarshipOutreach => format!(
            "{verb} {name} with financial aid details they can review at their own pace"
        ),
        Action::InfoSend => format!("{verb} {name} with the information they asked about"),
        Action::ObjectionAddress => {
            let topics = if p.objection_topics.is_empty() {
                "their concerns".to_string()
            } else {
                p.objection_topics.join(", ")
            };
            format!("{verb} {name} to address {topics}")
        }
        Action::WelcomeOnboard => format!(
            "{verb} {name} with a welcome message and first-day details for {child}"
        ),
        Action::RetentionCheckIn => format!("{verb} {name} to check in on how {child} is doing"),
        Action::FamilyEngage => format!("{verb} {name} when the whole family can talk"),
        Action::ChannelSwitch => {
            format!("Try a {ch} instead — previous channel hasn't connected with {name}")
        }
        Action::Wait | Action::Stop => format!("{verb} {name}"),
    };

    let mut extras: Vec<String> = Vec::new();
    if let Some(hint) = p.response_hint.as_deref() {
        extras.push(format!("they tend to respond {hint}"));
    }
    if p.has_scheduling_constraints {
        extras.push("mention the alternative schedule options".to_string());
    }
    if p.has_pending_decision_makers {
        extras.push("include info they can share with the other decision-maker".to_string());
    }
    if p.financial_concern_level.is_elevated() && action != Action::ScholarshipOutreach {
        extras.push("be prepared to discuss financial options".to_string());
    }
    if let Some(sport) = p.sport.as_deref().and_then(non_blank) {
        if matches!(
            action,
            Action::WarmFollowUp
                | Action::RetentionCheckIn
                | Action::SchedulingPush
                | Action::WelcomeOnboard
        ) {
            extras.push(format!("reference {child}'s {sport}"));
        }
    }

    Some(if extras.is_empty() {
        format!("{core}.")
    } else {
        format!("{core} — {}.", extras.join(", "))
    })
}

/// Template draft for text channels only.
fn message_draft(brief: &ActionBrief, p: &PolicyInputs) -> Option<String> {
    if !matches!(brief.channel, Channel::Sms | Channel::Email) || brief.content_directives.is_empty()
    {
        return None;
    }
    let name = non_blank(&p.first_name).unwrap_or("there");

    let mut lines = vec![format!("Hi {name},")];
    lines.extend(brief.top_directives(DRAFT_POINTS).map(|d| d.point.clone()));
    lines.push(
        match brief.semantic_action {
            Action::ScholarshipOutreach => "Would you like me to send over the details?",
            Action::GentleNudge => "Would you like to chat more about it?",
            Action::InfoSend => "Let me know if you have any other questions!",
            _ => "Looking forward to hearing from you.",
        }
        .to_string(),
    );
    Some(lines.join("\n\n"))
}

fn signal_context(p: &PolicyInputs) -> SignalContext {
    SignalContext {
        lead_status: p.lead_status,
        last_intent: p.last_detected_intent,
        last_sentiment: p.last_sentiment,
        financial_concern_level: p.financial_concern_level,
        has_objections: p.has_unaddressed_objections,
        objection_topics: p.objection_topics.clone(),
        has_siblings: p.has_siblings,
        has_pending_decision_makers: p.has_pending_decision_makers,
        has_scheduling_constraints: p.has_scheduling_constraints,
        additional_signals_count: p.additional_signals.len(),
        total_interactions: p.total_interactions,
    }
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|s| seen.insert(s.clone()));
}
