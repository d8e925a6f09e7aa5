//! Context Aggregator: collapses a lead's stored history into one `PolicyInputs`.
//!
//! Read-only and idempotent. Merging rules across the full artifact history:
//! financial concern keeps the highest level, objection topics are unioned,
//! scheduling/family flags are OR'd, additional signals dedupe by label keeping
//! the highest urgency.

use chrono::{DateTime, Timelike, Utc};
use uuid::Uuid;

use super::PolicyInputs;
use crate::error::{NbaError, Stage, StageExt};
use crate::model::{
    AdditionalSignal, ArtifactKind, ArtifactPayload, ContextArtifact, Direction, Interaction,
    InteractionStatus, Lead,
};
use crate::store::Store;

const ENRICHED_KINDS: [ArtifactKind; 5] = [
    ArtifactKind::FinancialSignals,
    ArtifactKind::SchedulingConstraints,
    ArtifactKind::FamilyContext,
    ArtifactKind::Objections,
    ArtifactKind::AdditionalSignals,
];

/// Loads everything the aggregator needs for `lead_id` and builds the snapshot.
pub fn load_policy_inputs(
    store: &dyn Store,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PolicyInputs, NbaError> {
    let lead = store
        .lead(lead_id)
        .at(Stage::LoadLead, lead_id)?
        .ok_or_else(|| NbaError::not_found(Stage::LoadLead, lead_id, "lead"))?;
    let last = store
        .latest_interaction(lead_id)
        .at(Stage::ComputeNba, lead_id)?;

    let mut artifacts = Vec::new();
    for kind in ENRICHED_KINDS {
        artifacts.extend(
            store
                .artifacts_of_kind(lead_id, kind)
                .at(Stage::ComputeNba, lead_id)?,
        );
    }
    let history = store
        .interactions_for_lead(lead_id)
        .at(Stage::ComputeNba, lead_id)?;

    Ok(aggregate(&lead, last.as_ref(), &artifacts, &history, now))
}

/// Pure aggregation over already-loaded rows. `artifacts` must be oldest first.
pub fn aggregate(
    lead: &Lead,
    last: Option<&Interaction>,
    artifacts: &[ContextArtifact],
    history: &[Interaction],
    now: DateTime<Utc>,
) -> PolicyInputs {
    let mut inputs = PolicyInputs::for_status(lead.status);

    inputs.total_interactions = lead.total_interactions;
    inputs.total_voice_attempts = lead.total_voice_attempts;
    inputs.total_sms_attempts = lead.total_sms_attempts;
    inputs.total_email_attempts = lead.total_email_attempts;
    inputs.campaign_goal = lead.campaign_goal.clone();
    inputs.preferred_channel = lead.preferred_channel;
    inputs.has_phone = lead.has_phone();
    inputs.has_email = lead.has_email();
    inputs.first_name = lead.first_name.clone();
    inputs.child_name = lead.child_name.clone();
    inputs.sport = lead.sport.clone();

    if let Some(i) = last {
        inputs.last_interaction_channel = Some(i.channel);
        inputs.last_interaction_status = Some(i.status);
        inputs.last_interaction_direction = Some(i.direction);
        inputs.last_detected_intent = i.detected_intent;
        inputs.last_sentiment = i.sentiment;
        let secs = (now - i.created_at).num_seconds().max(0) as f64;
        inputs.hours_since_last_interaction = Some(secs / 3600.0);
    }

    for artifact in artifacts {
        match &artifact.payload {
            ArtifactPayload::FinancialSignals(f) => {
                if f.concern_level > inputs.financial_concern_level {
                    inputs.financial_concern_level = f.concern_level;
                }
            }
            ArtifactPayload::Objections(list) => {
                for o in list {
                    if !inputs.objection_topics.contains(&o.topic) {
                        inputs.objection_topics.push(o.topic.clone());
                    }
                }
                // Never cleared once raised.
                if !list.is_empty() {
                    inputs.has_unaddressed_objections = true;
                }
            }
            ArtifactPayload::SchedulingConstraints(s) => {
                inputs.has_scheduling_constraints |= !s.is_empty();
            }
            ArtifactPayload::FamilyContext(f) => {
                inputs.has_siblings |= !f.siblings.is_empty();
                inputs.has_pending_decision_makers |= !f.decision_makers.is_empty();
            }
            ArtifactPayload::AdditionalSignals(list) => {
                for s in list {
                    merge_signal(&mut inputs.additional_signals, s);
                }
            }
            _ => {}
        }
    }

    inputs.response_hint = response_hint(history);
    inputs
}

fn merge_signal(acc: &mut Vec<AdditionalSignal>, incoming: &AdditionalSignal) {
    match acc.iter_mut().find(|s| s.label == incoming.label) {
        Some(existing) if incoming.urgency > existing.urgency => *existing = incoming.clone(),
        Some(_) => {}
        None => acc.push(incoming.clone()),
    }
}

/// Day part in which the lead usually replies, if a clear majority exists.
pub fn response_hint(history: &[Interaction]) -> Option<String> {
    let replies: Vec<&Interaction> = history
        .iter()
        .filter(|i| i.direction == Direction::Inbound && i.status == InteractionStatus::Completed)
        .collect();
    if replies.len() < 2 {
        return None;
    }

    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for i in &replies {
        let part = day_part(i.created_at.hour());
        match counts.iter_mut().find(|(p, _)| *p == part) {
            Some((_, n)) => *n += 1,
            None => counts.push((part, 1)),
        }
    }
    counts
        .into_iter()
        .find(|(_, n)| n * 2 > replies.len())
        .map(|(part, _)| format!("in the {part}"))
}

fn day_part(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "late night",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Channel, ConcernLevel, FamilyContext, FinancialSignals, Intent, LeadStatus, NewInteraction,
        NewLead, Objection, SchedulingConstraints, Sentiment, Severity, Urgency,
    };
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, h, 15, 0).unwrap()
    }

    fn artifact(payload: ArtifactPayload) -> ContextArtifact {
        ContextArtifact {
            id: Uuid::new_v4(),
            lead_id: Uuid::nil(),
            interaction_id: None,
            payload,
            version: 1,
            is_current: false,
            created_at: at(9),
        }
    }

    fn inbound(h: u32) -> Interaction {
        NewInteraction::new(Channel::Sms, Direction::Inbound, InteractionStatus::Completed)
            .at(at(h))
            .into_interaction(Uuid::nil(), at(h))
    }

    #[test]
    fn lead_fields_and_last_interaction_are_copied() {
        let mut lead = NewLead::named("Rosa").into_lead(at(8));
        lead.status = LeadStatus::Interested;
        lead.phone = Some("555".into());
        lead.total_interactions = 4;
        let mut last = inbound(10);
        last.detected_intent = Some(Intent::Considering);
        last.sentiment = Some(Sentiment::Neutral);

        let p = aggregate(&lead, Some(&last), &[], &[], at(13));
        assert_eq!(p.lead_status, LeadStatus::Interested);
        assert!(p.has_phone && !p.has_email);
        assert_eq!(p.total_interactions, 4);
        assert_eq!(p.last_detected_intent, Some(Intent::Considering));
        assert_eq!(p.hours_since_last_interaction, Some(3.0));
        assert_eq!(p.first_name, "Rosa");
    }

    #[test]
    fn history_is_merged_not_replaced() {
        let lead = NewLead::named("Kai").into_lead(at(8));
        let artifacts = vec![
            artifact(ArtifactPayload::FinancialSignals(FinancialSignals {
                concern_level: ConcernLevel::High,
                mentions: vec![],
            })),
            artifact(ArtifactPayload::FinancialSignals(FinancialSignals {
                concern_level: ConcernLevel::Low,
                mentions: vec![],
            })),
            artifact(ArtifactPayload::Objections(vec![Objection {
                topic: "distance".into(),
                detail: String::new(),
                severity: Severity::Moderate,
            }])),
            artifact(ArtifactPayload::Objections(vec![
                Objection {
                    topic: "cost".into(),
                    detail: String::new(),
                    severity: Severity::High,
                },
                Objection {
                    topic: "distance".into(),
                    detail: String::new(),
                    severity: Severity::Low,
                },
            ])),
            artifact(ArtifactPayload::SchedulingConstraints(SchedulingConstraints {
                constraints: vec!["weekends".into()],
                preferred_times: vec![],
            })),
            artifact(ArtifactPayload::SchedulingConstraints(SchedulingConstraints::default())),
            artifact(ArtifactPayload::FamilyContext(FamilyContext {
                decision_makers: vec!["spouse".into()],
                ..Default::default()
            })),
        ];
        let p = aggregate(&lead, None, &artifacts, &[], at(12));
        assert_eq!(p.financial_concern_level, ConcernLevel::High);
        assert_eq!(p.objection_topics, vec!["distance", "cost"]);
        assert!(p.has_unaddressed_objections);
        assert!(p.has_scheduling_constraints);
        assert!(p.has_pending_decision_makers && !p.has_siblings);
    }

    #[test]
    fn missed_call_outranks_money_worries() {
        let mut lead = NewLead::named("Ada").into_lead(at(8));
        lead.status = LeadStatus::Active;
        let last = NewInteraction::new(Channel::Voice, Direction::Outbound, InteractionStatus::NoAnswer)
            .at(at(11))
            .into_interaction(Uuid::nil(), at(11));
        let artifacts = vec![artifact(ArtifactPayload::FinancialSignals(FinancialSignals {
            concern_level: ConcernLevel::High,
            mentions: vec!["tuition".into()],
        }))];

        let p = aggregate(&lead, Some(&last), &artifacts, &[], at(12));
        assert_eq!(p.financial_concern_level, ConcernLevel::High);
        assert_eq!(crate::policy::encode_state(&p), "active:unreached");
    }

    #[test]
    fn additional_signals_dedupe_by_label_keeping_highest_urgency() {
        let lead = NewLead::named("Lu").into_lead(at(8));
        let artifacts = vec![
            artifact(ArtifactPayload::AdditionalSignals(vec![
                AdditionalSignal::new("moving", Urgency::Low),
                AdditionalSignal::new("competitor", Urgency::Moderate),
            ])),
            artifact(ArtifactPayload::AdditionalSignals(vec![
                AdditionalSignal::new("moving", Urgency::High).suggesting("Ask about new address"),
                AdditionalSignal::new("competitor", Urgency::Low),
            ])),
        ];
        let p = aggregate(&lead, None, &artifacts, &[], at(12));
        assert_eq!(p.additional_signals.len(), 2);
        assert_eq!(p.additional_signals[0].urgency, Urgency::High);
        assert_eq!(
            p.additional_signals[0].suggestion.as_deref(),
            Some("Ask about new address")
        );
        assert_eq!(p.additional_signals[1].urgency, Urgency::Moderate);
    }

    #[test]
    fn aggregation_is_repeatable() {
        let lead = NewLead::named("Io").into_lead(at(8));
        let artifacts = vec![artifact(ArtifactPayload::FamilyContext(FamilyContext {
            siblings: vec!["sister".into()],
            ..Default::default()
        }))];
        let a = aggregate(&lead, None, &artifacts, &[], at(12));
        let b = aggregate(&lead, None, &artifacts, &[], at(12));
        assert_eq!(a, b);
    }

    #[test]
    fn response_hint_needs_a_majority() {
        assert_eq!(response_hint(&[inbound(19)]), None);
        assert_eq!(
            response_hint(&[inbound(19), inbound(20), inbound(9)]).as_deref(),
            Some("in the evening")
        );
        assert_eq!(response_hint(&[inbound(19), inbound(9)]), None);
    }
}
