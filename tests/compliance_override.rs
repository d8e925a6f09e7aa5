// tests/compliance_override.rs
//
// Stop handling end to end:
// - an opt-out interaction ends outreach with a non-learnable stop
// - a refusal penalises the decision that preceded it
// - stop decisions schedule nothing and cancel what was scheduled

use std::sync::Arc;

use chrono::Utc;
use lead_nba_engine::model::{
    Action, Channel, Direction, InteractionStatus, LeadStatus, NewInteraction, NewLead, Priority,
    ScheduledStatus,
};
use lead_nba_engine::rl::LearningParams;
use lead_nba_engine::signals::MockExtractor;
use lead_nba_engine::{MemoryStore, Pipeline, Store};
use uuid::Uuid;

fn setup() -> (Arc<MemoryStore>, Pipeline, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let p = Pipeline::new(
        store.clone(),
        Arc::new(MockExtractor),
        LearningParams::default(),
    );
    let mut l = NewLead::named("Harper");
    l.phone = Some("555-0177".into());
    let id = store
        .insert_lead(l.into_lead(Utc::now()))
        .expect("insert lead")
        .id;
    (store, p, id)
}

#[tokio::test]
async fn opt_out_ends_outreach() {
    let (store, p, id) = setup();
    let out = p
        .process_new(
            id,
            NewInteraction::new(Channel::Sms, Direction::Inbound, InteractionStatus::OptedOut)
                .transcript("STOP"),
        )
        .await
        .expect("process opt-out");

    let d = &out.decision;
    assert_eq!(d.action, Action::Stop);
    assert_eq!(d.channel, Channel::None);
    assert_eq!(d.priority, Priority::Low);
    assert_eq!(d.rl_state, None);
    assert_eq!(d.scheduled_for, None);
    assert!(
        d.reasoning.starts_with("Compliance override:"),
        "{}",
        d.reasoning
    );
    assert!(d.brief.is_terminal());
    assert!(d.brief.message_draft.is_none());

    let lead = store.lead(id).expect("load").expect("lead");
    assert_eq!(lead.status, LeadStatus::Declined);
    assert!(store
        .scheduled_actions(ScheduledStatus::Pending, 10)
        .expect("pending")
        .is_empty());
}

#[tokio::test]
async fn refusal_penalises_previous_decision_and_cancels_its_follow_up() {
    let (store, p, id) = setup();
    let first = p
        .process_new(
            id,
            NewInteraction::new(Channel::Voice, Direction::Outbound, InteractionStatus::NoAnswer),
        )
        .await
        .expect("first call");
    assert!(first.decision.scheduled_for.is_some());

    let out = p
        .process_new(
            id,
            NewInteraction::new(Channel::Voice, Direction::Outbound, InteractionStatus::Completed)
                .transcript("Parent: No thanks, we're not interested."),
        )
        .await
        .expect("refusal");

    assert!(out
        .steps
        .contains(&"q_update (r=-1.00, Q=0.000->-0.100)".to_string()));
    assert!(out
        .steps
        .contains(&"status_updated (contacted -> declined)".to_string()));
    assert_eq!(out.decision.action, Action::Stop);
    assert_eq!(out.decision.rl_state, None);

    let cancelled = store
        .scheduled_actions(ScheduledStatus::Cancelled, 10)
        .expect("cancelled");
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].decision_id, first.decision.id);
    assert!(store
        .scheduled_actions(ScheduledStatus::Pending, 10)
        .expect("pending")
        .is_empty());

    let q = store
        .q_entry("contacted:unreached", first.decision.action)
        .expect("load q")
        .expect("entry");
    assert!((q.value + 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn stop_decision_is_not_rewarded_later() {
    let (store, p, id) = setup();
    p.process_new(
        id,
        NewInteraction::new(Channel::Sms, Direction::Inbound, InteractionStatus::OptedOut),
    )
    .await
    .expect("opt-out");
    let next = p
        .process_new(
            id,
            NewInteraction::new(Channel::Sms, Direction::Inbound, InteractionStatus::OptedOut),
        )
        .await
        .expect("repeat opt-out");
    assert!(!next.steps.iter().any(|s| s.starts_with("q_update")));
    assert!(store.transitions_for_lead(id).expect("transitions").is_empty());
}
