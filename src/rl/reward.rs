//! Reward / update engine: scores the status change that followed a decision and
//! folds it into the Q-table with one Bellman step.

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::info;
use uuid::Uuid;

use crate::model::{LeadStatus, NbaDecision, QEntry, StateTransition};
use crate::store::{Store, StoreResult};

use super::LearningParams;

/// Any move into declined.
pub const DECLINED_REWARD: f64 = -1.0;
/// Status unchanged after an interaction.
pub const STALL_REWARD: f64 = -0.02;

const TRANSITION_REWARDS: &[(LeadStatus, LeadStatus, f64)] = &[
    (LeadStatus::New, LeadStatus::Contacted, 0.1),
    (LeadStatus::Contacted, LeadStatus::Interested, 0.4),
    (LeadStatus::Interested, LeadStatus::Trial, 0.7),
    (LeadStatus::Trial, LeadStatus::Enrolled, 1.0),
    (LeadStatus::Enrolled, LeadStatus::Active, 0.3),
    (LeadStatus::Active, LeadStatus::AtRisk, -0.5),
    (LeadStatus::AtRisk, LeadStatus::Inactive, -0.7),
    (LeadStatus::AtRisk, LeadStatus::Active, 0.5),
    (LeadStatus::Inactive, LeadStatus::AtRisk, 0.3),
    (LeadStatus::Inactive, LeadStatus::Active, 0.6),
];

pub fn reward_for(before: LeadStatus, after: LeadStatus) -> f64 {
    if after == LeadStatus::Declined {
        return DECLINED_REWARD;
    }
    if before == after {
        return STALL_REWARD;
    }
    TRANSITION_REWARDS
        .iter()
        .find(|(from, to, _)| *from == before && *to == after)
        .map(|(_, _, r)| *r)
        .unwrap_or(0.0)
}

/// Q(s,a) ← Q(s,a) + α · (r + γ · max Q(s',·) − Q(s,a))
pub fn bellman(q: f64, reward: f64, max_next: f64, params: &LearningParams) -> f64 {
    q + params.alpha * (reward + params.gamma * max_next - q)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardOutcome {
    pub reward: f64,
    pub q_before: f64,
    pub q_after: f64,
    pub transition: StateTransition,
}

/// Rewards the action of `decision` for the observed status change.
///
/// Decisions without an RL state (compliance overrides) are skipped and yield `None`.
pub fn apply_reward(
    store: &dyn Store,
    decision: &NbaDecision,
    status_before: LeadStatus,
    status_after: LeadStatus,
    state_after: &str,
    params: &LearningParams,
    now: DateTime<Utc>,
) -> StoreResult<Option<RewardOutcome>> {
    let Some(state_before) = decision.rl_state.as_deref() else {
        return Ok(None);
    };
    let action = decision.action;
    let reward = reward_for(status_before, status_after);
    let max_next = store.max_q(state_after)?;

    let (before, after) = store.update_q_entry(state_before, action, &mut |e: &QEntry| {
        let mut next = e.clone();
        next.value = bellman(e.value, reward, max_next, params);
        next.visit_count += 1;
        next.total_reward += reward;
        next.updated_at = Some(now);
        next
    })?;

    let transition = StateTransition {
        id: Uuid::new_v4(),
        lead_id: decision.lead_id,
        decision_id: decision.id,
        state_before: state_before.to_string(),
        action_taken: action,
        state_after: state_after.to_string(),
        reward,
        q_before: before.value,
        q_after: after.value,
        created_at: now,
    };
    store.append_transition(transition.clone())?;

    counter!("rl_q_updates_total").increment(1);
    info!(
        target: "rl",
        lead_id = %decision.lead_id,
        state = state_before,
        action = %action,
        next_state = state_after,
        reward,
        q_before = before.value,
        q_after = after.value,
        "q update"
    );

    Ok(Some(RewardOutcome {
        reward,
        q_before: before.value,
        q_after: after.value,
        transition,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use crate::store::MemoryStore;

    #[test]
    fn reward_table() {
        assert_eq!(reward_for(LeadStatus::New, LeadStatus::Contacted), 0.1);
        assert_eq!(reward_for(LeadStatus::Trial, LeadStatus::Enrolled), 1.0);
        assert_eq!(reward_for(LeadStatus::Active, LeadStatus::AtRisk), -0.5);
        assert_eq!(reward_for(LeadStatus::Inactive, LeadStatus::Active), 0.6);
    }

    #[test]
    fn declined_stall_and_unlisted() {
        assert_eq!(reward_for(LeadStatus::Trial, LeadStatus::Declined), -1.0);
        assert_eq!(reward_for(LeadStatus::Interested, LeadStatus::Interested), -0.02);
        assert_eq!(reward_for(LeadStatus::Declined, LeadStatus::Declined), -1.0);
        assert_eq!(reward_for(LeadStatus::New, LeadStatus::Interested), 0.0);
    }

    #[test]
    fn declining_is_worse_than_any_slide() {
        let slide = reward_for(LeadStatus::Active, LeadStatus::AtRisk);
        assert!(slide < 0.0);
        for before in LeadStatus::ALL {
            let declined = reward_for(*before, LeadStatus::Declined);
            assert!(slide > declined, "{before} -> declined scored {declined}");
        }
    }

    #[test]
    fn bellman_step() {
        let p = LearningParams::default();
        let q = bellman(0.0, 0.4, 0.0, &p);
        assert!((q - 0.04).abs() < 1e-12);
        let q2 = bellman(0.5, -0.02, 1.0, &p);
        // 0.5 + 0.1 * (-0.02 + 0.9 - 0.5)
        assert!((q2 - 0.538).abs() < 1e-12);
    }

    #[test]
    fn skipped_without_rl_state() {
        let store = MemoryStore::new();
        let decision = crate::engine::tests_support::decision(None, Action::Stop);
        let out = apply_reward(
            &store,
            &decision,
            LeadStatus::Declined,
            LeadStatus::Declined,
            "declined:neutral",
            &LearningParams::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(out.is_none());
        assert!(store.q_entries_for_state("declined:neutral").unwrap().is_empty());
    }

    #[test]
    fn update_writes_entry_and_transition() {
        let store = MemoryStore::new();
        let decision =
            crate::engine::tests_support::decision(Some("contacted:neutral"), Action::WarmFollowUp);
        let out = apply_reward(
            &store,
            &decision,
            LeadStatus::Contacted,
            LeadStatus::Interested,
            "interested:positive_engagement",
            &LearningParams::default(),
            Utc::now(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.reward, 0.4);
        assert_eq!(out.q_before, 0.0);
        assert!((out.q_after - 0.04).abs() < 1e-12);

        let entry = store
            .q_entry("contacted:neutral", Action::WarmFollowUp)
            .unwrap()
            .unwrap();
        assert_eq!(entry.visit_count, 1);
        assert!((entry.total_reward - 0.4).abs() < 1e-12);
        let transitions = store.transitions_for_lead(decision.lead_id).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].state_after, "interested:positive_engagement");
    }
}
