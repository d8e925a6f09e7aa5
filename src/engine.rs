//! # Decision Engine
//! Maps a lead's `PolicyInputs` → `Recommendation`, then persists it as the lead's
//! single current decision.
//!
//! Order: compliance override → state encoding → action-space filter → UCB pick →
//! brief. An override short-circuits before anything learned is consulted.

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info};
use uuid::Uuid;

use crate::brief::build_brief;
use crate::decision::ActionBrief;
use crate::error::{NbaError, Stage, StageExt};
use crate::model::{
    Action, Channel, DecisionStatus, Event, EventKind, NbaDecision, Priority, ScheduledAction,
    ScheduledStatus,
};
use crate::policy::{
    compliance_override, encode_state, filter_actions, load_policy_inputs, ComplianceStop,
    PolicyInputs,
};
use crate::rl::{select_action, LearningParams};
use crate::store::{Store, StoreResult};

/// Output of one decision, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub action: Action,
    pub channel: Channel,
    pub priority: Priority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub reasoning: String,
    pub brief: ActionBrief,
    pub inputs: PolicyInputs,
    pub state: String,
    pub q_value: f64,
    pub override_reason: Option<ComplianceStop>,
}

impl Recommendation {
    /// State stored with the decision; only RL-selected decisions are learnable.
    pub fn rl_state(&self) -> Option<String> {
        match self.override_reason {
            Some(_) => None,
            None => Some(self.state.clone()),
        }
    }
}

/// Loads fresh inputs for the lead and decides.
pub fn compute_nba(
    store: &dyn Store,
    lead_id: Uuid,
    params: &LearningParams,
    now: DateTime<Utc>,
) -> Result<Recommendation, NbaError> {
    let inputs = load_policy_inputs(store, lead_id, now)?;
    decide(store, inputs, params, now).at(Stage::ComputeNba, lead_id)
}

/// Same logic as `compute_nba` over an already built snapshot. Reads the Q-table,
/// never writes it.
pub fn decide(
    store: &dyn Store,
    inputs: PolicyInputs,
    params: &LearningParams,
    now: DateTime<Utc>,
) -> StoreResult<Recommendation> {
    let state = encode_state(&inputs);

    if let Some(stop) = compliance_override(&inputs) {
        let brief = stop_brief(stop, &inputs, &state, now);
        return Ok(Recommendation {
            action: stop.action(),
            channel: Channel::None,
            priority: Priority::Low,
            scheduled_for: None,
            reasoning: format!("Compliance override: {}", stop.reason()),
            brief,
            inputs,
            state,
            q_value: 0.0,
            override_reason: Some(stop),
        });
    }

    let candidates = filter_actions(&inputs);
    let (action, q_value, score) = match select_action(store, &state, &candidates, params)? {
        Some(sel) => (sel.action, sel.q_value, sel.score),
        // filter_actions never returns an empty list
        None => (Action::GentleNudge, 0.0, 0.0),
    };
    debug!(
        target: "nba",
        state = %state,
        candidates = candidates.len(),
        action = %action,
        q = q_value,
        ucb = score,
        "ucb selection"
    );

    let brief = build_brief(action, &inputs, &state, q_value, now);
    let reasoning = format!(
        "RL selection in state {state}: {action} (Q={q_value:.3}, UCB={score:.3}) among {} allowed actions",
        candidates.len()
    );
    Ok(Recommendation {
        action,
        channel: brief.channel,
        priority: brief.priority,
        scheduled_for: brief.scheduled_for,
        reasoning,
        brief,
        inputs,
        state,
        q_value,
        override_reason: None,
    })
}

/// Terminal brief for a compliance stop: no channel, low priority, q = 0.
pub fn stop_brief(
    stop: ComplianceStop,
    inputs: &PolicyInputs,
    state: &str,
    now: DateTime<Utc>,
) -> ActionBrief {
    let mut brief = build_brief(stop.action(), inputs, state, 0.0, now);
    brief.priority = Priority::Low;
    brief.channel = Channel::None;
    brief
}

/// Makes `rec` the lead's only current decision.
///
/// Supersedes every previous current decision, cancels their pending scheduled
/// actions, and schedules the new one when it has a time and is not wait/stop.
pub fn persist_decision(
    store: &dyn Store,
    lead_id: Uuid,
    interaction_id: Option<Uuid>,
    rec: &Recommendation,
    now: DateTime<Utc>,
) -> Result<NbaDecision, NbaError> {
    let superseded = store
        .supersede_current_decisions(lead_id)
        .at(Stage::PersistDecision, lead_id)?;
    let cancelled = store
        .cancel_pending_actions(&superseded)
        .at(Stage::PersistDecision, lead_id)?;

    let decision = store
        .insert_decision(NbaDecision {
            id: Uuid::new_v4(),
            lead_id,
            interaction_id,
            action: rec.action,
            channel: rec.channel,
            priority: rec.priority,
            scheduled_for: rec.scheduled_for,
            reasoning: rec.reasoning.clone(),
            brief: rec.brief.clone(),
            policy_inputs: rec.inputs.snapshot(),
            rl_state: rec.rl_state(),
            is_current: true,
            status: DecisionStatus::Pending,
            created_at: now,
        })
        .at(Stage::PersistDecision, lead_id)?;

    if let Some(when) = rec.scheduled_for {
        if !rec.action.is_passive() {
            store
                .insert_scheduled_action(ScheduledAction {
                    id: Uuid::new_v4(),
                    lead_id,
                    decision_id: decision.id,
                    action: rec.action,
                    channel: rec.channel,
                    scheduled_at: when,
                    status: ScheduledStatus::Pending,
                    created_at: now,
                })
                .at(Stage::PersistDecision, lead_id)?;
        }
    }

    store
        .append_event(Event::system(
            lead_id,
            EventKind::NbaProduced,
            decision.id,
            serde_json::json!({
                "action": rec.action,
                "channel": rec.channel,
                "priority": rec.priority,
                "state": rec.state,
                "q_value": rec.q_value,
            }),
            format!("NBA: {} via {}", rec.action, rec.channel),
            now,
        ))
        .at(Stage::PersistDecision, lead_id)?;

    counter!("nba_decisions_total", "action" => rec.action.as_str()).increment(1);
    if rec.override_reason.is_some() {
        counter!("nba_compliance_overrides_total").increment(1);
    }
    info!(
        target: "nba",
        lead_id = %lead_id,
        decision_id = %decision.id,
        action = %rec.action,
        channel = %rec.channel,
        priority = %rec.priority,
        state = %rec.state,
        superseded = superseded.len(),
        cancelled,
        "decision persisted"
    );

    Ok(decision)
}
