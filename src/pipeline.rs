//! Interaction processing pipeline.
//!
//! One completed interaction in, one new current decision out. Extraction runs
//! before the per-lead lock is taken (it may be a slow network call); everything
//! that mutates the lead runs under the lock so two interactions for the same lead
//! never interleave their status/reward/decision steps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batcher::ThreadProcessor;
use crate::engine::{decide, persist_decision};
use crate::error::{ErrorKind, NbaError, Stage, StageExt};
use crate::lifecycle::derive_status;
use crate::model::{
    ArtifactPayload, Event, EventKind, Interaction, Lead, NbaDecision, NewInteraction,
};
use crate::policy::{encode_state, load_policy_inputs};
use crate::rl::{apply_reward, LearningParams};
use crate::signals::{extract_or_default, DynExtractor, ExtractionRecord, ExtractionRequest};
use crate::store::Store;

/// What one run produced, plus a human-readable step trail.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub interaction_id: Uuid,
    pub lead_id: Uuid,
    pub steps: Vec<String>,
    pub decision: NbaDecision,
}

/// Lazily created async mutex per lead. Entries nobody holds or waits on are
/// dropped on the next `handle` call, so the map tracks only busy leads.
#[derive(Default)]
pub struct LeadLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl LeadLocks {
    pub fn handle(&self, lead_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.retain(|_, m| Arc::strong_count(m) > 1);
        map.entry(lead_id).or_default().clone()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    extractor: DynExtractor,
    params: LearningParams,
    locks: LeadLocks,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, extractor: DynExtractor, params: LearningParams) -> Self {
        Self {
            store,
            extractor,
            params,
            locks: LeadLocks::default(),
        }
    }

    /// Records a completed interaction and runs the full pipeline on it.
    pub async fn process_new(
        &self,
        lead_id: Uuid,
        new: NewInteraction,
    ) -> Result<ProcessOutcome, NbaError> {
        let now = Utc::now();
        self.require_lead(lead_id, Stage::RecordInteraction)?;
        let interaction = self
            .store
            .insert_interaction(new.into_interaction(lead_id, now))
            .at(Stage::RecordInteraction, lead_id)?;
        self.process(interaction, None, now).await
    }

    /// Runs the pipeline on an already stored interaction. `transcript_override`
    /// is what the extractor sees instead of the stored transcript.
    pub async fn process_stored(
        &self,
        interaction_id: Uuid,
        transcript_override: Option<String>,
    ) -> Result<ProcessOutcome, NbaError> {
        // the lead is unknown until the row loads; callers that know it add it
        let interaction = self
            .store
            .interaction(interaction_id)
            .map_err(|e| NbaError::new(ErrorKind::Store, Stage::RecordInteraction, e.to_string()))?
            .ok_or_else(|| {
                NbaError::new(
                    ErrorKind::NotFound,
                    Stage::RecordInteraction,
                    format!("interaction {interaction_id} not found"),
                )
            })?;
        let lead_id = interaction.lead_id;
        self.process(interaction, transcript_override, Utc::now())
            .await
            .map_err(|e| e.or_lead(lead_id))
    }

    /// Fresh decision from current state: no interaction, no reward update.
    pub async fn recompute(&self, lead_id: Uuid) -> Result<NbaDecision, NbaError> {
        let lock = self.locks.handle(lead_id);
        let _guard = lock.lock().await;
        let now = Utc::now();
        let inputs = load_policy_inputs(self.store.as_ref(), lead_id, now)?;
        let rec = decide(self.store.as_ref(), inputs, &self.params, now)
            .at(Stage::ComputeNba, lead_id)?;
        persist_decision(self.store.as_ref(), lead_id, None, &rec, now)
    }

    fn require_lead(&self, lead_id: Uuid, stage: Stage) -> Result<Lead, NbaError> {
        self.store
            .lead(lead_id)
            .at(stage, lead_id)?
            .ok_or_else(|| NbaError::not_found(stage, lead_id, "lead"))
    }

    async fn process(
        &self,
        mut interaction: Interaction,
        transcript_override: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, NbaError> {
        let lead_id = interaction.lead_id;
        let store = self.store.as_ref();
        let lead = self.require_lead(lead_id, Stage::LoadLead)?;
        let mut steps = Vec::new();

        // 1) audit event, append-only
        let mut description = format!(
            "{} {} — {}",
            crate::signals::title_case(interaction.channel.as_str()),
            interaction.direction,
            interaction.status
        );
        if let Some(secs) = interaction.duration_seconds.filter(|s| *s > 0) {
            description.push_str(&format!(" ({secs}s)"));
        }
        store
            .append_event(Event::system(
                lead_id,
                EventKind::InteractionCompleted,
                interaction.id,
                serde_json::json!({
                    "channel": interaction.channel,
                    "direction": interaction.direction,
                    "status": interaction.status,
                    "duration_seconds": interaction.duration_seconds,
                }),
                description,
                now,
            ))
            .at(Stage::RecordInteraction, lead_id)?;
        steps.push("event_logged".to_string());

        // 2) extraction, outside the lock
        let request = ExtractionRequest {
            transcript: transcript_override.or_else(|| interaction.transcript.clone()),
            lead_name: lead.full_name(),
            child_info: lead.child_info(),
            sport: lead.sport.clone().unwrap_or_default(),
            academy_name: lead.academy_name.clone().unwrap_or_default(),
            campaign_goal: lead.campaign_goal.clone().unwrap_or_default(),
            channel: Some(interaction.channel),
            direction: Some(interaction.direction),
            status: Some(interaction.status),
        };
        let record = extract_or_default(self.extractor.as_ref(), &request).await;

        interaction.summary = Some(record.summary.clone());
        interaction.extracted_facts = record.facts.clone();
        interaction.detected_intent = Some(record.intent);
        interaction.sentiment = Some(record.sentiment);
        interaction.open_questions = record.open_questions.clone();
        interaction.processed = true;
        interaction.processed_at = Some(now);
        store
            .update_interaction(interaction.clone())
            .at(Stage::RecordInteraction, lead_id)?;
        steps.push("llm_extraction".to_string());

        // 3..6 under the lead lock
        let lock = self.locks.handle(lead_id);
        let _guard = lock.lock().await;

        let created = persist_artifacts(store, lead_id, interaction.id, &record, now)?;
        steps.push(format!("context_artifacts_created ({created})"));
        store
            .append_event(Event::system(
                lead_id,
                EventKind::ContextEnriched,
                interaction.id,
                serde_json::json!({
                    "summary": record.summary,
                    "intent": record.intent,
                    "sentiment": record.sentiment,
                    "fact_count": record.facts.len(),
                }),
                format!(
                    "Context enriched: intent={}, sentiment={}",
                    record.intent, record.sentiment
                ),
                now,
            ))
            .at(Stage::PersistArtifacts, lead_id)?;

        // 4) counters + status
        let old_status = self.require_lead(lead_id, Stage::UpdateStatus)?.status;
        store
            .increment_counters(lead_id, interaction.channel, now)
            .at(Stage::UpdateStatus, lead_id)?;
        let new_status = derive_status(old_status, record.intent, interaction.status);
        if new_status != old_status {
            store
                .set_lead_status(lead_id, new_status, now)
                .at(Stage::UpdateStatus, lead_id)?;
            store
                .append_event(Event::system(
                    lead_id,
                    EventKind::StatusChanged,
                    interaction.id,
                    serde_json::json!({ "old_status": old_status, "new_status": new_status }),
                    format!("Status changed: {old_status} -> {new_status}"),
                    now,
                ))
                .at(Stage::UpdateStatus, lead_id)?;
            steps.push(format!("status_updated ({old_status} -> {new_status})"));
        }

        // 5) reward the previous decision, state_after from freshly aggregated inputs
        let inputs = load_policy_inputs(store, lead_id, now)?;
        if let Some(previous) = store
            .current_decision(lead_id)
            .at(Stage::RewardUpdate, lead_id)?
        {
            let state_after = encode_state(&inputs);
            let outcome = apply_reward(
                store,
                &previous,
                old_status,
                new_status,
                &state_after,
                &self.params,
                now,
            )
            .at(Stage::RewardUpdate, lead_id)?;
            if let Some(o) = outcome {
                steps.push(format!(
                    "q_update (r={:+.2}, Q={:.3}->{:.3})",
                    o.reward, o.q_before, o.q_after
                ));
            }
        }

        // 6) decide + persist
        let rec = decide(store, inputs, &self.params, now).at(Stage::ComputeNba, lead_id)?;
        let decision = persist_decision(store, lead_id, Some(interaction.id), &rec, now)?;
        steps.push(format!("nba_produced ({}/{})", rec.action, rec.channel));
        steps.push("committed".to_string());

        info!(
            target: "nba",
            lead_id = %lead_id,
            interaction_id = %interaction.id,
            steps = %steps.join(" -> "),
            "interaction processed"
        );

        Ok(ProcessOutcome {
            interaction_id: interaction.id,
            lead_id,
            steps,
            decision,
        })
    }
}

/// One artifact per non-empty signal dimension; returns how many were written.
fn persist_artifacts(
    store: &dyn Store,
    lead_id: Uuid,
    interaction_id: Uuid,
    record: &ExtractionRecord,
    now: DateTime<Utc>,
) -> Result<usize, NbaError> {
    let mut payloads = Vec::new();
    if !record.summary.trim().is_empty() {
        payloads.push(ArtifactPayload::Summary(record.summary.clone()));
    }
    if !record.facts.is_empty() {
        payloads.push(ArtifactPayload::ExtractedFacts(record.facts.clone()));
    }
    payloads.push(ArtifactPayload::DetectedIntent(record.intent));
    if !record.open_questions.is_empty() {
        payloads.push(ArtifactPayload::OpenQuestions(record.open_questions.clone()));
    }
    if record.financial_signals.concern_level != crate::model::ConcernLevel::None {
        payloads.push(ArtifactPayload::FinancialSignals(
            record.financial_signals.clone(),
        ));
    }
    if !record.scheduling_constraints.is_empty() {
        payloads.push(ArtifactPayload::SchedulingConstraints(
            record.scheduling_constraints.clone(),
        ));
    }
    if !record.family_context.is_empty() {
        payloads.push(ArtifactPayload::FamilyContext(record.family_context.clone()));
    }
    if !record.objections.is_empty() {
        payloads.push(ArtifactPayload::Objections(record.objections.clone()));
    }
    if !record.additional_signals.is_empty() {
        payloads.push(ArtifactPayload::AdditionalSignals(
            record.additional_signals.clone(),
        ));
    }

    let n = payloads.len();
    for payload in payloads {
        store
            .append_artifact(lead_id, Some(interaction_id), payload, now)
            .at(Stage::PersistArtifacts, lead_id)?;
    }
    Ok(n)
}

#[async_trait::async_trait]
impl ThreadProcessor for Pipeline {
    async fn process_thread(
        &self,
        anchor_interaction_id: Uuid,
        transcript: String,
    ) -> Result<ProcessOutcome, NbaError> {
        let out = self
            .process_stored(anchor_interaction_id, Some(transcript))
            .await;
        if let Err(e) = &out {
            warn!(target: "batcher", anchor = %anchor_interaction_id, error = %e, "thread processing failed");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Channel, Direction, InteractionStatus, LeadStatus, NewLead};
    use crate::signals::MockExtractor;
    use crate::store::MemoryStore;

    fn pipeline() -> (Arc<MemoryStore>, Pipeline) {
        let store = Arc::new(MemoryStore::new());
        let p = Pipeline::new(
            store.clone(),
            Arc::new(MockExtractor),
            LearningParams::default(),
        );
        (store, p)
    }

    fn seed(store: &MemoryStore) -> Lead {
        let mut l = NewLead::named("Priya");
        l.phone = Some("555-0111".into());
        store.insert_lead(l.into_lead(Utc::now())).unwrap()
    }

    #[tokio::test]
    async fn idle_lead_locks_are_dropped() {
        let locks = LeadLocks::default();
        for _ in 0..50 {
            let lock = locks.handle(Uuid::new_v4());
            let _guard = lock.lock().await;
        }
        assert!(locks.tracked() <= 1);

        let busy = Uuid::new_v4();
        let held = locks.handle(busy);
        let _guard = held.lock().await;
        locks.handle(Uuid::new_v4());
        assert_eq!(locks.tracked(), 2, "a held lock survives pruning");
        assert!(Arc::ptr_eq(&held, &locks.handle(busy)));
    }

    #[tokio::test]
    async fn recompute_leaves_no_lock_behind() {
        let (store, p) = pipeline();
        let lead = seed(&store);
        p.recompute(lead.id).await.unwrap();
        p.recompute(lead.id).await.unwrap();
        assert!(p.locks.tracked() <= 1);
    }

    #[tokio::test]
    async fn stored_run_resolves_the_lead_from_its_interaction() {
        let (store, p) = pipeline();
        let err = p.process_stored(Uuid::new_v4(), None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.lead_id, None);

        let lead = seed(&store);
        let interaction = store
            .insert_interaction(
                NewInteraction::new(Channel::Sms, Direction::Inbound, InteractionStatus::Completed)
                    .transcript("hi")
                    .into_interaction(lead.id, Utc::now()),
            )
            .unwrap();
        let out = p.process_stored(interaction.id, None).await.unwrap();
        assert_eq!(out.lead_id, lead.id);
    }

    #[tokio::test]
    async fn first_call_moves_new_to_contacted_and_decides() {
        let (store, p) = pipeline();
        let lead = seed(&store);
        let out = p
            .process_new(
                lead.id,
                NewInteraction::new(Channel::Voice, Direction::Outbound, InteractionStatus::NoAnswer),
            )
            .await
            .unwrap();
        assert_eq!(out.steps[0], "event_logged");
        assert_eq!(out.steps[1], "llm_extraction");
        assert!(out.steps.contains(&"status_updated (new -> contacted)".to_string()));
        assert_eq!(out.steps.last().map(String::as_str), Some("committed"));
        // no previous decision → no q_update step
        assert!(!out.steps.iter().any(|s| s.starts_with("q_update")));

        let lead = store.lead(lead.id).unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Contacted);
        assert_eq!(lead.total_interactions, 1);
        assert_eq!(lead.total_voice_attempts, 1);
        assert_eq!(out.decision.rl_state.as_deref(), Some("contacted:unreached"));
    }

    #[tokio::test]
    async fn second_interaction_rewards_the_first_decision() {
        let (store, p) = pipeline();
        let lead = seed(&store);
        p.process_new(
            lead.id,
            NewInteraction::new(Channel::Voice, Direction::Outbound, InteractionStatus::NoAnswer),
        )
        .await
        .unwrap();
        let out = p
            .process_new(
                lead.id,
                NewInteraction::new(Channel::Voice, Direction::Outbound, InteractionStatus::Completed)
                    .transcript("Parent: We're really interested, it sounds great!"),
            )
            .await
            .unwrap();
        let q_step = out
            .steps
            .iter()
            .find(|s| s.starts_with("q_update"))
            .expect("reward step present");
        assert!(q_step.starts_with("q_update (r=+0.40"), "{q_step}");
        assert_eq!(store.transitions_for_lead(lead.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recompute_does_not_learn() {
        let (store, p) = pipeline();
        let lead = seed(&store);
        let d1 = p.recompute(lead.id).await.unwrap();
        let d2 = p.recompute(lead.id).await.unwrap();
        assert_ne!(d1.id, d2.id);
        assert!(store.transitions_for_lead(lead.id).unwrap().is_empty());
        assert_eq!(store.decision_history(lead.id, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found() {
        let (_store, p) = pipeline();
        let err = p
            .process_new(
                Uuid::new_v4(),
                NewInteraction::new(Channel::Sms, Direction::Inbound, InteractionStatus::Completed),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn opt_out_stops_without_touching_q_table() {
        let (store, p) = pipeline();
        let lead = seed(&store);
        let out = p
            .process_new(
                lead.id,
                NewInteraction::new(Channel::Sms, Direction::Inbound, InteractionStatus::OptedOut)
                    .transcript("STOP"),
            )
            .await
            .unwrap();
        assert_eq!(out.decision.action, crate::model::Action::Stop);
        assert_eq!(out.decision.rl_state, None);
        assert!(store.q_entries_for_state("declined:neutral").unwrap().is_empty());
    }
}
