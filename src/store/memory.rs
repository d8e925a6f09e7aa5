//! # Memory Store
//! In-process `Store` backend: one mutex-guarded table per entity.
//!
//! The Q table and the message buffer each sit behind a single mutex, so
//! `update_q_entry` and `take_unflushed` are atomic read-modify-write steps.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PendingSummary, QUpdate, Store, StoreError, StoreResult};
use crate::model::{
    Action, ArtifactKind, ArtifactPayload, BufferedMessage, Channel, ContextArtifact,
    DecisionStatus, Event, Interaction, Lead, LeadStatus, NbaDecision, QEntry, ScheduledAction,
    ScheduledStatus, StateTransition,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    leads: RwLock<HashMap<Uuid, Lead>>,
    // Vec keeps insertion order, which doubles as creation order.
    interactions: RwLock<Vec<Interaction>>,
    artifacts: Mutex<Vec<ContextArtifact>>,
    decisions: Mutex<Vec<NbaDecision>>,
    scheduled: Mutex<Vec<ScheduledAction>>,
    q_table: Mutex<HashMap<(String, Action), QEntry>>,
    transitions: Mutex<Vec<StateTransition>>,
    buffer: Mutex<Vec<BufferedMessage>>,
    events: Mutex<Vec<Event>>,
}

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> StoreResult<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| StoreError::Backend(format!("{what} mutex poisoned")))
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Backend(format!("{what} lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    // ------------------------------------------------------------------
    // Leads
    // ------------------------------------------------------------------

    fn insert_lead(&self, lead: Lead) -> StoreResult<Lead> {
        let mut leads = self.leads.write().map_err(|_| poisoned("leads"))?;
        if leads.contains_key(&lead.id) {
            return Err(StoreError::Conflict(format!("lead {} exists", lead.id)));
        }
        leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    fn lead(&self, id: Uuid) -> StoreResult<Option<Lead>> {
        let leads = self.leads.read().map_err(|_| poisoned("leads"))?;
        Ok(leads.get(&id).cloned())
    }

    fn set_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Lead> {
        let mut leads = self.leads.write().map_err(|_| poisoned("leads"))?;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("lead {id}")))?;
        lead.status = status;
        lead.updated_at = now;
        Ok(lead.clone())
    }

    fn increment_counters(
        &self,
        id: Uuid,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> StoreResult<Lead> {
        let mut leads = self.leads.write().map_err(|_| poisoned("leads"))?;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("lead {id}")))?;
        lead.total_interactions += 1;
        match channel {
            Channel::Voice => lead.total_voice_attempts += 1,
            Channel::Sms => lead.total_sms_attempts += 1,
            Channel::Email => lead.total_email_attempts += 1,
            Channel::None => {}
        }
        lead.updated_at = now;
        Ok(lead.clone())
    }

    // ------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------

    fn insert_interaction(&self, interaction: Interaction) -> StoreResult<Interaction> {
        let mut rows = self
            .interactions
            .write()
            .map_err(|_| poisoned("interactions"))?;
        rows.push(interaction.clone());
        Ok(interaction)
    }

    fn update_interaction(&self, interaction: Interaction) -> StoreResult<()> {
        let mut rows = self
            .interactions
            .write()
            .map_err(|_| poisoned("interactions"))?;
        let slot = rows
            .iter_mut()
            .find(|i| i.id == interaction.id)
            .ok_or_else(|| StoreError::NotFound(format!("interaction {}", interaction.id)))?;
        *slot = interaction;
        Ok(())
    }

    fn interaction(&self, id: Uuid) -> StoreResult<Option<Interaction>> {
        let rows = self
            .interactions
            .read()
            .map_err(|_| poisoned("interactions"))?;
        Ok(rows.iter().find(|i| i.id == id).cloned())
    }

    fn latest_interaction(&self, lead_id: Uuid) -> StoreResult<Option<Interaction>> {
        let rows = self
            .interactions
            .read()
            .map_err(|_| poisoned("interactions"))?;
        // Latest by timestamp; among equal timestamps the later insert wins.
        let mut best: Option<&Interaction> = None;
        for i in rows.iter().filter(|i| i.lead_id == lead_id) {
            if best.map_or(true, |b| i.created_at >= b.created_at) {
                best = Some(i);
            }
        }
        Ok(best.cloned())
    }

    fn interactions_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Interaction>> {
        let rows = self
            .interactions
            .read()
            .map_err(|_| poisoned("interactions"))?;
        let mut out: Vec<Interaction> = rows
            .iter()
            .filter(|i| i.lead_id == lead_id)
            .cloned()
            .collect();
        out.sort_by_key(|i| i.created_at);
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Context artifacts
    // ------------------------------------------------------------------

    fn append_artifact(
        &self,
        lead_id: Uuid,
        interaction_id: Option<Uuid>,
        payload: ArtifactPayload,
        now: DateTime<Utc>,
    ) -> StoreResult<ContextArtifact> {
        let kind = payload.kind();
        let mut rows = lock(&self.artifacts, "artifacts")?;
        let mut version = 1;
        for a in rows
            .iter_mut()
            .filter(|a| a.lead_id == lead_id && a.is_current && a.kind() == kind)
        {
            version = version.max(a.version + 1);
            a.is_current = false;
        }
        let artifact = ContextArtifact {
            id: Uuid::new_v4(),
            lead_id,
            interaction_id,
            payload,
            version,
            is_current: true,
            created_at: now,
        };
        rows.push(artifact.clone());
        Ok(artifact)
    }

    fn artifacts_of_kind(
        &self,
        lead_id: Uuid,
        kind: ArtifactKind,
    ) -> StoreResult<Vec<ContextArtifact>> {
        let rows = lock(&self.artifacts, "artifacts")?;
        Ok(rows
            .iter()
            .filter(|a| a.lead_id == lead_id && a.kind() == kind)
            .cloned()
            .collect())
    }

    fn current_artifacts(&self, lead_id: Uuid) -> StoreResult<Vec<ContextArtifact>> {
        let rows = lock(&self.artifacts, "artifacts")?;
        Ok(rows
            .iter()
            .filter(|a| a.lead_id == lead_id && a.is_current)
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------
    // Decisions + scheduled actions
    // ------------------------------------------------------------------

    fn current_decision(&self, lead_id: Uuid) -> StoreResult<Option<NbaDecision>> {
        let rows = lock(&self.decisions, "decisions")?;
        Ok(rows
            .iter()
            .rev()
            .find(|d| d.lead_id == lead_id && d.is_current)
            .cloned())
    }

    fn decision_history(&self, lead_id: Uuid, limit: usize) -> StoreResult<Vec<NbaDecision>> {
        let rows = lock(&self.decisions, "decisions")?;
        Ok(rows
            .iter()
            .rev()
            .filter(|d| d.lead_id == lead_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn supersede_current_decisions(&self, lead_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut rows = lock(&self.decisions, "decisions")?;
        let mut ids = Vec::new();
        for d in rows
            .iter_mut()
            .filter(|d| d.lead_id == lead_id && d.is_current)
        {
            d.is_current = false;
            d.status = DecisionStatus::Superseded;
            ids.push(d.id);
        }
        Ok(ids)
    }

    fn insert_decision(&self, decision: NbaDecision) -> StoreResult<NbaDecision> {
        let mut rows = lock(&self.decisions, "decisions")?;
        rows.push(decision.clone());
        Ok(decision)
    }

    fn insert_scheduled_action(&self, action: ScheduledAction) -> StoreResult<()> {
        lock(&self.scheduled, "scheduled")?.push(action);
        Ok(())
    }

    fn cancel_pending_actions(&self, decision_ids: &[Uuid]) -> StoreResult<usize> {
        let mut rows = lock(&self.scheduled, "scheduled")?;
        let mut n = 0;
        for a in rows.iter_mut().filter(|a| {
            a.status == ScheduledStatus::Pending && decision_ids.contains(&a.decision_id)
        }) {
            a.status = ScheduledStatus::Cancelled;
            n += 1;
        }
        Ok(n)
    }

    fn scheduled_actions(
        &self,
        status: ScheduledStatus,
        limit: usize,
    ) -> StoreResult<Vec<ScheduledAction>> {
        let rows = lock(&self.scheduled, "scheduled")?;
        let mut out: Vec<ScheduledAction> =
            rows.iter().filter(|a| a.status == status).cloned().collect();
        out.sort_by_key(|a| a.scheduled_at);
        out.truncate(limit);
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Q table
    // ------------------------------------------------------------------

    fn q_entry(&self, state: &str, action: Action) -> StoreResult<Option<QEntry>> {
        let table = lock(&self.q_table, "q_table")?;
        Ok(table.get(&(state.to_string(), action)).cloned())
    }

    fn q_entries_for_state(&self, state: &str) -> StoreResult<Vec<QEntry>> {
        let table = lock(&self.q_table, "q_table")?;
        let mut out: Vec<QEntry> = table
            .values()
            .filter(|e| e.state == state)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.action);
        Ok(out)
    }

    fn max_q(&self, state: &str) -> StoreResult<f64> {
        let table = lock(&self.q_table, "q_table")?;
        Ok(table
            .values()
            .filter(|e| e.state == state)
            .map(|e| e.value)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0))
    }

    fn update_q_entry(
        &self,
        state: &str,
        action: Action,
        update: QUpdate<'_>,
    ) -> StoreResult<(QEntry, QEntry)> {
        let mut table = lock(&self.q_table, "q_table")?;
        let entry = table
            .entry((state.to_string(), action))
            .or_insert_with(|| QEntry::empty(state, action));
        let before = entry.clone();
        let mut after = update(&before);
        // Key fields are not the closure's to change.
        after.state = before.state.clone();
        after.action = before.action;
        *entry = after.clone();
        Ok((before, after))
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn append_transition(&self, transition: StateTransition) -> StoreResult<()> {
        lock(&self.transitions, "transitions")?.push(transition);
        Ok(())
    }

    fn transitions_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<StateTransition>> {
        let rows = lock(&self.transitions, "transitions")?;
        Ok(rows
            .iter()
            .filter(|t| t.lead_id == lead_id)
            .cloned()
            .collect())
    }

    // ------------------------------------------------------------------
    // Message buffer
    // ------------------------------------------------------------------

    fn insert_buffered(&self, message: BufferedMessage) -> StoreResult<()> {
        lock(&self.buffer, "buffer")?.push(message);
        Ok(())
    }

    fn pending_summary(&self, lead_id: Uuid) -> StoreResult<Option<PendingSummary>> {
        let rows = lock(&self.buffer, "buffer")?;
        let mut summary: Option<PendingSummary> = None;
        for m in rows.iter().filter(|m| m.lead_id == lead_id && !m.flushed) {
            summary = Some(match summary {
                None => PendingSummary {
                    count: 1,
                    oldest: m.received_at,
                    newest: m.received_at,
                },
                Some(s) => PendingSummary {
                    count: s.count + 1,
                    oldest: s.oldest.min(m.received_at),
                    newest: s.newest.max(m.received_at),
                },
            });
        }
        Ok(summary)
    }

    fn take_unflushed(&self, lead_id: Uuid) -> StoreResult<Vec<BufferedMessage>> {
        let mut rows = lock(&self.buffer, "buffer")?;
        let mut taken = Vec::new();
        for m in rows
            .iter_mut()
            .filter(|m| m.lead_id == lead_id && !m.flushed)
        {
            m.flushed = true;
            taken.push(m.clone());
        }
        // Stable sort keeps insertion order for identical timestamps.
        taken.sort_by_key(|m| m.received_at);
        Ok(taken)
    }

    fn leads_with_stale_messages(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let rows = lock(&self.buffer, "buffer")?;
        let mut out: Vec<Uuid> = Vec::new();
        for m in rows
            .iter()
            .filter(|m| !m.flushed && m.received_at <= cutoff)
        {
            if !out.contains(&m.lead_id) {
                out.push(m.lead_id);
            }
        }
        Ok(out)
    }

    fn buffered_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<BufferedMessage>> {
        let rows = lock(&self.buffer, "buffer")?;
        Ok(rows
            .iter()
            .filter(|m| m.lead_id == lead_id)
            .cloned()
            .collect())
    }

    fn leads_with_pending_messages(&self) -> StoreResult<usize> {
        let rows = lock(&self.buffer, "buffer")?;
        let mut leads: Vec<Uuid> = rows
            .iter()
            .filter(|m| !m.flushed)
            .map(|m| m.lead_id)
            .collect();
        leads.sort();
        leads.dedup();
        Ok(leads.len())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    fn append_event(&self, event: Event) -> StoreResult<()> {
        lock(&self.events, "events")?.push(event);
        Ok(())
    }

    fn events_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Event>> {
        let rows = lock(&self.events, "events")?;
        Ok(rows
            .iter()
            .filter(|e| e.lead_id == lead_id)
            .cloned()
            .collect())
    }
}
