//! Persistence boundary.
//!
//! The core never caches entities across decisions; every stage reloads what it needs
//! through this trait. `MemoryStore` is the in-process backend used by the binary
//! and the tests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{
    Action, ArtifactKind, ArtifactPayload, BufferedMessage, Channel, ContextArtifact, Event,
    Interaction, Lead, LeadStatus, NbaDecision, QEntry, ScheduledAction, ScheduledStatus,
    StateTransition,
};

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage backend: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Unflushed buffer stats for one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSummary {
    pub count: usize,
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

/// Read-modify-write closure for a single Q entry.
pub type QUpdate<'a> = &'a mut dyn FnMut(&QEntry) -> QEntry;

pub trait Store: Send + Sync {
    // ---- leads ----
    fn insert_lead(&self, lead: Lead) -> StoreResult<Lead>;
    fn lead(&self, id: Uuid) -> StoreResult<Option<Lead>>;
    fn set_lead_status(&self, id: Uuid, status: LeadStatus, now: DateTime<Utc>)
        -> StoreResult<Lead>;
    /// Bumps `total_interactions` and the per-channel attempt counter in one step.
    fn increment_counters(&self, id: Uuid, channel: Channel, now: DateTime<Utc>)
        -> StoreResult<Lead>;

    // ---- interactions ----
    fn insert_interaction(&self, interaction: Interaction) -> StoreResult<Interaction>;
    fn update_interaction(&self, interaction: Interaction) -> StoreResult<()>;
    fn interaction(&self, id: Uuid) -> StoreResult<Option<Interaction>>;
    fn latest_interaction(&self, lead_id: Uuid) -> StoreResult<Option<Interaction>>;
    /// Oldest first.
    fn interactions_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Interaction>>;

    // ---- context artifacts ----
    /// Appends a new version of `payload.kind()` and retires the previous current one.
    fn append_artifact(
        &self,
        lead_id: Uuid,
        interaction_id: Option<Uuid>,
        payload: ArtifactPayload,
        now: DateTime<Utc>,
    ) -> StoreResult<ContextArtifact>;
    /// Full history of one kind, oldest first.
    fn artifacts_of_kind(&self, lead_id: Uuid, kind: ArtifactKind)
        -> StoreResult<Vec<ContextArtifact>>;
    fn current_artifacts(&self, lead_id: Uuid) -> StoreResult<Vec<ContextArtifact>>;

    // ---- decisions ----
    fn current_decision(&self, lead_id: Uuid) -> StoreResult<Option<NbaDecision>>;
    /// Newest first.
    fn decision_history(&self, lead_id: Uuid, limit: usize) -> StoreResult<Vec<NbaDecision>>;
    /// Marks every current decision superseded; returns their ids.
    fn supersede_current_decisions(&self, lead_id: Uuid) -> StoreResult<Vec<Uuid>>;
    fn insert_decision(&self, decision: NbaDecision) -> StoreResult<NbaDecision>;

    // ---- scheduled actions ----
    fn insert_scheduled_action(&self, action: ScheduledAction) -> StoreResult<()>;
    /// Cancels still-pending actions tied to `decision_ids`; returns how many.
    fn cancel_pending_actions(&self, decision_ids: &[Uuid]) -> StoreResult<usize>;
    /// Ordered by `scheduled_at`.
    fn scheduled_actions(&self, status: ScheduledStatus, limit: usize)
        -> StoreResult<Vec<ScheduledAction>>;

    // ---- Q table ----
    fn q_entry(&self, state: &str, action: Action) -> StoreResult<Option<QEntry>>;
    fn q_entries_for_state(&self, state: &str) -> StoreResult<Vec<QEntry>>;
    /// Best recorded value for `state`, 0.0 when nothing is recorded.
    fn max_q(&self, state: &str) -> StoreResult<f64>;
    /// Atomic read-modify-write of one entry (created with a zero prior on first use).
    /// Returns (before, after).
    fn update_q_entry(
        &self,
        state: &str,
        action: Action,
        update: QUpdate<'_>,
    ) -> StoreResult<(QEntry, QEntry)>;

    // ---- transitions ----
    fn append_transition(&self, transition: StateTransition) -> StoreResult<()>;
    fn transitions_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<StateTransition>>;

    // ---- message buffer ----
    fn insert_buffered(&self, message: BufferedMessage) -> StoreResult<()>;
    fn pending_summary(&self, lead_id: Uuid) -> StoreResult<Option<PendingSummary>>;
    /// Atomically marks every unflushed row of the lead flushed and returns them in
    /// arrival order. A concurrent second call sees nothing.
    fn take_unflushed(&self, lead_id: Uuid) -> StoreResult<Vec<BufferedMessage>>;
    /// Leads with an unflushed row received at or before `cutoff`.
    fn leads_with_stale_messages(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;
    fn buffered_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<BufferedMessage>>;
    fn leads_with_pending_messages(&self) -> StoreResult<usize>;

    // ---- events ----
    fn append_event(&self, event: Event) -> StoreResult<()>;
    fn events_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Event>>;
}
