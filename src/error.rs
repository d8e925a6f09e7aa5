//! Tagged errors surfaced by the decisioning core.
//!
//! Every failure that cannot be absorbed locally carries what went wrong, which lead it
//! concerned and which pipeline stage produced it.

use serde::Serialize;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Store,
}

/// Pipeline step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadLead,
    RecordInteraction,
    PersistArtifacts,
    UpdateStatus,
    RewardUpdate,
    ComputeNba,
    PersistDecision,
    Flush,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadLead => "load_lead",
            Stage::RecordInteraction => "record_interaction",
            Stage::PersistArtifacts => "persist_artifacts",
            Stage::UpdateStatus => "update_status",
            Stage::RewardUpdate => "reward_update",
            Stage::ComputeNba => "compute_nba",
            Stage::PersistDecision => "persist_decision",
            Stage::Flush => "flush",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} failed for lead {}: {message}", lead_label(.lead_id))]
pub struct NbaError {
    pub kind: ErrorKind,
    pub lead_id: Option<Uuid>,
    pub stage: Stage,
    pub message: String,
}

fn lead_label(id: &Option<Uuid>) -> String {
    id.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl NbaError {
    pub fn new(kind: ErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            lead_id: None,
            stage,
            message: message.into(),
        }
    }

    pub fn not_found(stage: Stage, lead_id: Uuid, what: &str) -> Self {
        Self::new(ErrorKind::NotFound, stage, format!("{what} not found")).for_lead(lead_id)
    }

    pub fn invalid(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, stage, message)
    }

    pub fn for_lead(mut self, lead_id: Uuid) -> Self {
        self.lead_id = Some(lead_id);
        self
    }

    /// Fills in the lead only when the error does not name one yet.
    pub fn or_lead(mut self, lead_id: Uuid) -> Self {
        self.lead_id.get_or_insert(lead_id);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Attaches stage + lead to store failures at the call site.
pub trait StageExt<T> {
    fn at(self, stage: Stage, lead_id: Uuid) -> Result<T, NbaError>;
}

impl<T> StageExt<T> for Result<T, StoreError> {
    fn at(self, stage: Stage, lead_id: Uuid) -> Result<T, NbaError> {
        self.map_err(|e| {
            let kind = match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                _ => ErrorKind::Store,
            };
            NbaError::new(kind, stage, e.to_string()).for_lead(lead_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_lead() {
        let id = Uuid::nil();
        let e = NbaError::not_found(Stage::LoadLead, id, "lead");
        let text = e.to_string();
        assert!(text.starts_with("load_lead failed for lead 00000000-"));
        assert!(text.ends_with("lead not found"));
        assert!(e.is_not_found());
    }

    #[test]
    fn store_errors_keep_their_kind() {
        let r: Result<(), StoreError> = Err(StoreError::NotFound("interaction".into()));
        let e = r.at(Stage::Flush, Uuid::nil()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::NotFound);
        assert_eq!(e.stage, Stage::Flush);

        let r: Result<(), StoreError> = Err(StoreError::Backend("poisoned".into()));
        assert_eq!(r.at(Stage::RewardUpdate, Uuid::nil()).unwrap_err().kind, ErrorKind::Store);
    }

    #[test]
    fn or_lead_keeps_an_existing_lead() {
        let first = Uuid::new_v4();
        let e = NbaError::not_found(Stage::LoadLead, first, "lead").or_lead(Uuid::nil());
        assert_eq!(e.lead_id, Some(first));
        let e = NbaError::invalid(Stage::Flush, "x").or_lead(first);
        assert_eq!(e.lead_id, Some(first));
    }
}
