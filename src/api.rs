use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::batcher::Batcher;
use crate::brief::build_brief_named;
use crate::decision::ActionBrief;
use crate::engine::stop_brief;
use crate::error::{ErrorKind, NbaError, Stage, StageExt};
use crate::model::{
    Action, Direction, Lead, NbaDecision, NewInteraction, NewLead, ScheduledAction,
    ScheduledStatus,
};
use crate::pipeline::Pipeline;
use crate::policy::{compliance_override, encode_state, load_policy_inputs, PolicyInputs};
use crate::store::Store;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;
const DEFAULT_SCHEDULED_LIMIT: usize = 50;
const MAX_SCHEDULED_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub pipeline: Arc<Pipeline>,
    pub batcher: Arc<Batcher>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/leads", post(create_lead))
        .route("/leads/{id}", get(get_lead))
        .route("/leads/{id}/nba", get(current_nba))
        .route("/leads/{id}/nba/history", get(nba_history))
        .route("/leads/{id}/nba/recompute", post(recompute_nba))
        .route("/leads/{id}/policy-inputs", get(policy_inputs))
        .route("/leads/{id}/brief", get(preview_brief))
        .route("/interactions", post(submit_interaction))
        .route("/sms", post(receive_sms))
        .route("/scheduled-actions", get(scheduled_actions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
    lead_id: Option<Uuid>,
    stage: Stage,
}

impl IntoResponse for NbaError {
    fn into_response(self) -> Response {
        let status = match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(target: "api", error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind,
            lead_id: self.lead_id,
            stage: self.stage,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, NbaError>;

fn load_lead(store: &dyn Store, id: Uuid) -> ApiResult<Lead> {
    store
        .lead(id)
        .at(Stage::LoadLead, id)?
        .ok_or_else(|| NbaError::not_found(Stage::LoadLead, id, "lead"))
}

async fn create_lead(
    State(state): State<AppState>,
    Json(body): Json<NewLead>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    if body.first_name.trim().is_empty() {
        return Err(NbaError::invalid(Stage::LoadLead, "first_name is required"));
    }
    let lead = body.into_lead(Utc::now());
    let id = lead.id;
    let lead = state.store.insert_lead(lead).at(Stage::LoadLead, id)?;
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn get_lead(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Lead>> {
    Ok(Json(load_lead(state.store.as_ref(), id)?))
}

#[derive(Deserialize)]
struct InteractionReq {
    lead_id: Uuid,
    #[serde(flatten)]
    interaction: NewInteraction,
}

#[derive(Serialize)]
struct InteractionResp {
    interaction_id: Uuid,
    lead_id: Uuid,
    steps: Vec<String>,
    brief: ActionBrief,
}

async fn submit_interaction(
    State(state): State<AppState>,
    Json(body): Json<InteractionReq>,
) -> ApiResult<(StatusCode, Json<InteractionResp>)> {
    let out = state
        .pipeline
        .process_new(body.lead_id, body.interaction)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(InteractionResp {
            interaction_id: out.interaction_id,
            lead_id: out.lead_id,
            steps: out.steps,
            brief: out.decision.brief,
        }),
    ))
}

#[derive(Deserialize)]
struct SmsReq {
    lead_id: Uuid,
    body: String,
    #[serde(default = "inbound")]
    direction: Direction,
    #[serde(default)]
    sender: Option<String>,
}

fn inbound() -> Direction {
    Direction::Inbound
}

#[derive(Serialize)]
struct SmsResp {
    interaction_id: Uuid,
    buffer_id: Uuid,
    lead_id: Uuid,
    flushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_steps: Option<Vec<String>>,
}

async fn receive_sms(
    State(state): State<AppState>,
    Json(body): Json<SmsReq>,
) -> ApiResult<(StatusCode, Json<SmsResp>)> {
    let received = state
        .batcher
        .receive(body.lead_id, body.direction, &body.body, body.sender, Utc::now())
        .await?;
    if received.flushed.is_none() {
        state.batcher.spawn_recheck(body.lead_id);
    }
    Ok((
        StatusCode::CREATED,
        Json(SmsResp {
            interaction_id: received.interaction_id,
            buffer_id: received.buffer_id,
            lead_id: received.lead_id,
            flushed: received.flushed.is_some(),
            processing_steps: received.flushed.map(|o| o.steps),
        }),
    ))
}

/// `null` until the lead has a decision.
async fn current_nba(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Option<NbaDecision>>> {
    load_lead(state.store.as_ref(), id)?;
    Ok(Json(
        state
            .store
            .current_decision(id)
            .at(Stage::ComputeNba, id)?,
    ))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn nba_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Json<Vec<NbaDecision>>> {
    load_lead(state.store.as_ref(), id)?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    Ok(Json(
        state
            .store
            .decision_history(id, limit)
            .at(Stage::ComputeNba, id)?,
    ))
}

async fn recompute_nba(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<NbaDecision>> {
    Ok(Json(state.pipeline.recompute(id).await?))
}

#[derive(Serialize)]
struct PolicyInputsResp {
    state: String,
    inputs: PolicyInputs,
}

async fn policy_inputs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PolicyInputsResp>> {
    let inputs = load_policy_inputs(state.store.as_ref(), id, Utc::now())?;
    Ok(Json(PolicyInputsResp {
        state: encode_state(&inputs),
        inputs,
    }))
}

#[derive(Deserialize)]
struct BriefQuery {
    action: String,
}

/// Renders the brief a given action would get right now. Nothing is persisted;
/// compliance still wins over the requested action.
async fn preview_brief(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<BriefQuery>,
) -> ApiResult<Json<ActionBrief>> {
    let now = Utc::now();
    let inputs = load_policy_inputs(state.store.as_ref(), id, now)?;
    let key = encode_state(&inputs);
    if let Some(stop) = compliance_override(&inputs) {
        return Ok(Json(stop_brief(stop, &inputs, &key, now)));
    }
    let action = Action::parse(&q.action).unwrap_or(Action::GentleNudge);
    let q_value = state
        .store
        .q_entry(&key, action)
        .at(Stage::ComputeNba, id)?
        .map_or(0.0, |e| e.value);
    Ok(Json(build_brief_named(&q.action, &inputs, &key, q_value, now)))
}

#[derive(Deserialize)]
struct ScheduledQuery {
    status: Option<String>,
    limit: Option<usize>,
}

async fn scheduled_actions(
    State(state): State<AppState>,
    Query(q): Query<ScheduledQuery>,
) -> ApiResult<Json<Vec<ScheduledAction>>> {
    let status = match q.status.as_deref() {
        None => ScheduledStatus::Pending,
        Some(raw) => ScheduledStatus::parse(raw).ok_or_else(|| {
            NbaError::invalid(Stage::PersistDecision, format!("unknown status '{raw}'"))
        })?,
    };
    let limit = q
        .limit
        .unwrap_or(DEFAULT_SCHEDULED_LIMIT)
        .clamp(1, MAX_SCHEDULED_LIMIT);
    let rows = state
        .store
        .scheduled_actions(status, limit)
        .map_err(|e| NbaError::new(ErrorKind::Store, Stage::PersistDecision, e.to_string()))?;
    Ok(Json(rows))
}
