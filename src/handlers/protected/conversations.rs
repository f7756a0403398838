// handlers/protected/conversations.rs - /api/conversations
//
// Doctor–patient threads. Both actor types share these routes; the service
// scopes every query to the caller's side of the conversation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::conversation::{Conversation, ConversationAction, ConversationStatus, ConversationSummary};
use crate::database::models::message::Message;
use crate::error::ApiError;
use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::services::conversation_service::OutgoingMessage;
use crate::services::{ConversationService, DoctorService};
use crate::state::AppState;

const DEFAULT_MESSAGE_PAGE: i64 = 50;
const MAX_MESSAGE_PAGE: i64 = 200;

/// Patients name a doctor, doctors name a patient
#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<ConversationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReadReceipt {
    pub marked_read: u64,
}

fn service(state: &AppState) -> ConversationService {
    ConversationService::new(state.pool.clone(), state.cipher.clone())
}

/// POST /api/conversations - 201 when created, 200 when the pair already had one
pub async fn open(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<OpenRequest>,
) -> ApiResult<Conversation> {
    let (doctor_id, patient_id) = match &actor {
        Actor::Patient(patient) => {
            let doctor_id = req
                .doctor_id
                .ok_or_else(|| ApiError::invalid_field("doctor_id", "doctor_id is required"))?;
            (doctor_id, patient.id)
        }
        Actor::Doctor(doctor) => {
            let patient_id = req
                .patient_id
                .ok_or_else(|| ApiError::invalid_field("patient_id", "patient_id is required"))?;
            (doctor.id, patient_id)
        }
    };

    DoctorService::new(state.pool.clone()).find_active(doctor_id).await?;

    let (conversation, created) = service(&state)
        .open(actor.kind(), doctor_id, patient_id, req.subject)
        .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(ApiResponse::with_status(conversation, status))
}

/// GET /api/conversations
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<ConversationSummary>> {
    let conversations = service(&state).list(actor.kind(), actor.id(), query.status).await?;
    Ok(ApiResponse::success(conversations))
}

/// GET /api/conversations/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Conversation> {
    let conversation = service(&state).get_for(actor.kind(), actor.id(), id).await?;
    Ok(ApiResponse::success(conversation))
}

/// GET /api/conversations/:id/messages
pub async fn messages(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Vec<Message>> {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_PAGE).clamp(1, MAX_MESSAGE_PAGE);
    let messages = service(&state)
        .messages(actor.kind(), actor.id(), id, query.before, limit)
        .await?;
    Ok(ApiResponse::success(messages))
}

/// POST /api/conversations/:id/messages
pub async fn send(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(outgoing): Json<OutgoingMessage>,
) -> ApiResult<Message> {
    let message = service(&state)
        .send_message(actor.kind(), actor.id(), id, outgoing)
        .await?;
    Ok(ApiResponse::created(message))
}

/// POST /api/conversations/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReadReceipt> {
    let marked_read = service(&state).mark_read(actor.kind(), actor.id(), id).await?;
    Ok(ApiResponse::success(ReadReceipt { marked_read }))
}

pub async fn conclude(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Conversation> {
    transition(&state, &actor, id, ConversationAction::Conclude).await
}

pub async fn block(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Conversation> {
    transition(&state, &actor, id, ConversationAction::Block).await
}

pub async fn reopen(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Conversation> {
    transition(&state, &actor, id, ConversationAction::Reopen).await
}

async fn transition(state: &AppState, actor: &Actor, id: Uuid, action: ConversationAction) -> ApiResult<Conversation> {
    let conversation = service(state).apply(actor.kind(), actor.id(), id, action).await?;
    Ok(ApiResponse::success(conversation))
}
