// handlers/protected/ai.rs - POST /api/ai/chat (doctor only)

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::error::ApiError;
use crate::integrations::{ChatMessage, ChatReply};
use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::state::AppState;

pub const MAX_CHAT_MESSAGES: usize = 50;
const MAX_MESSAGE_CHARS: usize = 20_000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<ChatReply> {
    let doctor = actor.require_doctor()?;
    let client = state.chat()?;
    validate_messages(&req.messages)?;

    let model = req.model.as_deref().map(str::trim).filter(|m| !m.is_empty());
    let count = req.messages.len();
    let reply = client.complete(model, req.messages).await?;

    tracing::info!(
        "AI chat for doctor {}: {} messages, model {}, {} tokens",
        doctor.id,
        count,
        reply.model,
        reply.usage.total_tokens
    );
    Ok(ApiResponse::success(reply))
}

pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), ApiError> {
    if messages.is_empty() || messages.len() > MAX_CHAT_MESSAGES {
        return Err(ApiError::invalid_field(
            "messages",
            format!("Between 1 and {} messages are required", MAX_CHAT_MESSAGES),
        ));
    }
    for message in messages {
        if message.role != "user" && message.role != "assistant" {
            return Err(ApiError::invalid_field("messages", "Role must be user or assistant"));
        }
        if message.content.trim().is_empty() || message.content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ApiError::invalid_field(
                "messages",
                format!("Message content must be 1 to {} characters", MAX_MESSAGE_CHARS),
            ));
        }
    }
    Ok(())
}
