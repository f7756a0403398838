//! Thin clients for the hosted platforms the API leans on.
//!
//! Patient identity and profiles come from Supabase, chat completions from
//! Mistral, and video access tokens are signed locally for Agora. The traits
//! here are the seams handlers depend on, so tests can swap in stubs.

pub mod agora;
pub mod mistral;
pub mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub use agora::{RtcRole, RtcTokenBuilder};
pub use mistral::MistralClient;
pub use supabase::SupabaseClient;

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("token rejected by identity provider")]
    Unauthorized,

    #[error("{service} returned {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("signing: {0}")]
    Signing(String),
}

/// Identity of a patient as asserted by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: Uuid,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// Resolves a patient bearer token to an identity
    async fn verify_token(&self, token: &str) -> Result<PatientIdentity, IntegrationError>;

    /// Fetches stored profiles; unknown ids are simply absent
    async fn profiles(&self, ids: &[Uuid]) -> Result<Vec<PatientProfile>, IntegrationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub model: String,
    pub usage: ChatUsage,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, model: Option<&str>, messages: Vec<ChatMessage>) -> Result<ChatReply, IntegrationError>;
}

pub(crate) fn http_client() -> Result<reqwest::Client, IntegrationError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("medconsult-api/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Reads an error body without failing on undecodable payloads
pub(crate) async fn upstream_error(service: &'static str, response: reqwest::Response) -> IntegrationError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    let message = message.chars().take(300).collect();
    IntegrationError::Upstream { service, status, message }
}
