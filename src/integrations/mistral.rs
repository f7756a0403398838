use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, upstream_error, ChatCompletion, ChatMessage, ChatReply, ChatUsage, IntegrationError};
use crate::config::IntegrationsConfig;

const SERVICE: &str = "Mistral";

/// Prepended to every conversation sent upstream
pub const CLINICAL_SYSTEM_PROMPT: &str = "You are a clinical assistant supporting a licensed physician. \
Answer concisely, cite uncertainty, and never present output as a final diagnosis.";

pub struct MistralClient {
    base_url: String,
    api_key: String,
    default_model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl MistralClient {
    pub fn from_config(config: &IntegrationsConfig) -> Result<Option<Self>, IntegrationError> {
        let Some(api_key) = config.mistral_api_key.as_deref() else {
            return Ok(None);
        };
        Ok(Some(Self {
            base_url: config.mistral_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: config.mistral_model.clone(),
            http: http_client()?,
        }))
    }

    fn with_system_prompt(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(ChatMessage {
            role: "system".to_string(),
            content: CLINICAL_SYSTEM_PROMPT.to_string(),
        });
        out.extend(messages);
        out
    }
}

#[async_trait]
impl ChatCompletion for MistralClient {
    async fn complete(&self, model: Option<&str>, messages: Vec<ChatMessage>) -> Result<ChatReply, IntegrationError> {
        let model = model.unwrap_or(self.default_model.as_str());
        let body = CompletionRequest {
            model,
            messages: Self::with_system_prompt(messages),
            temperature: 0.3,
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(SERVICE, response).await);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| IntegrationError::InvalidResponse("completion had no choices".to_string()))?;

        Ok(ChatReply {
            reply,
            model: completion.model.unwrap_or_else(|| model.to_string()),
            usage: completion.usage,
        })
    }
}
