use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::crypto::MessageCipher;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::integrations::{ChatCompletion, MistralClient, PatientDirectory, RtcTokenBuilder, SupabaseClient};

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cipher: Arc<MessageCipher>,
    pub patients: Option<Arc<dyn PatientDirectory>>,
    pub chat: Option<Arc<dyn ChatCompletion>>,
    pub video: Option<Arc<RtcTokenBuilder>>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let pool = DatabaseManager::connect_lazy(&config.database)?;
        let cipher = MessageCipher::from_config(config)?;

        let patients = SupabaseClient::from_config(&config.integrations)?
            .map(|client| Arc::new(client) as Arc<dyn PatientDirectory>);
        let chat = MistralClient::from_config(&config.integrations)?
            .map(|client| Arc::new(client) as Arc<dyn ChatCompletion>);
        let video = RtcTokenBuilder::from_config(&config.integrations).map(Arc::new);

        for (name, enabled) in [
            ("supabase", patients.is_some()),
            ("mistral", chat.is_some()),
            ("agora", video.is_some()),
        ] {
            if enabled {
                tracing::info!("Integration enabled: {}", name);
            } else {
                tracing::warn!("Integration disabled (not configured): {}", name);
            }
        }

        Ok(Self {
            pool,
            cipher: Arc::new(cipher),
            patients,
            chat,
            video,
        })
    }

    pub fn chat(&self) -> Result<&dyn ChatCompletion, ApiError> {
        self.chat
            .as_deref()
            .ok_or_else(|| ApiError::service_unavailable("Mistral integration is not configured"))
    }

    pub fn video(&self) -> Result<&RtcTokenBuilder, ApiError> {
        self.video
            .as_deref()
            .ok_or_else(|| ApiError::service_unavailable("Agora integration is not configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    // the lazy pool spawns its maintenance task, so this needs a runtime
    #[tokio::test]
    async fn production_refuses_to_start_without_jwt_secret() {
        let mut config = AppConfig::from_env();
        config.environment = Environment::Production;
        config.database.url = "postgres://medconsult@127.0.0.1:1/medconsult".to_string();
        config.security.message_key_hex = Some("ab".repeat(32));
        config.security.jwt_secret = String::new();

        let err = AppState::from_config(&config).err().expect("empty secret must be refused");
        assert!(err.to_string().contains("JWT_SECRET"), "{}", err);

        config.security.jwt_secret = "prod-secret".to_string();
        assert!(AppState::from_config(&config).is_ok());
    }
}
