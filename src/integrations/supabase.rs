use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use super::{http_client, upstream_error, IntegrationError, PatientDirectory, PatientIdentity, PatientProfile};
use crate::config::IntegrationsConfig;

const SERVICE: &str = "Supabase";
const PROFILE_BATCH: usize = 100;

/// Patient identity and profile lookups against a Supabase project
pub struct SupabaseClient {
    base: Url,
    anon_key: String,
    service_key: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl SupabaseClient {
    /// `None` when the project URL or anon key is missing
    pub fn from_config(config: &IntegrationsConfig) -> Result<Option<Self>, IntegrationError> {
        let (Some(url), Some(anon_key)) = (config.supabase_url.as_deref(), config.supabase_anon_key.as_deref()) else {
            return Ok(None);
        };
        Ok(Some(Self::new(url, anon_key, config.supabase_service_key.clone())?))
    }

    pub fn new(url: &str, anon_key: &str, service_key: Option<String>) -> Result<Self, IntegrationError> {
        let mut raw = url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| IntegrationError::InvalidResponse(format!("supabase url: {}", e)))?;

        Ok(Self {
            base,
            anon_key: anon_key.to_string(),
            service_key,
            http: http_client()?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IntegrationError> {
        self.base
            .join(path)
            .map_err(|e| IntegrationError::InvalidResponse(format!("supabase url: {}", e)))
    }

    fn profiles_url(&self, ids: &[Uuid]) -> Result<Url, IntegrationError> {
        let mut url = self.endpoint("rest/v1/profiles")?;
        let id_list = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        url.query_pairs_mut()
            .append_pair("select", "id,full_name,email,phone,date_of_birth,gender,avatar_url")
            .append_pair("id", &format!("in.({})", id_list));
        Ok(url)
    }
}

#[async_trait]
impl PatientDirectory for SupabaseClient {
    async fn verify_token(&self, token: &str) -> Result<PatientIdentity, IntegrationError> {
        let response = self
            .http
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(IntegrationError::Unauthorized),
            _ => return Err(upstream_error(SERVICE, response).await),
        }

        let user: SupabaseUser = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

        let full_name = ["full_name", "name"]
            .iter()
            .find_map(|key| user.user_metadata.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string);

        Ok(PatientIdentity {
            id: user.id,
            email: user.email,
            full_name,
        })
    }

    async fn profiles(&self, ids: &[Uuid]) -> Result<Vec<PatientProfile>, IntegrationError> {
        let Some(service_key) = self.service_key.as_deref() else {
            return Err(IntegrationError::NotConfigured("Supabase service role"));
        };

        let mut profiles = Vec::with_capacity(ids.len());
        for batch in ids.chunks(PROFILE_BATCH) {
            let response = self
                .http
                .get(self.profiles_url(batch)?)
                .header("apikey", service_key)
                .bearer_auth(service_key)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(upstream_error(SERVICE, response).await);
            }

            let mut page: Vec<PatientProfile> = response
                .json()
                .await
                .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;
            profiles.append(&mut page);
        }

        tracing::debug!("Fetched {} of {} patient profiles", profiles.len(), ids.len());
        Ok(profiles)
    }
}
