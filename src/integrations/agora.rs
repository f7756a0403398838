//! Agora RTC access tokens (format version 006).
//!
//! Token: `"006" + app_id + base64(content)` where
//! `content = bytes(signature) | u32 crc32(channel) | u32 crc32(uid) | bytes(message)`
//! and `message = u32 salt | u32 ts | map<u16 privilege, u32 expire_ts>`.
//! All integers little endian, `bytes` is a u16 length prefix. The signature
//! is HMAC-SHA256 over `app_id | channel | uid | message` keyed with the app
//! certificate. Uid 0 is encoded as the empty string.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::IntegrationError;
use crate::config::IntegrationsConfig;

const VERSION: &str = "006";
const MESSAGE_TTL_SECS: u32 = 24 * 3600;

const PRIV_JOIN_CHANNEL: u16 = 1;
const PRIV_PUBLISH_AUDIO: u16 = 2;
const PRIV_PUBLISH_VIDEO: u16 = 3;
const PRIV_PUBLISH_DATA: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtcRole {
    #[default]
    Publisher,
    Subscriber,
}

#[derive(Debug, Clone, Serialize)]
pub struct RtcToken {
    pub token: String,
    pub app_id: String,
    pub channel: String,
    pub uid: u32,
    pub role: RtcRole,
    pub expires_at: i64,
}

pub struct RtcTokenBuilder {
    app_id: String,
    app_certificate: String,
    ttl_secs: u32,
}

impl RtcTokenBuilder {
    pub fn from_config(config: &IntegrationsConfig) -> Option<Self> {
        match (config.agora_app_id.as_deref(), config.agora_app_certificate.as_deref()) {
            (Some(app_id), Some(cert)) => Some(Self::new(app_id, cert, config.agora_token_ttl_secs)),
            _ => None,
        }
    }

    pub fn new(app_id: &str, app_certificate: &str, ttl_secs: u32) -> Self {
        Self {
            app_id: app_id.to_string(),
            app_certificate: app_certificate.to_string(),
            ttl_secs,
        }
    }

    pub fn build(&self, channel: &str, uid: u32, role: RtcRole) -> Result<RtcToken, IntegrationError> {
        let now = Utc::now().timestamp() as u32;
        let privilege_expire = now.saturating_add(self.ttl_secs);
        let salt = rand::thread_rng().gen_range(1..=99_999_999);

        let token = self.build_with(channel, uid, role, privilege_expire, salt, now.saturating_add(MESSAGE_TTL_SECS))?;
        Ok(RtcToken {
            token,
            app_id: self.app_id.clone(),
            channel: channel.to_string(),
            uid,
            role,
            expires_at: privilege_expire as i64,
        })
    }

    fn build_with(
        &self,
        channel: &str,
        uid: u32,
        role: RtcRole,
        privilege_expire: u32,
        salt: u32,
        ts: u32,
    ) -> Result<String, IntegrationError> {
        let uid_str = if uid == 0 { String::new() } else { uid.to_string() };

        let mut privileges = vec![(PRIV_JOIN_CHANNEL, privilege_expire)];
        if role == RtcRole::Publisher {
            privileges.extend([
                (PRIV_PUBLISH_AUDIO, privilege_expire),
                (PRIV_PUBLISH_VIDEO, privilege_expire),
                (PRIV_PUBLISH_DATA, privilege_expire),
            ]);
        }

        let mut message = Vec::new();
        message.extend_from_slice(&salt.to_le_bytes());
        message.extend_from_slice(&ts.to_le_bytes());
        message.extend_from_slice(&(privileges.len() as u16).to_le_bytes());
        for (privilege, expire) in &privileges {
            message.extend_from_slice(&privilege.to_le_bytes());
            message.extend_from_slice(&expire.to_le_bytes());
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(self.app_certificate.as_bytes())
            .map_err(|e| IntegrationError::Signing(e.to_string()))?;
        mac.update(self.app_id.as_bytes());
        mac.update(channel.as_bytes());
        mac.update(uid_str.as_bytes());
        mac.update(&message);
        let signature = mac.finalize().into_bytes();

        let mut content = Vec::with_capacity(signature.len() + message.len() + 12);
        pack_bytes(&mut content, &signature);
        content.extend_from_slice(&crc32fast::hash(channel.as_bytes()).to_le_bytes());
        content.extend_from_slice(&crc32fast::hash(uid_str.as_bytes()).to_le_bytes());
        pack_bytes(&mut content, &message);

        Ok(format!("{}{}{}", VERSION, self.app_id, STANDARD.encode(content)))
    }
}

fn pack_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
}
