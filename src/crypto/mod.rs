//! Authenticated encryption of message payloads.
//!
//! Blob layout: `[12-byte nonce][ciphertext + 16-byte tag]`. The plaintext is
//! the JSON form of [`MessagePayload`], so content and attachments are sealed
//! together and cannot be swapped between rows.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{AppConfig, Environment};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Stored in the plaintext `content` column once the payload is sealed
pub const ENCRYPTED_PLACEHOLDER: &str = "[encrypted]";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("message key must be 32 bytes of hex: {0}")]
    InvalidKey(String),
    #[error("message key is not configured")]
    MissingKey,
    #[error("encrypt: {0}")]
    Encrypt(String),
    #[error("decrypt: {0}")]
    Decrypt(String),
    #[error("ciphertext too short")]
    Truncated,
    #[error("payload serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// What gets sealed for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Structured extras such as a shared case card
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
            extra: None,
        }
    }
}

pub struct MessageCipher {
    key: Key<Aes256Gcm>,
}

impl MessageCipher {
    pub fn new(key_bytes: [u8; 32]) -> Self {
        Self {
            key: *Key::<Aes256Gcm>::from_slice(&key_bytes),
        }
    }

    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key_hex.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key_bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKey(format!("got {} bytes", v.len())))?;
        Ok(Self::new(key_bytes))
    }

    /// Development falls back to a key derived from the JWT secret.
    pub fn from_config(config: &AppConfig) -> Result<Self, CryptoError> {
        match config.security.message_key_hex.as_deref() {
            Some(key_hex) => Self::from_hex(key_hex),
            None if config.environment == Environment::Development => {
                tracing::warn!("MESSAGE_ENCRYPTION_KEY not set; deriving a development key from the JWT secret");
                let digest = Sha256::digest(format!("message-key:{}", config.security.jwt_secret).as_bytes());
                let mut key_bytes = [0u8; 32];
                key_bytes.copy_from_slice(&digest);
                Ok(Self::new(key_bytes))
            }
            None => Err(CryptoError::MissingKey),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.key)
    }

    pub fn seal(&self, payload: &MessagePayload) -> Result<Vec<u8>, CryptoError> {
        let plaintext = serde_json::to_vec(payload)?;
        // random nonce per message
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ct = self
            .cipher()
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ct);
        Ok(out)
    }

    pub fn open(&self, blob: &[u8]) -> Result<MessagePayload, CryptoError> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce_bytes, ct) = blob.split_at(NONCE_LEN);
        let pt = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ct)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;
        Ok(serde_json::from_slice(&pt)?)
    }
}
