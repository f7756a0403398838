use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::database::models::doctor::Doctor;

pub const DOCTOR_ROLE: &str = "doctor";

/// Claims carried by locally issued doctor tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub clinic: String,
    pub role: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn for_doctor(doctor: &Doctor) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: doctor.id,
            email: doctor.email.clone(),
            name: doctor.name.clone(),
            clinic: doctor.clinic.clone(),
            role: DOCTOR_ROLE.to_string(),
            iss: config::config().security.jwt_issuer.clone(),
            exp,
            iat: now.timestamp(),
        }
    }

    pub fn expires_in(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT secret")]
    InvalidSecret,
    #[error("{0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
}

fn secret() -> Result<&'static str, JwtError> {
    let secret = config::config().security.jwt_secret.as_str();
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    Ok(secret)
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let encoding_key = EncodingKey::from_secret(secret()?.as_bytes());

    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Verifies signature, issuer and role. `allow_expired` skips the expiry check
/// so refresh can inspect stale tokens.
pub fn validate_jwt(token: &str, allow_expired: bool) -> Result<Claims, JwtError> {
    let decoding_key = DecodingKey::from_secret(secret()?.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = !allow_expired;
    validation.leeway = 0;
    validation.set_issuer(&[config::config().security.jwt_issuer.as_str()]);

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::Invalid(e.to_string()),
    })?;

    if token_data.claims.role != DOCTOR_ROLE {
        return Err(JwtError::Invalid("unsupported role".to_string()));
    }

    Ok(token_data.claims)
}

/// True when an expired token is still inside the refresh window
pub fn within_refresh_window(claims: &Claims) -> bool {
    let grace = Duration::days(config::config().security.refresh_grace_days);
    Utc::now().timestamp() <= claims.exp + grace.num_seconds()
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, config::config().security.bcrypt_cost)
}

/// Malformed stored hashes count as a mismatch
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Stored password hash could not be verified: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor() -> Doctor {
        Doctor {
            id: Uuid::new_v4(),
            name: "Dr. Ada Okafor".to_string(),
            email: "ada@northside.test".to_string(),
            password_hash: String::new(),
            specialty: Some("Cardiology".to_string()),
            bio: None,
            clinic: "northside".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trips_claims() {
        let doctor = doctor();
        let token = generate_jwt(&Claims::for_doctor(&doctor)).unwrap();
        let claims = validate_jwt(&token, false).unwrap();
        assert_eq!(claims.sub, doctor.id);
        assert_eq!(claims.clinic, "northside");
        assert_eq!(claims.role, DOCTOR_ROLE);
        assert!(claims.expires_in() > 0);
    }

    #[test]
    fn expired_token_rejected_unless_allowed() {
        let mut claims = Claims::for_doctor(&doctor());
        claims.exp = Utc::now().timestamp() - 60;
        let token = generate_jwt(&claims).unwrap();

        assert!(matches!(validate_jwt(&token, false), Err(JwtError::Expired)));
        let stale = validate_jwt(&token, true).unwrap();
        assert!(within_refresh_window(&stale));
    }

    #[test]
    fn refresh_window_closes() {
        let mut claims = Claims::for_doctor(&doctor());
        claims.exp = Utc::now().timestamp() - Duration::days(30).num_seconds();
        assert!(!within_refresh_window(&claims));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let token = generate_jwt(&Claims::for_doctor(&doctor())).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(validate_jwt(&tampered, false), Err(JwtError::Invalid(_))));
        assert!(matches!(validate_jwt("not-a-jwt", false), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
