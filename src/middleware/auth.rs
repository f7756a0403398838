use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{self, JwtError};
use crate::database::models::conversation::ActorKind;
use crate::error::ApiError;
use crate::integrations::PatientIdentity;
use crate::services::DoctorService;
use crate::state::AppState;

/// Authenticated doctor, loaded fresh from the doctors table
#[derive(Clone, Debug, Serialize)]
pub struct DoctorActor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub clinic: String,
}

/// Who is calling. Injected into request extensions by [`actor_auth_middleware`].
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Actor {
    Doctor(DoctorActor),
    Patient(PatientIdentity),
}

impl Actor {
    pub fn id(&self) -> Uuid {
        match self {
            Actor::Doctor(doctor) => doctor.id,
            Actor::Patient(patient) => patient.id,
        }
    }

    pub fn kind(&self) -> ActorKind {
        match self {
            Actor::Doctor(_) => ActorKind::Doctor,
            Actor::Patient(_) => ActorKind::Patient,
        }
    }

    pub fn require_doctor(&self) -> Result<&DoctorActor, ApiError> {
        match self {
            Actor::Doctor(doctor) => Ok(doctor),
            Actor::Patient(_) => Err(ApiError::forbidden("This action is only available to doctors")),
        }
    }

    pub fn require_patient(&self) -> Result<&PatientIdentity, ApiError> {
        match self {
            Actor::Patient(patient) => Ok(patient),
            Actor::Doctor(_) => Err(ApiError::forbidden("This action is only available to patients")),
        }
    }
}

/// Resolves the bearer token to a doctor (local JWT) or a patient (identity
/// provider) and injects the [`Actor`].
pub async fn actor_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers()).map_err(ApiError::unauthorized)?;
    let actor = resolve_actor(&state, &token).await?;

    tracing::debug!("Authenticated {} {}", actor.kind().as_str(), actor.id());
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}

async fn resolve_actor(state: &AppState, token: &str) -> Result<Actor, ApiError> {
    match auth::validate_jwt(token, false) {
        Ok(claims) => {
            let doctor = DoctorService::new(state.pool.clone())
                .find_by_id(claims.sub)
                .await?
                .filter(|doctor| doctor.is_active)
                .ok_or_else(|| {
                    tracing::warn!("Token presented for missing or inactive doctor {}", claims.sub);
                    ApiError::forbidden("Doctor account is not active")
                })?;

            Ok(Actor::Doctor(DoctorActor {
                id: doctor.id,
                name: doctor.name,
                email: doctor.email,
                clinic: doctor.clinic,
            }))
        }
        Err(JwtError::Invalid(_)) => {
            // Not one of ours; patients carry identity provider tokens
            let Some(directory) = state.patients.as_deref() else {
                return Err(ApiError::unauthorized("Invalid token"));
            };
            let identity = directory.verify_token(token).await?;
            Ok(Actor::Patient(identity))
        }
        Err(other) => Err(other.into()),
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty bearer token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_extracted() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn malformed_headers_rejected() {
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
        assert!(extract_bearer_token(&headers("Basic dXNlcg==")).is_err());
        assert!(extract_bearer_token(&headers("Bearer   ")).is_err());
    }

    #[test]
    fn actor_type_guards() {
        let patient = Actor::Patient(PatientIdentity {
            id: Uuid::new_v4(),
            email: None,
            full_name: None,
        });
        assert_eq!(patient.kind(), ActorKind::Patient);
        assert!(patient.require_doctor().is_err());
        assert!(patient.require_patient().is_ok());
    }
}
