// handlers/public/auth/mod.rs - Doctor token acquisition

use serde::Serialize;

use crate::auth::{self, Claims};
use crate::database::models::doctor::Doctor;
use crate::error::ApiError;

pub mod login; // POST /auth/doctors/login
pub mod refresh; // POST /auth/refresh
pub mod register; // POST /auth/doctors/register

pub use login::login_post;
pub use refresh::refresh_post;
pub use register::register_post;

/// `{token, doctor, expires_in}` returned by every token endpoint
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub doctor: Doctor,
    pub expires_in: i64,
}

pub(crate) fn issue_token(doctor: Doctor) -> Result<TokenResponse, ApiError> {
    let claims = Claims::for_doctor(&doctor);
    let token = auth::generate_jwt(&claims)?;
    Ok(TokenResponse {
        token,
        expires_in: claims.expires_in(),
        doctor,
    })
}
