pub mod auth;
pub mod response;

pub use auth::{actor_auth_middleware, Actor, DoctorActor};
pub use response::{ApiResponse, ApiResult};
