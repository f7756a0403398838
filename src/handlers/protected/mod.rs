// handlers/protected/mod.rs - Protected handlers (bearer token required)
//
// Every route here runs behind actor_auth_middleware, which injects an
// `Actor` (doctor or patient). Doctor-only routes call `require_doctor`.

pub mod ai;
pub mod appointments;
pub mod auth;
pub mod collab;
pub mod conversations;
pub mod dashboard;
pub mod doctors;
pub mod patients;
pub mod records;
