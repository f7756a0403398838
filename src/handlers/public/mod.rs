// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Doctor registration, login and token refresh. Patients authenticate with
// the identity provider and never hit these routes.

pub mod auth;
