// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (bearer token resolved to a doctor or patient actor)

pub mod public; // Tier 1: /auth/* token acquisition
pub mod protected; // Tier 2: /api/* behind actor_auth_middleware
