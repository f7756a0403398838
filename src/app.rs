use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config;
use crate::database::DatabaseManager;
use crate::handlers;
use crate::middleware::actor_auth_middleware;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth_routes())
        .merge(appointment_routes())
        .merge(record_routes())
        .merge(patient_routes())
        .merge(conversation_routes())
        .merge(collab_routes())
        .route("/api/ai/chat", post(handlers::protected::ai::chat))
        .route("/api/dashboard", get(handlers::protected::dashboard::overview))
        .route_layer(middleware::from_fn_with_state(state.clone(), actor_auth_middleware));

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Protected
        .merge(api)
        .layer(DefaultBodyLimit::max(config::config().api.max_request_size_bytes))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use handlers::public::auth;

    Router::new()
        .route("/auth/doctors/register", post(auth::register_post))
        .route("/auth/doctors/login", post(auth::login_post))
        .route("/auth/refresh", post(auth::refresh_post))
}

fn auth_routes() -> Router<AppState> {
    use handlers::protected::{auth, doctors};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/doctors", get(doctors::directory))
        .route("/api/doctors/me", put(doctors::update_me))
}

fn appointment_routes() -> Router<AppState> {
    use handlers::protected::appointments;

    Router::new()
        .route("/api/appointments", get(appointments::list).post(appointments::create))
        .route(
            "/api/appointments/:id",
            get(appointments::show)
                .patch(appointments::update)
                .delete(appointments::delete),
        )
        .route("/api/appointments/:id/status", post(appointments::set_status))
        .route("/api/appointments/:id/video-token", post(appointments::video_token))
}

fn record_routes() -> Router<AppState> {
    use handlers::protected::records;

    Router::new()
        .route("/api/records", get(records::list).post(records::create))
        .route(
            "/api/records/:id",
            get(records::show).patch(records::update).delete(records::delete),
        )
}

fn patient_routes() -> Router<AppState> {
    use handlers::protected::patients;

    Router::new()
        .route("/api/patients", get(patients::list))
        .route("/api/patients/:id", get(patients::show))
}

fn conversation_routes() -> Router<AppState> {
    use handlers::protected::conversations;

    Router::new()
        .route("/api/conversations", get(conversations::list).post(conversations::open))
        .route("/api/conversations/:id", get(conversations::show))
        .route(
            "/api/conversations/:id/messages",
            get(conversations::messages).post(conversations::send),
        )
        .route("/api/conversations/:id/read", post(conversations::mark_read))
        .route("/api/conversations/:id/conclude", post(conversations::conclude))
        .route("/api/conversations/:id/block", post(conversations::block))
        .route("/api/conversations/:id/reopen", post(conversations::reopen))
}

fn collab_routes() -> Router<AppState> {
    use handlers::protected::collab;

    Router::new()
        .route("/api/collab/threads", get(collab::list_threads).post(collab::open_thread))
        .route(
            "/api/collab/threads/:id/messages",
            get(collab::messages).post(collab::send),
        )
}

/// Explicit origins from config; `*` (or nothing configured) allows any origin
fn cors_layer() -> CorsLayer {
    let origins = &config::config().security.cors_origins;
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(tower_http::cors::Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    base.allow_origin(parsed)
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "MedConsult API",
            "version": version,
            "description": "Doctor dashboard backend: appointments, records, patient messaging and clinic collaboration",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "public_auth": "/auth/doctors/register, /auth/doctors/login, /auth/refresh (public - token acquisition)",
                "auth": "/api/auth/whoami, /api/doctors[/me] (protected)",
                "appointments": "/api/appointments[/:id][/status|/video-token] (protected)",
                "records": "/api/records[/:id] (protected)",
                "patients": "/api/patients[/:id] (protected, doctor)",
                "conversations": "/api/conversations[/:id][/messages|/read|/conclude|/block|/reopen] (protected)",
                "collab": "/api/collab/threads[/:id/messages] (protected, doctor)",
                "ai": "/api/ai/chat (protected, doctor)",
                "dashboard": "/api/dashboard (protected, doctor)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}
