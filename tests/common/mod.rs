#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use medconsult_api::config::DatabaseConfig;
use medconsult_api::database::DatabaseManager;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

static SERVER: OnceLock<TestServer> = OnceLock::new();

/// Bearer tokens of this shape are accepted by the stand-in identity provider
pub const PATIENT_TOKEN_PREFIX: &str = "patient:";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        let identity_port = spawn_identity_provider()?;

        // DATABASE_URL is inherited; without it the server still answers /health with 503
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_medconsult-api"));
        cmd.env("MEDCONSULT_PORT", port.to_string())
            .env("APP_ENV", "development")
            .env("SUPABASE_URL", format!("http://127.0.0.1:{}", identity_port))
            .env("SUPABASE_ANON_KEY", "test-anon-key")
            .env("SUPABASE_SERVICE_ROLE_KEY", "")
            .env("MISTRAL_API_KEY", "")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                // Ready once /health answers, with or without a database
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends `body` as JSON when present and returns status plus parsed body
    pub async fn call(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut request = reqwest::Client::new().request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let res = request.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text)? };
        Ok((status, body))
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.call(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.call(Method::POST, path, Some(token), Some(body)).await
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(45)).await?;
    Ok(server)
}

/// Server plus migrated schema, or `None` (test skipped) when DATABASE_URL is unset
pub async fn ensure_database() -> Result<Option<&'static TestServer>> {
    if std::env::var("DATABASE_URL").map(|v| v.trim().is_empty()).unwrap_or(true) {
        eprintln!("DATABASE_URL not set; skipping database-backed test");
        return Ok(None);
    }

    let pool = pool()?;
    DatabaseManager::migrate(&pool).await?;
    DatabaseManager::close(&pool).await;

    Ok(Some(ensure_server().await?))
}

/// Direct connection for asserting on stored rows
pub fn pool() -> Result<PgPool> {
    let config = DatabaseConfig {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,
        max_connections: 2,
        connection_timeout: 10,
        auto_migrate: false,
    };
    Ok(DatabaseManager::connect_lazy(&config)?)
}

pub struct TestDoctor {
    pub id: Uuid,
    pub name: String,
    pub token: String,
    pub clinic: String,
}

/// Fresh clinic slug so parallel tests never share a directory
pub fn new_clinic() -> String {
    format!("clinic-{}", &Uuid::new_v4().simple().to_string()[..12])
}

pub async fn register_doctor(server: &TestServer, clinic: &str) -> Result<TestDoctor> {
    let tag = Uuid::new_v4().simple().to_string();
    let name = format!("Dr. Test {}", &tag[..6]);
    let (status, body) = server
        .call(
            Method::POST,
            "/auth/doctors/register",
            None,
            Some(json!({
                "name": name,
                "email": format!("dr-{}@clinic.test", tag),
                "password": "correct horse battery",
                "clinic": clinic,
                "specialty": "General practice"
            })),
        )
        .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "register failed: {} {}", status, body);

    let token = body["data"]["token"].as_str().context("token missing")?.to_string();
    let id = body["data"]["doctor"]["id"].as_str().context("doctor id missing")?.parse()?;
    Ok(TestDoctor {
        id,
        name,
        token,
        clinic: clinic.to_string(),
    })
}

/// A patient identity and the bearer token the identity provider will accept for it
pub fn new_patient() -> (Uuid, String) {
    let id = Uuid::new_v4();
    (id, format!("{}{}", PATIENT_TOKEN_PREFIX, id))
}

/// Minimal `/auth/v1/user` on its own runtime so it outlives each test's runtime
fn spawn_identity_provider() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").context("bind identity provider")?;
    listener.set_nonblocking(true)?;
    let port = listener.local_addr()?.port();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("identity provider runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).expect("identity provider listener");
            let app = Router::new().route("/auth/v1/user", get(identity_user));
            axum::serve(listener, app).await.expect("identity provider server");
        });
    });

    Ok(port)
}

async fn identity_user(headers: HeaderMap) -> Response {
    let patient_id = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| token.strip_prefix(PATIENT_TOKEN_PREFIX))
        .and_then(|id| Uuid::parse_str(id).ok());

    match patient_id {
        Some(id) => Json(json!({
            "id": id,
            "email": format!("{}@patients.test", id.simple()),
            "user_metadata": { "full_name": "Test Patient" }
        }))
        .into_response(),
        None => (
            axum::http::StatusCode::UNAUTHORIZED,
            Json(json!({ "msg": "invalid JWT" })),
        )
            .into_response(),
    }
}
