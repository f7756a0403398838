mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn protected_routes_require_bearer_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    for path in ["/api/auth/whoami", "/api/appointments", "/api/conversations", "/api/dashboard"] {
        let res = client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", path);

        let body = res.json::<serde_json::Value>().await?;
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
    Ok(())
}

#[tokio::test]
async fn tokens_unknown_to_identity_provider_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .get(server.url("/api/auth/whoami"))
        .bearer_auth("some-supabase-session-token")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn identity_provider_tokens_resolve_to_patients() -> Result<()> {
    let server = common::ensure_server().await?;
    let (patient_id, token) = common::new_patient();

    let (status, body) = server.get("/api/auth/whoami", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["type"], "patient");
    assert_eq!(body["data"]["id"], patient_id.to_string());
    assert_eq!(body["data"]["full_name"], "Test Patient");
    Ok(())
}

#[tokio::test]
async fn basic_auth_is_not_accepted() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .get(server.url("/api/auth/whoami"))
        .basic_auth("doctor", Some("secret"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn refresh_rejects_malformed_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .post(server.url("/auth/refresh"))
        .json(&json!({ "token": "not.a.jwt" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
