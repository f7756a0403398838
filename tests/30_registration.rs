mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn register(body: Value) -> Result<(StatusCode, Value)> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .post(server.url("/auth/doctors/register"))
        .json(&body)
        .send()
        .await?;
    let status = res.status();
    Ok((status, res.json::<Value>().await?))
}

// Validation runs before any database access, so these hold with or without Postgres
#[tokio::test]
async fn short_password_rejected() -> Result<()> {
    let (status, body) = register(json!({
        "name": "Dr. Ada Lovelace",
        "email": "ada@clinic.test",
        "password": "short",
        "clinic": "northside"
    }))
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["field_errors"]["password"].is_string());
    Ok(())
}

#[tokio::test]
async fn bad_clinic_slug_rejected() -> Result<()> {
    let (status, body) = register(json!({
        "name": "Dr. Ada Lovelace",
        "email": "ada@clinic.test",
        "password": "long enough password",
        "clinic": "North Side Clinic"
    }))
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["clinic"].is_string());
    Ok(())
}

#[tokio::test]
async fn bad_email_rejected() -> Result<()> {
    let (status, body) = register(json!({
        "name": "Dr. Ada Lovelace",
        "email": "not-an-email",
        "password": "long enough password",
        "clinic": "northside"
    }))
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["email"].is_string());
    Ok(())
}
