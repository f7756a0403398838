mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

fn id_of(body: &Value) -> String {
    body["data"]["id"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn opening_twice_returns_the_same_conversation() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let (patient_id, patient) = common::new_patient();

    let (status, first) = server
        .post("/api/conversations", &patient, json!({ "doctor_id": doctor.id, "subject": "Follow-up" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["status"], "active");
    assert_eq!(first["data"]["created_by"], "patient");
    assert_eq!(first["data"]["patient_id"], patient_id.to_string());

    let (status, again) = server
        .post("/api/conversations", &patient, json!({ "doctor_id": doctor.id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(id_of(&again), id_of(&first));

    // Same pair from the doctor's side
    let (status, from_doctor) = server
        .post("/api/conversations", &doctor.token, json!({ "patient_id": patient_id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(id_of(&from_doctor), id_of(&first));

    Ok(())
}

#[tokio::test]
async fn opening_with_unknown_doctor_is_not_found() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let (_, patient) = common::new_patient();

    let (status, _) = server
        .post("/api/conversations", &patient, json!({ "doctor_id": Uuid::new_v4() }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn messages_are_stored_sealed_and_counted_unread() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let (_, patient) = common::new_patient();

    let (_, opened) = server
        .post("/api/conversations", &patient, json!({ "doctor_id": doctor.id }))
        .await?;
    let conversation = id_of(&opened);
    let messages_path = format!("/api/conversations/{}/messages", conversation);

    let (status, sent) = server
        .post(&messages_path, &patient, json!({ "content": "My rash is spreading" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["data"]["content"], "My rash is spreading");
    assert_eq!(sent["data"]["sender_type"], "patient");
    assert_eq!(sent["data"]["encrypted"], true);

    // Plaintext never reaches the content column
    let pool = common::pool()?;
    let message_id: Uuid = id_of(&sent).parse()?;
    let (content, payload): (String, Option<Vec<u8>>) =
        sqlx::query_as("SELECT content, encrypted_payload FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_one(&pool)
            .await?;
    pool.close().await;
    assert_eq!(content, "[encrypted]");
    let payload = payload.unwrap_or_default();
    assert!(!payload.is_empty());
    assert!(!String::from_utf8_lossy(&payload).contains("rash"));

    let (status, listed) = server.get(&messages_path, &doctor.token).await?;
    assert_eq!(status, StatusCode::OK);
    let listed = listed["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["content"], "My rash is spreading");

    let (_, inbox) = server.get("/api/conversations", &doctor.token).await?;
    let entry = &inbox["data"][0];
    assert_eq!(entry["id"], conversation);
    assert_eq!(entry["unread_count"], 1);
    assert!(entry["last_message_at"].is_string());

    let (status, receipt) = server
        .post(&format!("/api/conversations/{}/read", conversation), &doctor.token, json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["data"]["marked_read"], 1);

    let (_, inbox) = server.get("/api/conversations", &doctor.token).await?;
    assert_eq!(inbox["data"][0]["unread_count"], 0);

    // The sender's own message never counts as unread for them
    let (_, patient_inbox) = server.get("/api/conversations", &patient).await?;
    assert_eq!(patient_inbox["data"][0]["unread_count"], 0);

    Ok(())
}

#[tokio::test]
async fn outsiders_cannot_see_a_conversation() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let other_doctor = common::register_doctor(server, &doctor.clinic).await?;
    let (_, patient) = common::new_patient();
    let (_, stranger) = common::new_patient();

    let (_, opened) = server
        .post("/api/conversations", &patient, json!({ "doctor_id": doctor.id }))
        .await?;
    let path = format!("/api/conversations/{}", id_of(&opened));

    let (status, _) = server.get(&path, &stranger).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get(&path, &other_doctor.token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server
        .post(&format!("{}/messages", path), &stranger, json!({ "content": "hello" }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn conclude_block_and_reopen_follow_the_lifecycle() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let (patient_id, patient) = common::new_patient();

    let (_, opened) = server
        .post("/api/conversations", &patient, json!({ "doctor_id": doctor.id }))
        .await?;
    let base = format!("/api/conversations/{}", id_of(&opened));
    let messages_path = format!("{}/messages", base);

    // Patients cannot end a conversation
    let (status, _) = server.post(&format!("{}/conclude", base), &patient, json!({})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, concluded) = server.post(&format!("{}/conclude", base), &doctor.token, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(concluded["data"]["status"], "concluded");
    assert!(concluded["data"]["concluded_at"].is_string());

    let (status, _) = server.post(&messages_path, &patient, json!({ "content": "one more thing" })).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, reopened) = server.post(&format!("{}/reopen", base), &patient, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reopened["data"]["status"], "active");
    assert!(reopened["data"]["concluded_at"].is_null());

    // Reopening an active conversation is not a valid move
    let (status, _) = server.post(&format!("{}/reopen", base), &doctor.token, json!({})).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, blocked) = server.post(&format!("{}/block", base), &doctor.token, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocked["data"]["status"], "blocked");
    assert_eq!(blocked["data"]["blocked_by"], doctor.id.to_string());

    let (status, _) = server.post(&messages_path, &patient, json!({ "content": "hello?" })).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.post(&format!("{}/reopen", base), &patient, json!({})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server
        .post("/api/conversations", &patient, json!({ "doctor_id": doctor.id }))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The doctor may still pull up the thread and lift the block
    let (status, _) = server
        .post("/api/conversations", &doctor.token, json!({ "patient_id": patient_id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, unblocked) = server.post(&format!("{}/reopen", base), &doctor.token, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unblocked["data"]["status"], "active");
    assert!(unblocked["data"]["blocked_at"].is_null());
    assert!(unblocked["data"]["blocked_by"].is_null());

    let (status, _) = server.post(&messages_path, &patient, json!({ "content": "thanks" })).await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}
