mod common;

use anyhow::Result;
use chrono::{DateTime, Duration, DurationRound, Utc};
use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

/// Top of an hour a couple of days out; each test shifts from one fixed base
fn base_slot() -> Result<DateTime<Utc>> {
    Ok((Utc::now() + Duration::days(2)).duration_trunc(Duration::hours(1))?)
}

fn at(base: DateTime<Utc>, offset_minutes: i64) -> DateTime<Utc> {
    base + Duration::minutes(offset_minutes)
}

async fn patch(server: &common::TestServer, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
    server.call(reqwest::Method::PATCH, path, Some(token), Some(body)).await
}

fn booking(patient_id: Uuid, at: DateTime<Utc>, minutes: i32) -> Value {
    json!({
        "patient_id": patient_id,
        "patient_name": "Test Patient",
        "scheduled_at": at,
        "duration_minutes": minutes,
        "kind": "in_person",
        "reason": "Check-up"
    })
}

fn id_of(body: &Value) -> String {
    body["data"]["id"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn concurrent_bookings_of_one_slot_admit_exactly_one() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let base = base_slot()?;
    let start = at(base, 0);

    let attempts = (0..8).map(|_| {
        let body = booking(Uuid::new_v4(), start, 30);
        let token = doctor.token.clone();
        async move { server.post("/api/appointments", &token, body).await }
    });
    let outcomes = join_all(attempts).await;

    let mut created = 0;
    let mut conflicts = 0;
    for outcome in outcomes {
        match outcome?.0 {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => anyhow::bail!("unexpected status {}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);

    let (status, listed) = server.get("/api/appointments", &doctor.token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(listed["meta"]["count"], 1);

    Ok(())
}

#[tokio::test]
async fn overlaps_conflict_until_the_blocking_visit_is_cancelled() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let base = base_slot()?;
    let patient_id = Uuid::new_v4();

    let (status, first) = server
        .post("/api/appointments", &doctor.token, booking(patient_id, at(base, 0), 30))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["status"], "scheduled");

    let (status, _) = server
        .post("/api/appointments", &doctor.token, booking(patient_id, at(base, 15), 30))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // Back-to-back is fine: the first visit ends exactly when this one starts
    let (status, _) = server
        .post("/api/appointments", &doctor.token, booking(patient_id, at(base, 30), 30))
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = server
        .post(
            &format!("/api/appointments/{}/status", id_of(&first)),
            &doctor.token,
            json!({ "status": "cancelled" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server
        .post("/api/appointments", &doctor.token, booking(patient_id, at(base, -15), 20))
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn status_changes_follow_the_graph() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let base = base_slot()?;

    let (_, created) = server
        .post("/api/appointments", &doctor.token, booking(Uuid::new_v4(), at(base, 0), 30))
        .await?;
    let status_path = format!("/api/appointments/{}/status", id_of(&created));

    for next in ["confirmed", "completed"] {
        let (status, body) = server.post(&status_path, &doctor.token, json!({ "status": next })).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], next);
    }

    for next in ["cancelled", "scheduled", "no_show"] {
        let (status, _) = server.post(&status_path, &doctor.token, json!({ "status": next })).await?;
        assert_eq!(status, StatusCode::CONFLICT, "completed -> {}", next);
    }

    Ok(())
}

#[tokio::test]
async fn patients_may_only_cancel_their_own_visits() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let base = base_slot()?;
    let (patient_id, patient) = common::new_patient();
    let (_, stranger) = common::new_patient();

    let (_, created) = server
        .post("/api/appointments", &doctor.token, booking(patient_id, at(base, 0), 30))
        .await?;
    let path = format!("/api/appointments/{}", id_of(&created));

    let (status, mine) = server.get(&path, &patient).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["data"]["patient_id"], patient_id.to_string());

    let (status, _) = server.get(&path, &stranger).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.post("/api/appointments", &patient, booking(patient_id, at(base, 60), 30)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .post(&format!("{}/status", path), &patient, json!({ "status": "confirmed" }))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = server
        .post(&format!("{}/status", path), &patient, json!({ "status": "cancelled" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["data"]["status"], "cancelled");

    Ok(())
}

#[tokio::test]
async fn reschedules_are_checked_like_new_bookings() -> Result<()> {
    let Some(server) = common::ensure_database().await? else { return Ok(()) };
    let doctor = common::register_doctor(server, &common::new_clinic()).await?;
    let base = base_slot()?;
    let patient_id = Uuid::new_v4();

    let (_, morning) = server
        .post("/api/appointments", &doctor.token, booking(patient_id, at(base, 0), 30))
        .await?;
    let (_, later) = server
        .post("/api/appointments", &doctor.token, booking(patient_id, at(base, 120), 30))
        .await?;
    let later_path = format!("/api/appointments/{}", id_of(&later));

    let (status, _) = patch(server, &later_path, &doctor.token, json!({ "scheduled_at": at(base, 10) })).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let past = json!({ "scheduled_at": Utc::now() - Duration::hours(1) });
    let (status, _) = patch(server, &later_path, &doctor.token, past).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "scheduled_at": at(base, 30), "notes": "moved up" });
    let (status, moved) = patch(server, &later_path, &doctor.token, body).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["data"]["notes"], "moved up");
    let moved_to: DateTime<Utc> = moved["data"]["scheduled_at"].as_str().unwrap_or_default().parse()?;
    assert_eq!(moved_to, at(base, 30));

    // Growing into the neighbour is an overlap too
    let morning_path = format!("/api/appointments/{}", id_of(&morning));
    let (status, _) = patch(server, &morning_path, &doctor.token, json!({ "duration_minutes": 45 })).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}
