use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::api::Page;
use crate::database::models::appointment::{
    video_channel_for, Appointment, AppointmentKind, AppointmentRow, AppointmentStatus,
};
use crate::database::models::conversation::ActorKind;
use crate::error::ApiError;

const APPOINTMENT_COLUMNS: &str = "id, doctor_id, patient_id, patient_name, scheduled_at, duration_minutes, \
     kind, status, reason, notes, video_channel, created_at, updated_at";

pub const MIN_DURATION_MINUTES: i32 = 5;
pub const MAX_DURATION_MINUTES: i32 = 480;

/// Creation may trail the clock slightly so a form submitted "now" is accepted
const PAST_TOLERANCE_MINUTES: i64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    #[serde(default)]
    pub patient_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub kind: AppointmentKind,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentUpdate {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub patient_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub patient_id: Option<Uuid>,
}

pub struct AppointmentService {
    pool: PgPool,
}

impl AppointmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        actor: ActorKind,
        actor_id: Uuid,
        filter: &AppointmentFilter,
        page: Page,
    ) -> Result<Vec<Appointment>, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM appointments WHERE ", APPOINTMENT_COLUMNS));
        push_scope(&mut qb, actor, actor_id);

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.from {
            qb.push(" AND scheduled_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND scheduled_at < ").push_bind(to);
        }
        if let Some(patient_id) = filter.patient_id {
            qb.push(" AND patient_id = ").push_bind(patient_id);
        }

        qb.push(" ORDER BY scheduled_at ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rows = qb.build_query_as::<AppointmentRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(into_appointment).collect()
    }

    /// Participants only; anyone else gets the same 404 as a missing row
    pub async fn get_for(&self, actor: ActorKind, actor_id: Uuid, id: Uuid) -> Result<Appointment, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM appointments WHERE ", APPOINTMENT_COLUMNS));
        push_scope(&mut qb, actor, actor_id);
        qb.push(" AND id = ").push_bind(id);

        let row = qb
            .build_query_as::<AppointmentRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
        into_appointment(row)
    }

    pub async fn create(&self, doctor_id: Uuid, new: NewAppointment) -> Result<Appointment, ApiError> {
        validate_duration(new.duration_minutes)?;
        ensure_not_past(new.scheduled_at)?;

        let ends_at = new.scheduled_at + Duration::minutes(new.duration_minutes as i64);
        let mut tx = self.pool.begin().await?;
        lock_doctor_schedule(&mut tx, doctor_id).await?;
        ensure_free(&mut tx, doctor_id, new.scheduled_at, ends_at, None).await?;

        let id = Uuid::new_v4();
        let video_channel = (new.kind == AppointmentKind::Video).then(|| video_channel_for(id));

        let sql = format!(
            "INSERT INTO appointments
                (id, doctor_id, patient_id, patient_name, scheduled_at, duration_minutes, kind, status, reason, notes, video_channel)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {}",
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(doctor_id)
            .bind(new.patient_id)
            .bind(trimmed(new.patient_name))
            .bind(new.scheduled_at)
            .bind(new.duration_minutes)
            .bind(new.kind.as_str())
            .bind(AppointmentStatus::Scheduled.as_str())
            .bind(trimmed(new.reason))
            .bind(trimmed(new.notes))
            .bind(video_channel)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Doctor {} scheduled appointment {} for patient {}", doctor_id, id, row.patient_id);
        into_appointment(row)
    }

    pub async fn update(&self, doctor_id: Uuid, id: Uuid, update: AppointmentUpdate) -> Result<Appointment, ApiError> {
        let mut tx = self.pool.begin().await?;
        lock_doctor_schedule(&mut tx, doctor_id).await?;

        let sql = format!(
            "SELECT {} FROM appointments WHERE id = $1 AND doctor_id = $2",
            APPOINTMENT_COLUMNS
        );
        let current = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(doctor_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Appointment not found"))
            .and_then(into_appointment)?;
        if current.status.is_terminal() {
            return Err(ApiError::conflict(format!(
                "Appointment is {} and can no longer be changed",
                current.status.as_str()
            )));
        }

        let scheduled_at = update.scheduled_at.unwrap_or(current.scheduled_at);
        let duration = update.duration_minutes.unwrap_or(current.duration_minutes);
        validate_duration(duration)?;
        if scheduled_at != current.scheduled_at {
            ensure_not_past(scheduled_at)?;
        }

        if scheduled_at != current.scheduled_at || duration != current.duration_minutes {
            let ends_at = scheduled_at + Duration::minutes(duration as i64);
            ensure_free(&mut tx, doctor_id, scheduled_at, ends_at, Some(id)).await?;
        }

        let sql = format!(
            "UPDATE appointments SET
                scheduled_at = $3,
                duration_minutes = $4,
                reason = COALESCE($5, reason),
                notes = COALESCE($6, notes),
                patient_name = COALESCE($7, patient_name),
                updated_at = NOW()
             WHERE id = $1 AND doctor_id = $2
             RETURNING {}",
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(doctor_id)
            .bind(scheduled_at)
            .bind(duration)
            .bind(trimmed(update.reason))
            .bind(trimmed(update.notes))
            .bind(trimmed(update.patient_name))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
        tx.commit().await?;
        into_appointment(row)
    }

    pub async fn set_status(
        &self,
        actor: ActorKind,
        actor_id: Uuid,
        id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, ApiError> {
        let current = self.get_for(actor, actor_id, id).await?;
        check_status_change(actor, current.status, next)?;

        let sql = format!(
            "UPDATE appointments SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {}",
            APPOINTMENT_COLUMNS
        );
        // Guarding on the old status keeps concurrent transitions from both winning
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(current.status.as_str())
            .bind(next.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::conflict("Appointment status changed concurrently, reload and retry"))?;

        tracing::info!(
            "Appointment {} moved {} -> {} by {} {}",
            id,
            current.status.as_str(),
            next.as_str(),
            actor.as_str(),
            actor_id
        );
        into_appointment(row)
    }

    /// Next open appointments from now, optionally for one patient
    pub async fn upcoming_with(
        &self,
        doctor_id: Uuid,
        patient_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Appointment>, ApiError> {
        let sql = format!(
            "SELECT {} FROM appointments
             WHERE doctor_id = $1
               AND ($2::uuid IS NULL OR patient_id = $2)
               AND status IN ('scheduled', 'confirmed')
               AND scheduled_at >= NOW()
             ORDER BY scheduled_at ASC
             LIMIT $3",
            APPOINTMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(doctor_id)
            .bind(patient_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(into_appointment).collect()
    }

    pub async fn delete(&self, doctor_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1 AND doctor_id = $2")
            .bind(id)
            .bind(doctor_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Appointment not found"));
        }
        Ok(())
    }
}

/// Row lock on the doctor serializes schedule changes, so two bookings
/// cannot both pass the overlap check for the same slot.
async fn lock_doctor_schedule(tx: &mut Transaction<'_, Postgres>, doctor_id: Uuid) -> Result<(), ApiError> {
    sqlx::query("SELECT id FROM doctors WHERE id = $1 FOR NO KEY UPDATE")
        .bind(doctor_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Doctor not found"))?;
    Ok(())
}

/// Cancelled and no-show appointments free their slot
async fn ensure_free(
    tx: &mut Transaction<'_, Postgres>,
    doctor_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> Result<(), ApiError> {
    let clash: Option<(Uuid, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, scheduled_at FROM appointments
         WHERE doctor_id = $1
           AND status NOT IN ('cancelled', 'no_show')
           AND ($4::uuid IS NULL OR id <> $4)
           AND scheduled_at < $3
           AND scheduled_at + make_interval(mins => duration_minutes) > $2
         LIMIT 1",
    )
    .bind(doctor_id)
    .bind(starts_at)
    .bind(ends_at)
    .bind(exclude)
    .fetch_optional(&mut **tx)
    .await?;

    match clash {
        Some((other, at)) => Err(ApiError::conflict(format!(
            "Overlaps appointment {} at {}",
            other,
            at.to_rfc3339()
        ))),
        None => Ok(()),
    }
}

fn ensure_not_past(scheduled_at: DateTime<Utc>) -> Result<(), ApiError> {
    if scheduled_at < Utc::now() - Duration::minutes(PAST_TOLERANCE_MINUTES) {
        return Err(ApiError::invalid_field("scheduled_at", "Appointment cannot be scheduled in the past"));
    }
    Ok(())
}

fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, actor: ActorKind, actor_id: Uuid) {
    match actor {
        ActorKind::Doctor => qb.push("doctor_id = ").push_bind(actor_id),
        ActorKind::Patient => qb.push("patient_id = ").push_bind(actor_id),
    };
}

fn into_appointment(row: AppointmentRow) -> Result<Appointment, ApiError> {
    Appointment::try_from(row).map_err(|e| {
        tracing::error!("Corrupt appointment row: {}", e);
        ApiError::internal_server_error("Stored appointment is invalid")
    })
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_duration(minutes: i32) -> Result<(), ApiError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(ApiError::invalid_field(
            "duration_minutes",
            format!("Must be between {} and {}", MIN_DURATION_MINUTES, MAX_DURATION_MINUTES),
        ));
    }
    Ok(())
}

/// Doctors follow the status graph; patients may only cancel an open appointment.
pub fn check_status_change(
    actor: ActorKind,
    current: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<(), ApiError> {
    if actor == ActorKind::Patient && next != AppointmentStatus::Cancelled {
        return Err(ApiError::forbidden("Patients can only cancel appointments"));
    }
    if !current.can_become(next) {
        return Err(ApiError::conflict(format!(
            "Cannot change appointment from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(5).is_ok());
        assert!(validate_duration(480).is_ok());
        assert!(validate_duration(4).is_err());
        assert!(validate_duration(481).is_err());
    }

    #[test]
    fn patient_can_only_cancel() {
        assert!(check_status_change(ActorKind::Patient, Scheduled, Cancelled).is_ok());
        assert!(check_status_change(ActorKind::Patient, Confirmed, Cancelled).is_ok());

        let err = check_status_change(ActorKind::Patient, Scheduled, Confirmed).unwrap_err();
        assert_eq!(err.status_code(), 403);
        let err = check_status_change(ActorKind::Patient, Completed, Cancelled).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn doctor_follows_graph() {
        assert!(check_status_change(ActorKind::Doctor, Scheduled, Completed).is_ok());
        let err = check_status_change(ActorKind::Doctor, Cancelled, Scheduled).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn past_start_times_rejected() {
        assert!(ensure_not_past(Utc::now() + Duration::hours(1)).is_ok());
        assert!(ensure_not_past(Utc::now() - Duration::minutes(1)).is_ok());
        let err = ensure_not_past(Utc::now() - Duration::hours(2)).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn blank_text_is_dropped() {
        assert_eq!(trimmed(Some("  ".to_string())), None);
        assert_eq!(trimmed(Some(" chest pain ".to_string())), Some("chest pain".to_string()));
    }
}
