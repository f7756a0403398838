use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::appointment::Appointment;
use crate::error::ApiError;
use crate::services::appointment_service::AppointmentService;

const NEXT_APPOINTMENTS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardCounts {
    pub appointments_today: i64,
    pub upcoming_appointments: i64,
    pub patients: i64,
    pub active_conversations: i64,
    pub unread_messages: i64,
    pub records_this_month: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub counts: DashboardCounts,
    pub next_appointments: Vec<Appointment>,
}

pub struct DashboardService {
    pool: PgPool,
}

impl DashboardService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn overview(&self, doctor_id: Uuid) -> Result<Dashboard, ApiError> {
        let appointments = AppointmentService::new(self.pool.clone());

        let (
            appointments_today,
            upcoming_appointments,
            patients,
            active_conversations,
            unread_messages,
            records_this_month,
            next_appointments,
        ) = futures::try_join!(
            self.count(
                "SELECT COUNT(*) FROM appointments
                 WHERE doctor_id = $1
                   AND scheduled_at >= date_trunc('day', NOW())
                   AND scheduled_at < date_trunc('day', NOW()) + INTERVAL '1 day'
                   AND status NOT IN ('cancelled', 'no_show')",
                doctor_id,
            ),
            self.count(
                "SELECT COUNT(*) FROM appointments
                 WHERE doctor_id = $1 AND scheduled_at >= NOW() AND status IN ('scheduled', 'confirmed')",
                doctor_id,
            ),
            self.count(
                "SELECT COUNT(*) FROM (
                    SELECT patient_id FROM appointments WHERE doctor_id = $1
                    UNION
                    SELECT patient_id FROM medical_records WHERE doctor_id = $1
                    UNION
                    SELECT patient_id FROM conversations WHERE doctor_id = $1
                 ) p",
                doctor_id,
            ),
            self.count(
                "SELECT COUNT(*) FROM conversations WHERE doctor_id = $1 AND status = 'active'",
                doctor_id,
            ),
            self.count(
                "SELECT COUNT(*) FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.doctor_id = $1 AND m.sender_type = 'patient' AND m.read_at IS NULL",
                doctor_id,
            ),
            self.count(
                "SELECT COUNT(*) FROM medical_records
                 WHERE doctor_id = $1 AND created_at >= date_trunc('month', NOW())",
                doctor_id,
            ),
            appointments.upcoming_with(doctor_id, None, NEXT_APPOINTMENTS),
        )?;

        Ok(Dashboard {
            counts: DashboardCounts {
                appointments_today,
                upcoming_appointments,
                patients,
                active_conversations,
                unread_messages,
                records_this_month,
            },
            next_appointments,
        })
    }

    async fn count(&self, sql: &'static str, doctor_id: Uuid) -> Result<i64, ApiError> {
        Ok(sqlx::query_scalar::<_, i64>(sql)
            .bind(doctor_id)
            .fetch_one(&self.pool)
            .await?)
    }
}
