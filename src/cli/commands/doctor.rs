use clap::Subcommand;
use serde_json::json;

use crate::auth;
use crate::cli::utils::{connect, output_error, output_success};
use crate::cli::OutputFormat;
use crate::database::DatabaseError;
use crate::services::doctor_service::{self, NewDoctor};
use crate::services::DoctorService;

#[derive(Subcommand)]
pub enum DoctorCommands {
    #[command(about = "Create a doctor account")]
    Create {
        #[arg(long, help = "Display name")]
        name: String,
        #[arg(long, help = "Login email")]
        email: String,
        #[arg(long, help = "Initial password (at least 8 characters)")]
        password: String,
        #[arg(long, help = "Clinic slug, e.g. northside-family")]
        clinic: String,
        #[arg(long, help = "Medical specialty")]
        specialty: Option<String>,
    },

    #[command(about = "Deactivate a doctor; existing tokens stop working immediately")]
    Deactivate {
        #[arg(long, help = "Login email")]
        email: String,
    },
}

pub async fn handle(cmd: DoctorCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        DoctorCommands::Create {
            name,
            email,
            password,
            clinic,
            specialty,
        } => {
            let problems: Vec<String> = [
                doctor_service::validate_email(&email).err(),
                doctor_service::validate_password(&password).err(),
                doctor_service::validate_clinic_slug(&clinic).err(),
                name.trim().is_empty().then(|| "Name is required".to_string()),
            ]
            .into_iter()
            .flatten()
            .collect();
            if !problems.is_empty() {
                output_error(&output_format, &problems.join("; "), Some("VALIDATION_ERROR"))?;
                anyhow::bail!("invalid doctor details");
            }

            let pool = connect().await?;
            let password_hash = auth::hash_password(&password)?;
            let result = DoctorService::new(pool)
                .create(NewDoctor {
                    name,
                    email,
                    password_hash,
                    specialty,
                    clinic,
                })
                .await;

            match result {
                Ok(doctor) => output_success(
                    &output_format,
                    &format!("Created doctor {} ({})", doctor.name, doctor.email),
                    Some(json!({ "doctor": doctor })),
                ),
                Err(DatabaseError::Conflict(msg)) => {
                    output_error(&output_format, &msg, Some("CONFLICT"))?;
                    anyhow::bail!(msg)
                }
                Err(e) => Err(e.into()),
            }
        }
        DoctorCommands::Deactivate { email } => {
            let pool = connect().await?;
            if DoctorService::new(pool).set_active(&email, false).await? {
                output_success(
                    &output_format,
                    &format!("Deactivated {}", doctor_service::normalize_email(&email)),
                    None,
                )
            } else {
                output_error(&output_format, "No doctor with that email", Some("NOT_FOUND"))?;
                anyhow::bail!("doctor not found")
            }
        }
    }
}
