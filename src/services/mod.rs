pub mod appointment_service;
pub mod collab_service;
pub mod conversation_service;
pub mod dashboard_service;
pub mod doctor_service;
pub mod patient_service;
pub mod record_service;

pub use appointment_service::AppointmentService;
pub use collab_service::CollabService;
pub use conversation_service::ConversationService;
pub use dashboard_service::DashboardService;
pub use doctor_service::DoctorService;
pub use patient_service::PatientService;
pub use record_service::RecordService;
