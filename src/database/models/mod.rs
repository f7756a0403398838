pub mod appointment;
pub mod collab;
pub mod conversation;
pub mod doctor;
pub mod message;
pub mod record;
