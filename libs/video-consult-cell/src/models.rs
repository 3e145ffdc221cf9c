// libs/video-consult-cell/src/models.rs
use serde::{Deserialize, Serialize};

/// Which join URL an actor is entitled to. Doctors host the room; everyone
/// else joins as a guest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Host,
    Guest,
}

/// A provisioned meeting room as persisted on the appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRoom {
    pub room_id: String,
    pub room_url: String,
    pub host_room_url: String,
}

impl MeetingRoom {
    pub fn url_for(&self, role: SessionRole) -> &str {
        match role {
            SessionRole::Host => &self.host_room_url,
            SessionRole::Guest => &self.room_url,
        }
    }
}

/// Join information returned to callers of `EnsureSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinInfo {
    pub join_url: String,
    pub role: SessionRole,
}

// ==============================================================================
// WHEREBY API WIRE TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub end_date: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingResponse {
    pub meeting_id: String,
    pub room_url: String,
    pub host_room_url: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum VideoConsultError {
    #[error("Video consultations are not configured")]
    NotConfigured,

    #[error("Meeting room provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Not authorized to access this consultation")]
    Unauthorized,

    #[error("Database error: {message}")]
    DatabaseError { message: String },
}
