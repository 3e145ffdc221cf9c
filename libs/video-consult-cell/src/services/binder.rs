// libs/video-consult-cell/src/services/binder.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{JoinInfo, MeetingRoom, SessionRole, VideoConsultError};
use crate::services::whereby::WherebyClient;

/// Associates meeting rooms with appointments on demand.
///
/// Ensure is idempotent: an appointment that already carries URLs for the
/// requested role gets them back unchanged. Provisioning happens outside any
/// other write; a provider outage leaves the appointment untouched so join
/// can simply be retried.
#[derive(Debug)]
pub struct SessionBinder {
    supabase: Arc<SupabaseClient>,
    whereby: WherebyClient,
}

impl SessionBinder {
    pub fn new(config: &AppConfig) -> Result<Self, VideoConsultError> {
        Ok(Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            whereby: WherebyClient::new(config)?,
        })
    }

    /// Return the join URL for `user`, minting and persisting a room first
    /// if the appointment does not have one yet.
    pub async fn ensure_session(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<JoinInfo, VideoConsultError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.verify_appointment_access(&appointment, user)?;

        let role = role_for(user, &appointment);

        let room_url = appointment["video_room_url"].as_str().unwrap_or("");
        let host_room_url = appointment["video_host_url"].as_str().unwrap_or("");

        let room_complete = match role {
            SessionRole::Guest => !room_url.is_empty(),
            SessionRole::Host => !room_url.is_empty() && !host_room_url.is_empty(),
        };

        if room_complete {
            debug!("Appointment {} already has a meeting room", appointment_id);
            let join_url = match role {
                SessionRole::Host => host_room_url.to_string(),
                SessionRole::Guest => room_url.to_string(),
            };
            return Ok(JoinInfo { join_url, role });
        }

        let room = self.mint_room(&appointment).await?;
        self.persist_room(appointment_id, &room, auth_token).await?;

        info!(
            "Bound meeting room {} to appointment {}",
            room.room_id, appointment_id
        );

        Ok(JoinInfo {
            join_url: room.url_for(role).to_string(),
            role,
        })
    }

    /// Mint a brand-new room for the appointment, replacing any existing
    /// session fields with genuinely new identifiers. Used after slot
    /// changes to avoid stale-room reuse.
    pub async fn regenerate_session(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<MeetingRoom, VideoConsultError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.verify_appointment_access(&appointment, user)?;

        let room = self.mint_room(&appointment).await?;
        self.persist_room(appointment_id, &room, auth_token).await?;

        info!(
            "Regenerated meeting room for appointment {}: {}",
            appointment_id, room.room_id
        );

        Ok(room)
    }

    async fn mint_room(&self, appointment: &Value) -> Result<MeetingRoom, VideoConsultError> {
        // The room stays valid through the day after the appointment.
        let date = appointment["date"]
            .as_str()
            .and_then(|d| d.parse::<NaiveDate>().ok())
            .unwrap_or_else(|| Utc::now().date_naive());

        self.whereby.create_meeting(date + Duration::days(1)).await
    }

    async fn persist_room(
        &self,
        appointment_id: Uuid,
        room: &MeetingRoom,
        auth_token: &str,
    ) -> Result<(), VideoConsultError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({
            "video_room_url": room.room_url,
            "video_host_url": room.host_room_url,
            "video_room_id": room.room_id,
            "updated_at": Utc::now().to_rfc3339()
        });

        let _: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(body))
            .await
            .map_err(|e| VideoConsultError::DatabaseError {
                message: format!("Failed to persist meeting room: {}", e),
            })?;

        Ok(())
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Value, VideoConsultError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VideoConsultError::DatabaseError {
                message: e.to_string(),
            })?;

        result
            .into_iter()
            .next()
            .ok_or(VideoConsultError::AppointmentNotFound)
    }

    fn verify_appointment_access(
        &self,
        appointment: &Value,
        user: &User,
    ) -> Result<(), VideoConsultError> {
        let patient_id = appointment["patient_id"].as_str().unwrap_or("");
        let doctor_id = appointment["doctor_id"].as_str().unwrap_or("");

        let has_access = user.id == patient_id || user.id == doctor_id || user.is_admin();

        if !has_access {
            return Err(VideoConsultError::Unauthorized);
        }

        Ok(())
    }
}

fn role_for(user: &User, appointment: &Value) -> SessionRole {
    let doctor_id = appointment["doctor_id"].as_str().unwrap_or("");
    if user.id == doctor_id {
        SessionRole::Host
    } else {
        SessionRole::Guest
    }
}
