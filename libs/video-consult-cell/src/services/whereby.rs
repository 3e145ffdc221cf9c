// libs/video-consult-cell/src/services/whereby.rs
use chrono::NaiveDate;
use reqwest::Client;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{CreateMeetingRequest, CreateMeetingResponse, MeetingRoom, VideoConsultError};

/// Whereby meetings API client.
/// Based on: https://docs.whereby.com/whereby-101/creating-and-deleting-rooms
#[derive(Debug)]
pub struct WherebyClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl WherebyClient {
    pub fn new(config: &AppConfig) -> Result<Self, VideoConsultError> {
        if !config.is_video_configured() {
            return Err(VideoConsultError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            api_key: config.whereby_api_key.clone(),
            base_url: config.whereby_api_base_url.clone(),
        })
    }

    /// Mint a new meeting room valid through the end of `valid_until`.
    /// Every call produces a brand-new room id and URLs.
    pub async fn create_meeting(
        &self,
        valid_until: NaiveDate,
    ) -> Result<MeetingRoom, VideoConsultError> {
        info!("Creating meeting room valid until {}", valid_until);

        let url = format!("{}/meetings", self.base_url);
        let request_body = CreateMeetingRequest {
            end_date: valid_until.to_string(),
            fields: vec!["hostRoomUrl".to_string()],
        };

        debug!("Sending meeting creation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| VideoConsultError::ProviderUnavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        let response_text =
            response
                .text()
                .await
                .map_err(|e| VideoConsultError::ProviderUnavailable {
                    message: e.to_string(),
                })?;

        if !status.is_success() {
            error!("Meeting creation failed: {} - {}", status, response_text);
            return Err(VideoConsultError::ProviderUnavailable {
                message: format!("HTTP {}: {}", status, response_text),
            });
        }

        let meeting: CreateMeetingResponse = serde_json::from_str(&response_text).map_err(|e| {
            VideoConsultError::ProviderUnavailable {
                message: format!("Failed to parse meeting response: {}", e),
            }
        })?;

        let host_room_url = meeting.host_room_url.unwrap_or_else(|| meeting.room_url.clone());

        info!("Created meeting room: {}", meeting.meeting_id);

        Ok(MeetingRoom {
            room_id: meeting.meeting_id,
            room_url: meeting.room_url,
            host_room_url,
        })
    }
}
