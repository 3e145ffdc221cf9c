// libs/video-consult-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::VideoConsultError;
use crate::services::binder::SessionBinder;

pub fn map_video_error(e: VideoConsultError) -> AppError {
    match e {
        VideoConsultError::NotConfigured => {
            AppError::ExternalService("Video consultations are not configured".to_string())
        }
        VideoConsultError::ProviderUnavailable { message } => AppError::ExternalService(message),
        VideoConsultError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        VideoConsultError::Unauthorized => AppError::Auth(e.to_string()),
        VideoConsultError::DatabaseError { message } => AppError::Database(message),
    }
}

/// Mint a fresh meeting room for an appointment, discarding any previous
/// session identifiers. Doctor-only.
#[axum::debug_handler]
pub async fn regenerate_session(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Auth(
            "Only doctors can regenerate consultation rooms".to_string(),
        ));
    }

    let binder = SessionBinder::new(&state).map_err(map_video_error)?;
    let room = binder
        .regenerate_session(&user, appointment_id, auth.token())
        .await
        .map_err(map_video_error)?;

    Ok(Json(json!({
        "message": "Consultation room regenerated",
        "video_room_id": room.room_id,
        "video_room_url": room.room_url,
        "video_host_url": room.host_room_url
    })))
}
