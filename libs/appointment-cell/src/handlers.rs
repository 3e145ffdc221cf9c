// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use video_consult_cell::services::binder::SessionBinder;

use crate::models::{
    AppointmentError, AppointmentQuery, BookAppointmentRequest, CancelAppointmentRequest,
    RejectAppointmentRequest, RescheduleAppointmentRequest,
};
use crate::services::booking::BookingService;
use crate::services::lifecycle::LifecycleService;

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotNotFound => AppError::NotFound("Time slot not found".to_string()),
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::SlotNotAvailable | AppointmentError::ConcurrentUpdate => {
            AppError::Conflict(e.to_string())
        }
        AppointmentError::InvalidStatusTransition(_) => AppError::InvalidState(e.to_string()),
        AppointmentError::CancellationWindowClosed
        | AppointmentError::RescheduleLimitReached
        | AppointmentError::JoinWindowClosed
        | AppointmentError::DoctorNotEligible => AppError::PolicyViolation(e.to_string()),
        AppointmentError::SlotInPast | AppointmentError::SlotDoctorMismatch => {
            AppError::BadRequest(e.to_string())
        }
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::Unauthorized => AppError::Auth(e.to_string()),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .book_appointment(&user, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment booked successfully",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .get_appointment(&user, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let now = Utc::now();
    Ok(Json(json!({
        "appointment": appointment,
        "can_cancel": appointment.can_cancel(now),
        "can_reschedule": appointment.can_reschedule(now),
        "can_join": appointment.can_join(now)
    })))
}

#[axum::debug_handler]
pub async fn list_my_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AppointmentQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointments = service
        .list_my_appointments(&user, query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn list_upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointments = service
        .list_upcoming(&user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

/// A doctor's confirmed and in-progress appointments for one day,
/// defaulting to today.
#[axum::debug_handler]
pub async fn doctor_day_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DayQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Auth(
            "Only doctors can view their daily schedule".to_string(),
        ));
    }
    let doctor_id =
        Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id".to_string()))?;

    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());

    let service = BookingService::new(&state);
    let appointments = service
        .doctor_day_appointments(doctor_id, date, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "date": date, "appointments": appointments })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = LifecycleService::new(&state);

    let appointment = service
        .confirm(&user, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment confirmed",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn reject_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RejectAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LifecycleService::new(&state);

    let appointment = service
        .reject(&user, appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment rejected",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LifecycleService::new(&state);

    let appointment = service
        .cancel(&user, appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment cancelled successfully",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LifecycleService::new(&state);

    let appointment = service
        .reschedule(&user, appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment rescheduled successfully",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn start_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = LifecycleService::new(&state);

    let appointment = service
        .start(&user, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Consultation started",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = LifecycleService::new(&state);

    let appointment = service
        .complete(&user, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment completed successfully",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = LifecycleService::new(&state);

    let appointment = service
        .mark_no_show(&user, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "message": "Appointment marked as no-show",
        "appointment": appointment
    })))
}

// ==============================================================================
// JOIN HANDLER
// ==============================================================================

/// Resolve the caller's join URL for an appointment, provisioning the
/// meeting room on first use. Only valid inside the join window.
#[axum::debug_handler]
pub async fn join_consultation(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .get_appointment(&user, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    if !appointment.can_join(Utc::now()) {
        return Err(map_appointment_error(AppointmentError::JoinWindowClosed));
    }

    let binder = SessionBinder::new(&state)
        .map_err(video_consult_cell::handlers::map_video_error)?;

    let join_info = binder
        .ensure_session(&user, appointment_id, auth.token())
        .await
        .map_err(video_consult_cell::handlers::map_video_error)?;

    Ok(Json(json!({ "video_room_url": join_info.join_url })))
}
