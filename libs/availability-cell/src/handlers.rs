// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AvailabilityError, CleanupSlotsRequest, CreateTemplateRequest, GenerateSlotsRequest,
    SlotQuery, UpdateTemplateRequest,
};
use crate::services::slots::SlotService;
use crate::services::templates::TemplateService;

fn map_availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::TemplateNotFound => {
            AppError::NotFound("Availability template not found".to_string())
        }
        AvailabilityError::DuplicateTemplate => AppError::Conflict(e.to_string()),
        AvailabilityError::InvalidTimeRange | AvailabilityError::InvalidDayOfWeek(_) => {
            AppError::BadRequest(e.to_string())
        }
        AvailabilityError::ValidationError(msg) => AppError::BadRequest(msg),
        AvailabilityError::Unauthorized => AppError::Auth(e.to_string()),
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn require_doctor(user: &User) -> Result<Uuid, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Auth(
            "Only doctors can manage availability".to_string(),
        ));
    }
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id".to_string()))
}

// ==============================================================================
// TEMPLATE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_template(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;

    let service = TemplateService::new(&state);
    let template = service
        .create_template(doctor_id, request, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "message": "Availability template created",
        "template": template
    })))
}

#[axum::debug_handler]
pub async fn list_my_templates(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;

    let service = TemplateService::new(&state);
    let templates = service
        .list_templates(doctor_id, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({ "templates": templates })))
}

#[axum::debug_handler]
pub async fn update_template(
    State(state): State<Arc<AppConfig>>,
    Path(template_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;

    let service = TemplateService::new(&state);
    let template = service
        .update_template(template_id, doctor_id, request, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "message": "Availability template updated",
        "template": template
    })))
}

#[axum::debug_handler]
pub async fn delete_template(
    State(state): State<Arc<AppConfig>>,
    Path(template_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;

    let service = TemplateService::new(&state);
    service
        .delete_template(template_id, doctor_id, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({ "message": "Availability template deleted" })))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn generate_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<GenerateSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;

    let service = SlotService::new(&state);
    let created = service
        .generate_slots(doctor_id, request.days_ahead, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "message": format!("Generated {} time slots", created),
        "slots_created": created
    })))
}

/// Public listing of a doctor's open slots; no authentication required so
/// patients can browse before booking.
#[axum::debug_handler]
pub async fn list_doctor_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = SlotService::new(&state);
    let slots = service
        .list_available_slots(doctor_id, query, None)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({ "slots": slots })))
}

#[axum::debug_handler]
pub async fn cleanup_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CleanupSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth(
            "Only admins can run the slot retention sweep".to_string(),
        ));
    }

    let service = SlotService::new(&state);
    let deleted = service
        .cleanup_expired_slots(request.older_than_days, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "message": format!("Deleted {} old available slots", deleted),
        "slots_deleted": deleted
    })))
}
