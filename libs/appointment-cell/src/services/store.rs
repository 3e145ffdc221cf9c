// libs/appointment-cell/src/services/store.rs
//
// Conditional-write helpers shared by the booking and lifecycle services.
//
// Slot reservations use PostgREST filtered PATCHes as an optimistic
// compare-and-swap: the filter re-checks the precondition inside the store,
// and `Prefer: return=representation` exposes whether any row matched. Under
// concurrent attempts on the same slot exactly one caller observes a row;
// everyone else gets an empty result and a typed conflict.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use availability_cell::models::TimeSlot;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

pub(crate) async fn fetch_slot(
    supabase: &SupabaseClient,
    slot_id: Uuid,
    auth_token: &str,
) -> Result<TimeSlot, AppointmentError> {
    let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);
    let result: Vec<Value> = supabase
        .request(Method::GET, &path, Some(auth_token), None)
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    let slot = result.into_iter().next().ok_or(AppointmentError::SlotNotFound)?;

    serde_json::from_value(slot)
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse slot: {}", e)))
}

/// Flip a slot `available -> booked` iff it is still available.
/// Returns false when the conditional update matched no row, meaning a
/// concurrent caller won the reservation.
pub(crate) async fn reserve_slot(
    supabase: &SupabaseClient,
    slot_id: Uuid,
    auth_token: &str,
) -> Result<bool, AppointmentError> {
    let path = format!(
        "/rest/v1/time_slots?id=eq.{}&status=eq.available",
        slot_id
    );

    let result: Vec<Value> = supabase
        .request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "status": "booked" })),
            Some(representation_headers()),
        )
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    if result.is_empty() {
        debug!("Lost reservation race for slot {}", slot_id);
    }

    Ok(!result.is_empty())
}

/// Flip a slot `booked -> available`. Used by cancellation, rejection and
/// reschedule-release, and as the compensating action when an appointment
/// write fails after the slot was already reserved.
pub(crate) async fn release_slot(
    supabase: &SupabaseClient,
    slot_id: Uuid,
    auth_token: &str,
) -> Result<(), AppointmentError> {
    let path = format!("/rest/v1/time_slots?id=eq.{}&status=eq.booked", slot_id);

    let result: Vec<Value> = supabase
        .request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "status": "available" })),
            Some(representation_headers()),
        )
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    if result.is_empty() {
        warn!("Slot {} was not in booked state during release", slot_id);
    }

    Ok(())
}

pub(crate) async fn fetch_appointment(
    supabase: &SupabaseClient,
    appointment_id: Uuid,
    auth_token: &str,
) -> Result<Appointment, AppointmentError> {
    let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
    let result: Vec<Value> = supabase
        .request(Method::GET, &path, Some(auth_token), None)
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    let appointment = result.into_iter().next().ok_or(AppointmentError::NotFound)?;

    parse_appointment(appointment)
}

/// Conditionally update an appointment: `filters` are extra PostgREST
/// conditions re-checked in the store (status sets, reschedule counters).
/// Returns the updated row, or None when the preconditions no longer held.
pub(crate) async fn conditional_update_appointment(
    supabase: &SupabaseClient,
    appointment_id: Uuid,
    filters: &str,
    update: Value,
    auth_token: &str,
) -> Result<Option<Appointment>, AppointmentError> {
    let path = format!(
        "/rest/v1/appointments?id=eq.{}{}",
        appointment_id, filters
    );

    let result: Vec<Value> = supabase
        .request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update),
            Some(representation_headers()),
        )
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    match result.into_iter().next() {
        Some(row) => Ok(Some(parse_appointment(row)?)),
        None => Ok(None),
    }
}

pub(crate) async fn insert_appointment(
    supabase: &SupabaseClient,
    row: Value,
    auth_token: &str,
) -> Result<Appointment, AppointmentError> {
    let result: Vec<Value> = supabase
        .request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(row),
            Some(representation_headers()),
        )
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    let appointment = result.into_iter().next().ok_or_else(|| {
        AppointmentError::DatabaseError("Failed to create appointment".to_string())
    })?;

    parse_appointment(appointment)
}

pub(crate) fn parse_appointment(value: Value) -> Result<Appointment, AppointmentError> {
    serde_json::from_value(value)
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
}
