// libs/availability-cell/src/services/slots.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityError, AvailabilityTemplate, CandidateSlot, SlotQuery, TimeSlot};

pub const SLOT_DURATION_MINUTES: i64 = 30;

const DEFAULT_HORIZON_DAYS: i64 = 30;
const MAX_HORIZON_DAYS: i64 = 90;
const DEFAULT_RETENTION_DAYS: i64 = 7;

pub struct SlotService {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct SlotKey {
    date: NaiveDate,
    start_time: NaiveTime,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Expand a doctor's active templates into concrete bookable slots for
    /// the coming horizon. Safe to re-run: candidates are diffed against
    /// existing rows and inserted with ignore-on-conflict, so an existing
    /// slot's status is never overwritten by regeneration.
    ///
    /// Returns the number of newly created slots.
    pub async fn generate_slots(
        &self,
        doctor_id: Uuid,
        days_ahead: Option<i64>,
        auth_token: &str,
    ) -> Result<usize, AvailabilityError> {
        let horizon = clamp_horizon(days_ahead);
        let today = Utc::now().date_naive();

        debug!(
            "Generating slots for doctor {} over {} days from {}",
            doctor_id, horizon, today
        );

        let templates = self.get_active_templates(doctor_id, auth_token).await?;
        if templates.is_empty() {
            return Ok(0);
        }

        let existing = self
            .get_existing_slot_keys(doctor_id, today, horizon, auth_token)
            .await?;

        let candidates = candidate_slots(&templates, &existing, today, horizon);
        if candidates.is_empty() {
            return Ok(0);
        }

        let rows: Vec<Value> = candidates
            .iter()
            .map(|slot| {
                json!({
                    "doctor_id": doctor_id,
                    "date": slot.date,
                    "start_time": slot.start_time.format("%H:%M:%S").to_string(),
                    "end_time": slot.end_time.format("%H:%M:%S").to_string(),
                    "status": "available"
                })
            })
            .collect();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "return=representation,resolution=ignore-duplicates",
            ),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/time_slots",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(headers),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        info!(
            "Generated {} new slots for doctor {} over {} days",
            candidates.len(),
            doctor_id,
            horizon
        );
        Ok(candidates.len())
    }

    /// List a doctor's open slots, optionally bounded by date filters.
    pub async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        query: SlotQuery,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let mut path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&status=eq.available",
            doctor_id
        );

        if let Some(date) = query.date {
            path.push_str(&format!("&date=eq.{}", date));
        }
        if let Some(date_from) = query.date_from {
            path.push_str(&format!("&date=gte.{}", date_from));
        }
        if let Some(date_to) = query.date_to {
            path.push_str(&format!("&date=lte.{}", date_to));
        }

        path.push_str("&order=date.asc,start_time.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|s| {
                serde_json::from_value(s).map_err(|e| {
                    AvailabilityError::DatabaseError(format!("Failed to parse slot: {}", e))
                })
            })
            .collect()
    }

    /// Retention sweep: delete past slots that were never booked. Booked and
    /// blocked slots are kept for the appointment audit trail.
    pub async fn cleanup_expired_slots(
        &self,
        older_than_days: Option<i64>,
        auth_token: &str,
    ) -> Result<usize, AvailabilityError> {
        let days = older_than_days.unwrap_or(DEFAULT_RETENTION_DAYS).max(0);
        let cutoff = Utc::now().date_naive() - Duration::days(days);

        debug!("Deleting available slots dated before {}", cutoff);

        let path = format!(
            "/rest/v1/time_slots?date=lt.{}&status=eq.available",
            cutoff
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        info!("Deleted {} expired available slots", deleted.len());
        Ok(deleted.len())
    }

    async fn get_active_templates(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityTemplate>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_templates?doctor_id=eq.{}&is_active=eq.true",
            doctor_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|t| {
                serde_json::from_value(t).map_err(|e| {
                    AvailabilityError::DatabaseError(format!("Failed to parse template: {}", e))
                })
            })
            .collect()
    }

    async fn get_existing_slot_keys(
        &self,
        doctor_id: Uuid,
        today: NaiveDate,
        horizon: i64,
        auth_token: &str,
    ) -> Result<HashSet<(NaiveDate, NaiveTime)>, AvailabilityError> {
        let until = today + Duration::days(horizon);
        let path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&date=gte.{}&date=lte.{}&select=date,start_time",
            doctor_id, today, until
        );

        let result: Vec<SlotKey> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(result
            .into_iter()
            .map(|key| (key.date, key.start_time))
            .collect())
    }
}

/// Clamp a requested generation horizon to a sane range. Out-of-range or
/// missing values fall back to 30 days, matching the booking window.
pub fn clamp_horizon(days_ahead: Option<i64>) -> i64 {
    match days_ahead {
        Some(days) if (1..=MAX_HORIZON_DAYS).contains(&days) => days,
        _ => DEFAULT_HORIZON_DAYS,
    }
}

/// Day-of-week index with Monday = 0, matching the template encoding.
pub fn weekday_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_monday() as i32
}

/// Walk each matching template window in fixed 30-minute steps and collect
/// the (date, start, end) triples not already present in `existing`.
///
/// Pure: takes today and the existing-slot set explicitly so generation
/// decisions are testable without a store.
pub fn candidate_slots(
    templates: &[AvailabilityTemplate],
    existing: &HashSet<(NaiveDate, NaiveTime)>,
    today: NaiveDate,
    horizon_days: i64,
) -> Vec<CandidateSlot> {
    let step = Duration::minutes(SLOT_DURATION_MINUTES);
    let mut seen = existing.clone();
    let mut candidates = Vec::new();

    for day_offset in 0..horizon_days {
        let date = today + Duration::days(day_offset);
        let day_of_week = weekday_index(date);

        for template in templates.iter().filter(|t| t.day_of_week == day_of_week) {
            let window_start = date.and_time(template.start_time);
            let window_end = date.and_time(template.end_time);
            let mut cursor = window_start;

            while cursor + step <= window_end {
                let start_time = cursor.time();
                let end_time = (cursor + step).time();

                if seen.insert((date, start_time)) {
                    candidates.push(CandidateSlot {
                        date,
                        start_time,
                        end_time,
                    });
                }

                cursor += step;
            }
        }
    }

    candidates
}
