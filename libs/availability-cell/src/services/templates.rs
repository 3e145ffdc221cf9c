// libs/availability-cell/src/services/templates.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityError, AvailabilityTemplate, CreateTemplateRequest, UpdateTemplateRequest,
};

pub struct TemplateService {
    supabase: Arc<SupabaseClient>,
}

impl TemplateService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Create a weekly availability template for a doctor.
    ///
    /// Exact duplicates of (doctor, day_of_week, start_time) are rejected;
    /// overlapping-but-not-identical windows are allowed and collapse in the
    /// slot generator's (date, start_time) dedup.
    pub async fn create_template(
        &self,
        doctor_id: Uuid,
        request: CreateTemplateRequest,
        auth_token: &str,
    ) -> Result<AvailabilityTemplate, AvailabilityError> {
        debug!("Creating availability template for doctor {}", doctor_id);

        if request.start_time >= request.end_time {
            return Err(AvailabilityError::InvalidTimeRange);
        }

        if !(0..=6).contains(&request.day_of_week) {
            return Err(AvailabilityError::InvalidDayOfWeek(request.day_of_week));
        }

        self.check_duplicate(doctor_id, request.day_of_week, &request, auth_token)
            .await?;

        let now = Utc::now();
        let template_data = json!({
            "doctor_id": doctor_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_active": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/availability_templates",
                Some(auth_token),
                Some(template_data),
                Some(headers),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let template = result
            .into_iter()
            .next()
            .ok_or_else(|| {
                AvailabilityError::DatabaseError("Failed to create template".to_string())
            })?;

        let template: AvailabilityTemplate = serde_json::from_value(template)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse template: {}", e)))?;

        info!("Availability template created: {}", template.id);
        Ok(template)
    }

    /// List all templates for a doctor, ordered by day then start time.
    pub async fn list_templates(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityTemplate>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_templates?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
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

    /// Apply an enumerated patch to a template owned by `doctor_id`.
    pub async fn update_template(
        &self,
        template_id: Uuid,
        doctor_id: Uuid,
        request: UpdateTemplateRequest,
        auth_token: &str,
    ) -> Result<AvailabilityTemplate, AvailabilityError> {
        debug!("Updating availability template {}", template_id);

        let current = self.get_template(template_id, auth_token).await?;

        if current.doctor_id != doctor_id {
            return Err(AvailabilityError::Unauthorized);
        }

        let new_start = request.start_time.unwrap_or(current.start_time);
        let new_end = request.end_time.unwrap_or(current.end_time);
        if new_start >= new_end {
            return Err(AvailabilityError::InvalidTimeRange);
        }

        let mut update_data = serde_json::Map::new();
        if let Some(start_time) = request.start_time {
            update_data.insert(
                "start_time".to_string(),
                json!(start_time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(end_time) = request.end_time {
            update_data.insert(
                "end_time".to_string(),
                json!(end_time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/availability_templates?id=eq.{}", template_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let updated = result.into_iter().next().ok_or_else(|| {
            AvailabilityError::DatabaseError("Failed to update template".to_string())
        })?;

        serde_json::from_value(updated)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse template: {}", e)))
    }

    /// Delete a template owned by `doctor_id`. Already-generated slots are
    /// left in place; the retention sweep reclaims unbooked past ones.
    pub async fn delete_template(
        &self,
        template_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        debug!("Deleting availability template {}", template_id);

        let current = self.get_template(template_id, auth_token).await?;

        if current.doctor_id != doctor_id {
            return Err(AvailabilityError::Unauthorized);
        }

        let path = format!("/rest/v1/availability_templates?id=eq.{}", template_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn get_template(
        &self,
        template_id: Uuid,
        auth_token: &str,
    ) -> Result<AvailabilityTemplate, AvailabilityError> {
        let path = format!("/rest/v1/availability_templates?id=eq.{}", template_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let template = result
            .into_iter()
            .next()
            .ok_or(AvailabilityError::TemplateNotFound)?;

        serde_json::from_value(template)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse template: {}", e)))
    }

    async fn check_duplicate(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
        request: &CreateTemplateRequest,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_templates?doctor_id=eq.{}&day_of_week=eq.{}&start_time=eq.{}",
            doctor_id,
            day_of_week,
            request.start_time.format("%H:%M:%S")
        );

        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(AvailabilityError::DuplicateTemplate);
        }

        Ok(())
    }
}
