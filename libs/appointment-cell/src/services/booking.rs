// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::SlotStatus;
use notification_cell::{AppointmentEvent, AppointmentEventKind, NotificationDispatcher};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, BookAppointmentRequest, BookingEntry,
};
use crate::services::store;

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    notifier: NotificationDispatcher,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            notifier: NotificationDispatcher::new(config),
        }
    }

    /// Book an available slot for a patient.
    ///
    /// Validation runs before any write; the slot flip is a conditional
    /// update re-checked in the store, so two concurrent bookings of the
    /// same slot resolve with exactly one winner. If the appointment insert
    /// fails after the slot was reserved, the reservation is compensated.
    pub async fn book_appointment(
        &self,
        user: &User,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let (patient_id, entry) = self.resolve_booking_entry(user, &request)?;

        info!(
            "Booking slot {} with doctor {} for patient {}",
            request.time_slot_id, request.doctor_id, patient_id
        );

        let now = Utc::now();

        let slot = store::fetch_slot(&self.supabase, request.time_slot_id, auth_token).await?;

        if slot.status != SlotStatus::Available {
            return Err(AppointmentError::SlotNotAvailable);
        }

        if slot.date.and_time(slot.start_time).and_utc() <= now {
            return Err(AppointmentError::SlotInPast);
        }

        self.verify_doctor_eligible(request.doctor_id, auth_token).await?;

        if slot.doctor_id != request.doctor_id {
            return Err(AppointmentError::SlotDoctorMismatch);
        }

        if !store::reserve_slot(&self.supabase, slot.id, auth_token).await? {
            // Someone else won the slot between our read and the flip.
            return Err(AppointmentError::SlotNotAvailable);
        }

        let appointment_id = Uuid::new_v4();
        let status = entry.initial_status();
        let row = json!({
            "id": appointment_id,
            "appointment_number": generate_appointment_number(now),
            "patient_id": patient_id,
            "doctor_id": request.doctor_id,
            "time_slot_id": slot.id,
            "date": slot.date,
            "start_time": slot.start_time.format("%H:%M:%S").to_string(),
            "end_time": slot.end_time.format("%H:%M:%S").to_string(),
            "status": status.to_string(),
            "reason": request.reason.unwrap_or_default(),
            "symptoms": request.symptoms.unwrap_or_default(),
            "video_room_url": null,
            "video_host_url": null,
            "video_room_id": null,
            "cancellation_reason": null,
            "cancelled_by": null,
            "cancelled_at": null,
            "rescheduled_from": null,
            "reschedule_count": 0,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let appointment = match store::insert_appointment(&self.supabase, row, auth_token).await {
            Ok(appointment) => appointment,
            Err(e) => {
                warn!(
                    "Appointment insert failed after reserving slot {}, releasing it",
                    slot.id
                );
                let _ = store::release_slot(&self.supabase, slot.id, auth_token).await;
                return Err(e);
            }
        };

        info!(
            "Appointment {} booked ({}) for patient {} with doctor {}",
            appointment.appointment_number, appointment.status, patient_id, request.doctor_id
        );

        self.notifier.dispatch(AppointmentEvent::new(
            AppointmentEventKind::Booked,
            appointment.id,
            &appointment.appointment_number,
            appointment.patient_id,
            appointment.doctor_id,
            appointment.date,
            appointment.start_time,
        ));

        Ok(appointment)
    }

    /// Fetch an appointment the acting user participates in.
    pub async fn get_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment =
            store::fetch_appointment(&self.supabase, appointment_id, auth_token).await?;
        verify_participant(user, &appointment)?;
        Ok(appointment)
    }

    /// List the acting user's appointments: patients see their own, doctors
    /// their schedule, admins everything.
    pub async fn list_my_appointments(
        &self,
        user: &User,
        query: AppointmentQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = "/rest/v1/appointments?".to_string();
        let mut filters = Vec::new();

        if user.is_doctor() {
            filters.push(format!("doctor_id=eq.{}", user.id));
        } else if !user.is_admin() {
            filters.push(format!("patient_id=eq.{}", user.id));
        }

        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(date_from) = query.date_from {
            filters.push(format!("date=gte.{}", date_from));
        }
        if let Some(date_to) = query.date_to {
            filters.push(format!("date=lte.{}", date_to));
        }

        filters.push("order=date.desc,start_time.desc".to_string());
        path.push_str(&filters.join("&"));

        self.fetch_appointments(&path, auth_token).await
    }

    /// Upcoming pending or confirmed appointments from today onward.
    pub async fn list_upcoming(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let today = Utc::now().date_naive();
        let mut path = format!(
            "/rest/v1/appointments?date=gte.{}&status=in.(pending,confirmed)",
            today
        );

        if user.is_doctor() {
            path.push_str(&format!("&doctor_id=eq.{}", user.id));
        } else if !user.is_admin() {
            path.push_str(&format!("&patient_id=eq.{}", user.id));
        }

        path.push_str("&order=date.asc,start_time.asc");

        self.fetch_appointments(&path, auth_token).await
    }

    /// A doctor's active schedule for one day, ordered by start time.
    pub async fn doctor_day_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status=in.(confirmed,in_progress)&order=start_time.asc",
            doctor_id, date
        );

        self.fetch_appointments(&path, auth_token).await
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments: {}", path);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter().map(store::parse_appointment).collect()
    }

    fn resolve_booking_entry(
        &self,
        user: &User,
        request: &BookAppointmentRequest,
    ) -> Result<(Uuid, BookingEntry), AppointmentError> {
        if user.is_doctor() || user.is_admin() {
            let patient_id = request.patient_id.ok_or_else(|| {
                AppointmentError::ValidationError(
                    "patient_id is required when booking on behalf of a patient".to_string(),
                )
            })?;
            return Ok((patient_id, BookingEntry::ProviderMediated));
        }

        let actor_id = Uuid::parse_str(&user.id).map_err(|_| AppointmentError::Unauthorized)?;

        if let Some(patient_id) = request.patient_id {
            if patient_id != actor_id {
                return Err(AppointmentError::Unauthorized);
            }
        }

        Ok((actor_id, BookingEntry::SelfService))
    }

    async fn verify_doctor_eligible(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/doctor_profiles?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let doctor = result.into_iter().next().ok_or(AppointmentError::DoctorNotFound)?;

        if doctor["verification_status"].as_str() != Some("verified") {
            return Err(AppointmentError::DoctorNotEligible);
        }

        Ok(())
    }
}

/// Access check shared by queries and lifecycle operations.
pub(crate) fn verify_participant(
    user: &User,
    appointment: &Appointment,
) -> Result<(), AppointmentError> {
    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_doctor = appointment.doctor_id.to_string() == user.id;

    if !is_patient && !is_doctor && !user.is_admin() {
        return Err(AppointmentError::Unauthorized);
    }

    Ok(())
}

/// Unique human-readable appointment number: APT-YYYYMMDD-XXXX.
pub(crate) fn generate_appointment_number(now: DateTime<Utc>) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();

    let suffix: String = (0..4)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    format!("APT-{}-{}", now.format("%Y%m%d"), suffix)
}
