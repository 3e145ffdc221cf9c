// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::SlotStatus;
use notification_cell::{AppointmentEvent, AppointmentEventKind, NotificationDispatcher};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CancelAppointmentRequest,
    RejectAppointmentRequest, RescheduleAppointmentRequest, MAX_RESCHEDULE_COUNT,
    MIN_CANCELLATION_REASON_LEN,
};
use crate::services::booking::verify_participant;
use crate::services::store;

/// Minutes past the scheduled start after which a confirmed appointment may
/// be marked as a no-show.
const NO_SHOW_THRESHOLD_MINUTES: i64 = 30;

/// Owns every status transition. Guards run before any write; the write
/// itself re-checks the expected current status (and, for reschedules, the
/// reschedule counter) inside the store, so a racing pair of transitions
/// resolves with one winner and one typed error.
pub struct LifecycleService {
    supabase: Arc<SupabaseClient>,
    notifier: NotificationDispatcher,
}

impl LifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            notifier: NotificationDispatcher::new(config),
        }
    }

    /// Valid next statuses for a given current status. Terminal states have
    /// no outgoing transitions.
    pub fn valid_transitions(current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_transition(
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !Self::valid_transitions(current).contains(&next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(AppointmentError::InvalidStatusTransition(current));
        }
        Ok(())
    }

    /// Doctor confirms a pending appointment.
    pub async fn confirm(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .load_for_doctor(user, appointment_id, auth_token)
            .await?;

        Self::validate_transition(appointment.status, AppointmentStatus::Confirmed)?;

        let updated = store::conditional_update_appointment(
            &self.supabase,
            appointment_id,
            "&status=eq.pending",
            json!({
                "status": AppointmentStatus::Confirmed.to_string(),
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        )
        .await?
        .ok_or(AppointmentError::ConcurrentUpdate)?;

        info!("Appointment {} confirmed", updated.appointment_number);
        self.notify(&updated, AppointmentEventKind::Confirmed, None);

        Ok(updated)
    }

    /// Doctor rejects a pending appointment. The reservation is released so
    /// the slot becomes bookable again.
    pub async fn reject(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: RejectAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "A rejection reason is required".to_string(),
            ));
        }

        let appointment = self
            .load_for_doctor(user, appointment_id, auth_token)
            .await?;

        if appointment.status != AppointmentStatus::Pending {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let now = Utc::now();
        let updated = store::conditional_update_appointment(
            &self.supabase,
            appointment_id,
            "&status=eq.pending",
            json!({
                "status": AppointmentStatus::Cancelled.to_string(),
                "cancellation_reason": request.reason,
                "cancelled_by": user.id,
                "cancelled_at": now.to_rfc3339(),
                "updated_at": now.to_rfc3339()
            }),
            auth_token,
        )
        .await?
        .ok_or(AppointmentError::ConcurrentUpdate)?;

        if let Some(slot_id) = updated.time_slot_id {
            store::release_slot(&self.supabase, slot_id, auth_token).await?;
        }

        info!("Appointment {} rejected", updated.appointment_number);
        self.notify(&updated, AppointmentEventKind::Cancelled, Some("rejected by doctor"));

        Ok(updated)
    }

    /// Cancel an appointment. Allowed to either participant (or an admin)
    /// while the cancellation window is open; flips the slot back to
    /// available in the same logical operation.
    pub async fn cancel(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.cancellation_reason.trim().len() < MIN_CANCELLATION_REASON_LEN {
            return Err(AppointmentError::ValidationError(format!(
                "Cancellation reason must be at least {} characters",
                MIN_CANCELLATION_REASON_LEN
            )));
        }

        let appointment =
            store::fetch_appointment(&self.supabase, appointment_id, auth_token).await?;
        verify_participant(user, &appointment)?;

        let now = Utc::now();

        if appointment.status.is_terminal() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }
        if !appointment.can_cancel(now) {
            return Err(AppointmentError::CancellationWindowClosed);
        }

        let updated = store::conditional_update_appointment(
            &self.supabase,
            appointment_id,
            "&status=in.(pending,confirmed,in_progress)",
            json!({
                "status": AppointmentStatus::Cancelled.to_string(),
                "cancellation_reason": request.cancellation_reason,
                "cancelled_by": user.id,
                "cancelled_at": now.to_rfc3339(),
                "updated_at": now.to_rfc3339()
            }),
            auth_token,
        )
        .await?
        .ok_or(AppointmentError::ConcurrentUpdate)?;

        if let Some(slot_id) = updated.time_slot_id {
            store::release_slot(&self.supabase, slot_id, auth_token).await?;
        }

        info!(
            "Appointment {} cancelled by {}",
            updated.appointment_number, user.id
        );
        self.notify(&updated, AppointmentEventKind::Cancelled, None);

        Ok(updated)
    }

    /// Move an appointment to a new slot with the same doctor.
    ///
    /// Reservation order matters: the new slot is reserved first, then the
    /// appointment row is swapped with its status and reschedule counter
    /// re-checked in the store, and only then is the old slot released. A
    /// lost race on the appointment row compensates the fresh reservation.
    pub async fn reschedule(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !user.is_patient() {
            return Err(AppointmentError::Unauthorized);
        }

        let appointment =
            store::fetch_appointment(&self.supabase, appointment_id, auth_token).await?;

        if appointment.patient_id.to_string() != user.id {
            return Err(AppointmentError::Unauthorized);
        }

        let now = Utc::now();

        if !matches!(
            appointment.status,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        ) {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }
        if appointment.reschedule_count >= MAX_RESCHEDULE_COUNT {
            return Err(AppointmentError::RescheduleLimitReached);
        }
        if !appointment.can_cancel(now) {
            return Err(AppointmentError::CancellationWindowClosed);
        }

        let new_slot =
            store::fetch_slot(&self.supabase, request.new_time_slot_id, auth_token).await?;

        if new_slot.status != SlotStatus::Available {
            return Err(AppointmentError::SlotNotAvailable);
        }
        if new_slot.date.and_time(new_slot.start_time).and_utc() <= now {
            return Err(AppointmentError::SlotInPast);
        }
        if new_slot.doctor_id != appointment.doctor_id {
            return Err(AppointmentError::SlotDoctorMismatch);
        }

        if !store::reserve_slot(&self.supabase, new_slot.id, auth_token).await? {
            return Err(AppointmentError::SlotNotAvailable);
        }

        let filters = format!(
            "&status=in.(pending,confirmed)&reschedule_count=eq.{}",
            appointment.reschedule_count
        );
        let lineage = appointment.rescheduled_from.unwrap_or(appointment.id);

        let update = json!({
            "time_slot_id": new_slot.id,
            "date": new_slot.date,
            "start_time": new_slot.start_time.format("%H:%M:%S").to_string(),
            "end_time": new_slot.end_time.format("%H:%M:%S").to_string(),
            "reschedule_count": appointment.reschedule_count + 1,
            "rescheduled_from": lineage,
            "updated_at": now.to_rfc3339()
        });

        let updated = match store::conditional_update_appointment(
            &self.supabase,
            appointment_id,
            &filters,
            update,
            auth_token,
        )
        .await?
        {
            Some(updated) => updated,
            None => {
                // A concurrent cancel or reschedule won; give the new slot back.
                warn!(
                    "Reschedule of appointment {} lost the race, releasing slot {}",
                    appointment_id, new_slot.id
                );
                store::release_slot(&self.supabase, new_slot.id, auth_token).await?;
                return Err(AppointmentError::ConcurrentUpdate);
            }
        };

        if let Some(old_slot_id) = appointment.time_slot_id {
            store::release_slot(&self.supabase, old_slot_id, auth_token).await?;
        }

        info!(
            "Appointment {} rescheduled to {} {} (count {})",
            updated.appointment_number, updated.date, updated.start_time, updated.reschedule_count
        );
        self.notify(&updated, AppointmentEventKind::Rescheduled, None);

        Ok(updated)
    }

    /// Doctor starts the consultation.
    pub async fn start(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .load_for_doctor(user, appointment_id, auth_token)
            .await?;

        Self::validate_transition(appointment.status, AppointmentStatus::InProgress)?;

        let updated = store::conditional_update_appointment(
            &self.supabase,
            appointment_id,
            "&status=in.(pending,confirmed)",
            json!({
                "status": AppointmentStatus::InProgress.to_string(),
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        )
        .await?
        .ok_or(AppointmentError::ConcurrentUpdate)?;

        info!("Appointment {} started", updated.appointment_number);
        Ok(updated)
    }

    /// Doctor completes a confirmed or in-progress consultation.
    pub async fn complete(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .load_for_doctor(user, appointment_id, auth_token)
            .await?;

        Self::validate_transition(appointment.status, AppointmentStatus::Completed)?;

        let updated = store::conditional_update_appointment(
            &self.supabase,
            appointment_id,
            "&status=in.(confirmed,in_progress)",
            json!({
                "status": AppointmentStatus::Completed.to_string(),
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        )
        .await?
        .ok_or(AppointmentError::ConcurrentUpdate)?;

        info!("Appointment {} completed", updated.appointment_number);
        self.notify(&updated, AppointmentEventKind::Completed, None);

        Ok(updated)
    }

    /// Doctor marks a confirmed appointment as a no-show once the patient is
    /// more than 30 minutes late.
    pub async fn mark_no_show(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .load_for_doctor(user, appointment_id, auth_token)
            .await?;

        Self::validate_transition(appointment.status, AppointmentStatus::NoShow)?;

        let now = Utc::now();
        let threshold =
            appointment.start_datetime() + Duration::minutes(NO_SHOW_THRESHOLD_MINUTES);
        if now <= threshold {
            return Err(AppointmentError::ValidationError(format!(
                "Appointments can be marked as no-show only {} minutes after the start time",
                NO_SHOW_THRESHOLD_MINUTES
            )));
        }

        let updated = store::conditional_update_appointment(
            &self.supabase,
            appointment_id,
            "&status=eq.confirmed",
            json!({
                "status": AppointmentStatus::NoShow.to_string(),
                "updated_at": now.to_rfc3339()
            }),
            auth_token,
        )
        .await?
        .ok_or(AppointmentError::ConcurrentUpdate)?;

        info!("Appointment {} marked as no-show", updated.appointment_number);
        Ok(updated)
    }

    async fn load_for_doctor(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !user.is_doctor() {
            return Err(AppointmentError::Unauthorized);
        }

        let appointment =
            store::fetch_appointment(&self.supabase, appointment_id, auth_token).await?;

        if appointment.doctor_id.to_string() != user.id {
            return Err(AppointmentError::Unauthorized);
        }

        Ok(appointment)
    }

    fn notify(
        &self,
        appointment: &Appointment,
        kind: AppointmentEventKind,
        detail: Option<&str>,
    ) {
        debug!(
            "Dispatching {:?} event for appointment {}",
            kind, appointment.id
        );

        let mut event = AppointmentEvent::new(
            kind,
            appointment.id,
            &appointment.appointment_number,
            appointment.patient_id,
            appointment.doctor_id,
            appointment.date,
            appointment.start_time,
        );
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }

        self.notifier.dispatch(event);
    }
}
