use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One-way domain events emitted after a scheduling write commits.
/// Delivery is best-effort; the emitting operation never waits on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventKind {
    Booked,
    Confirmed,
    Cancelled,
    Rescheduled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub kind: AppointmentEventKind,
    pub appointment_id: Uuid,
    pub appointment_number: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub emitted_at: DateTime<Utc>,
    pub detail: Option<String>,
}

impl AppointmentEvent {
    pub fn new(
        kind: AppointmentEventKind,
        appointment_id: Uuid,
        appointment_number: &str,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Self {
        Self {
            kind,
            appointment_id,
            appointment_number: appointment_number.to_string(),
            patient_id,
            doctor_id,
            date,
            start_time,
            emitted_at: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
