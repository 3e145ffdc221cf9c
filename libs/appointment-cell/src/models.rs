// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// SCHEDULING POLICY CONSTANTS
// ==============================================================================

/// Cancellation and rescheduling close this many hours before the start.
pub const CANCELLATION_NOTICE_HOURS: i64 = 2;

/// An appointment may be rescheduled at most this many times.
pub const MAX_RESCHEDULE_COUNT: i32 = 2;

/// The join window opens this many minutes before the scheduled start.
pub const JOIN_WINDOW_OPENS_MINUTES: i64 = 15;

/// The join window closes this many minutes after the scheduled end.
pub const JOIN_WINDOW_CLOSES_MINUTES: i64 = 30;

/// Minimum length of a cancellation reason.
pub const MIN_CANCELLATION_REASON_LEN: usize = 10;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub appointment_number: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// The reserved slot. Nullable: cancellation releases the slot while the
    /// appointment keeps its own copy of date and times.
    pub time_slot_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub reason: String,
    pub symptoms: String,
    pub video_room_url: Option<String>,
    pub video_host_url: Option<String>,
    pub video_room_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub rescheduled_from: Option<Uuid>,
    pub reschedule_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn start_datetime(&self) -> DateTime<Utc> {
        self.date.and_time(self.start_time).and_utc()
    }

    pub fn end_datetime(&self) -> DateTime<Utc> {
        self.date.and_time(self.end_time).and_utc()
    }

    /// Cancellable only outside terminal states and more than two hours
    /// before the scheduled start.
    pub fn can_cancel(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.start_datetime() > now + Duration::hours(CANCELLATION_NOTICE_HOURS)
    }

    /// Reschedulable while the reschedule cap is not exhausted and
    /// cancellation would still be allowed for the current time.
    pub fn can_reschedule(&self, now: DateTime<Utc>) -> bool {
        if self.reschedule_count >= MAX_RESCHEDULE_COUNT {
            return false;
        }
        self.can_cancel(now)
    }

    /// The video room is joinable from 15 minutes before the start through
    /// 30 minutes after the end, boundaries included.
    pub fn can_join(&self, now: DateTime<Utc>) -> bool {
        if !matches!(
            self.status,
            AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        ) {
            return false;
        }

        let join_opens = self.start_datetime() - Duration::minutes(JOIN_WINDOW_OPENS_MINUTES);
        let join_closes = self.end_datetime() + Duration::minutes(JOIN_WINDOW_CLOSES_MINUTES);

        join_opens <= now && now <= join_closes
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// How the booking entered the system. Self-service bookings against an open
/// slot are confirmed immediately; provider-mediated bookings wait for an
/// explicit confirm or reject from the doctor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEntry {
    SelfService,
    ProviderMediated,
}

impl BookingEntry {
    pub fn initial_status(&self) -> AppointmentStatus {
        match self {
            BookingEntry::SelfService => AppointmentStatus::Confirmed,
            BookingEntry::ProviderMediated => AppointmentStatus::Pending,
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub time_slot_id: Uuid,
    /// Required when a doctor or admin books on behalf of a patient.
    pub patient_id: Option<Uuid>,
    pub reason: Option<String>,
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub cancellation_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_time_slot_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentQuery {
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Time slot not found")]
    SlotNotFound,

    #[error("This time slot is not available")]
    SlotNotAvailable,

    #[error("Cannot book a slot in the past")]
    SlotInPast,

    #[error("This slot does not belong to the selected doctor")]
    SlotDoctorMismatch,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor is not verified")]
    DoctorNotEligible,

    #[error("Appointments can only be cancelled more than {CANCELLATION_NOTICE_HOURS} hours before the start time")]
    CancellationWindowClosed,

    #[error("Maximum number of reschedules reached")]
    RescheduleLimitReached,

    #[error("The video room can only be joined around the scheduled time")]
    JoinWindowClosed,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Appointment was modified concurrently, please retry")]
    ConcurrentUpdate,

    #[error("Not authorized to access this appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
