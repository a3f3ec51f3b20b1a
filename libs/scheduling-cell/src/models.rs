// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

/// One appointment in a doctor's daily queue. `serial_number` is the 1-based
/// queue position for `(doctor, date)`; `approximate_time` is derived once at
/// creation from the doctor's availability window and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub appointment_number: String,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: NaiveDate,
    pub serial_number: i32,
    pub approximate_time: Option<NaiveTime>,
    pub status: AppointmentStatus,
    pub patient_notes: Option<String>,
    pub doctor_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Active bookings count toward the duplicate-booking rule.
    pub fn is_active_booking(&self) -> bool {
        matches!(
            self.status,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
}

impl AppointmentStatus {
    /// Status only moves forward: PENDING -> CONFIRMED -> COMPLETED.
    /// COMPLETED is terminal.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        *self != AppointmentStatus::Completed && next > *self
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "PENDING"),
            AppointmentStatus::Confirmed => write!(f, "CONFIRMED"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// A doctor's recurring open-hours interval for one weekday.
/// `day_of_week` uses the domain convention 0=Sunday..6=Saturday.
/// At most one active window exists per (doctor, weekday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

/// Doctor directory row, read-only to the scheduling core. Only verified and
/// approved doctors are bookable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: Option<String>,
    pub is_verified: bool,
    pub status: String,
}

// ==============================================================================
// CALLER IDENTITY
// ==============================================================================

/// Explicit caller capability union. A doctor carries their doctor-profile id
/// so self-booking and queue-ownership checks never probe attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Patient { user_id: Uuid },
    Doctor { user_id: Uuid, doctor_id: Uuid },
    Admin { user_id: Uuid },
}

impl Actor {
    pub fn user_id(&self) -> Uuid {
        match self {
            Actor::Patient { user_id }
            | Actor::Doctor { user_id, .. }
            | Actor::Admin { user_id } => *user_id,
        }
    }

    pub fn doctor_profile(&self) -> Option<Uuid> {
        match self {
            Actor::Doctor { doctor_id, .. } => Some(*doctor_id),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin { .. })
    }

    /// Whether this actor may see or mutate the given appointment: its
    /// patient, its doctor, or an admin.
    pub fn can_access(&self, appointment: &Appointment) -> bool {
        match self {
            Actor::Admin { .. } => true,
            Actor::Patient { user_id } => appointment.patient_id == *user_id,
            Actor::Doctor { user_id, doctor_id } => {
                appointment.doctor_id == *doctor_id || appointment.patient_id == *user_id
            }
        }
    }

    /// Ownership for the missed-appointment delete path: only the patient or
    /// the doctor on the appointment, never admins by proxy.
    pub fn is_party_to(&self, appointment: &Appointment) -> bool {
        match self {
            Actor::Patient { user_id } => appointment.patient_id == *user_id,
            Actor::Doctor { user_id, doctor_id } => {
                appointment.doctor_id == *doctor_id || appointment.patient_id == *user_id
            }
            Actor::Admin { .. } => false,
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub patient_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub patient_notes: Option<String>,
    pub doctor_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyAppointmentsResponse {
    pub upcoming: Vec<Appointment>,
    pub past: Vec<Appointment>,
}

/// Doctor's queue for today. Missed rows are purged rather than hidden, so
/// `missed_count` is reported as 0 by design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodayQueueResponse {
    pub date: NaiveDate,
    pub total_appointments: usize,
    pub upcoming_count: usize,
    pub missed_count: usize,
    pub no_time_count: usize,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayListResponse {
    pub date: NaiveDate,
    pub total_appointments: usize,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedListResponse {
    pub total_appointments: usize,
    pub appointments: Vec<Appointment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AdmissionError {
    #[error("You can only book appointments for today or tomorrow.")]
    DateOutOfRange,

    #[error("You cannot book an appointment with yourself.")]
    SelfBooking,

    #[error("Doctor is not available on {weekday}.")]
    DoctorUnavailable { weekday: String },

    #[error("Doctor is not accepting appointments for today (time has passed).")]
    WindowClosed,

    #[error("You already have an appointment with this doctor on this date.")]
    DuplicateBooking,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Cannot modify or delete completed appointments.")]
    ImmutableState,

    #[error("Cannot transition appointment from {from} to {to}.")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment is not eligible for deletion (not missed).")]
    NotMissed,

    #[error("Database error: {0}")]
    Database(String),
}

impl AdmissionError {
    /// Field the validation error should be reported against, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            AdmissionError::DateOutOfRange
            | AdmissionError::DoctorUnavailable { .. }
            | AdmissionError::WindowClosed
            | AdmissionError::DuplicateBooking => Some("appointment_date"),
            AdmissionError::SelfBooking => Some("doctor"),
            AdmissionError::InvalidTransition { .. } => Some("status"),
            _ => None,
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        let field = err.field().map(str::to_string);
        match err {
            AdmissionError::DateOutOfRange
            | AdmissionError::SelfBooking
            | AdmissionError::DoctorUnavailable { .. }
            | AdmissionError::WindowClosed
            | AdmissionError::DuplicateBooking
            | AdmissionError::InvalidTransition { .. } => AppError::Validation {
                field,
                message: err.to_string(),
            },
            AdmissionError::NotFound(_) => AppError::NotFound(err.to_string()),
            AdmissionError::Forbidden(msg) => AppError::Forbidden(msg),
            AdmissionError::ImmutableState | AdmissionError::NotMissed => {
                AppError::BadRequest(err.to_string())
            }
            AdmissionError::Database(msg) => AppError::Database(msg),
        }
    }
}
