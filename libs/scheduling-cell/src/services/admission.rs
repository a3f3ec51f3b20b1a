// libs/scheduling-cell/src/services/admission.rs
//
// Booking admission control: validates a booking request against date bounds,
// doctor availability, duplicate/self-booking rules, then assigns the serial
// number, appointment number and approximate time under scheduling locks so
// concurrent bookings cannot race to the same counters.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    Actor, AdmissionError, Appointment, AppointmentStatus, AvailabilityWindow,
    BookAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::availability::{domain_weekday, weekday_name, AvailabilityService};
use crate::services::directory::DoctorDirectoryService;
use crate::services::slots;

pub struct AdmissionService {
    supabase: Arc<SupabaseClient>,
    availability: AvailabilityService,
    directory: DoctorDirectoryService,
    lock_timeout_seconds: i64,
    max_retry_attempts: u32,
}

impl AdmissionService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            availability: AvailabilityService::new(Arc::clone(&supabase)),
            directory: DoctorDirectoryService::new(Arc::clone(&supabase)),
            supabase,
            lock_timeout_seconds: 30,
            max_retry_attempts: 3,
        }
    }

    /// Validate and create a booking. Fail-fast: the first failed rule wins.
    pub async fn create_appointment(
        &self,
        actor: &Actor,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AdmissionError> {
        info!(
            "Booking appointment for patient {} with doctor {}",
            actor.user_id(),
            request.doctor_id
        );

        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);

        // 1. Bookings are accepted for today or tomorrow only.
        if request.appointment_date != today && request.appointment_date != tomorrow {
            return Err(AdmissionError::DateOutOfRange);
        }

        // 2. Doctors cannot book themselves.
        if actor.doctor_profile() == Some(request.doctor_id) {
            return Err(AdmissionError::SelfBooking);
        }

        // 3. Doctor must exist, be verified and approved.
        let doctor = self
            .directory
            .get_approved_doctor(request.doctor_id, auth_token)
            .await?
            .ok_or_else(|| AdmissionError::NotFound("Doctor".to_string()))?;

        // 4. Doctor must have an active window on that weekday.
        let weekday = domain_weekday(request.appointment_date);
        let window = self
            .availability
            .get_active_window(doctor.id, weekday, auth_token)
            .await?
            .ok_or_else(|| AdmissionError::DoctorUnavailable {
                weekday: weekday_name(request.appointment_date),
            })?;

        // 5. Same-day bookings must land strictly before the window closes.
        if request.appointment_date == today && now.time() >= window.end_time {
            return Err(AdmissionError::WindowClosed);
        }

        // 6. One active booking per (patient, doctor, date).
        if self
            .has_active_booking(actor.user_id(), doctor.id, request.appointment_date, auth_token)
            .await?
        {
            return Err(AdmissionError::DuplicateBooking);
        }

        // 7-9. Assign counters and persist under scheduling locks.
        self.persist_with_counters(actor.user_id(), &window, request, now, auth_token)
            .await
    }

    /// Fetch an appointment the actor is allowed to see.
    pub async fn get_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AdmissionError> {
        let appointment = self
            .fetch_appointment(appointment_id, auth_token)
            .await?
            .ok_or_else(|| AdmissionError::NotFound("Appointment".to_string()))?;

        if !actor.can_access(&appointment) {
            return Err(AdmissionError::Forbidden(
                "You do not have permission to view this appointment".to_string(),
            ));
        }

        Ok(appointment)
    }

    /// Status transitions and note edits. COMPLETED appointments accept note
    /// edits but no further status changes.
    pub async fn update_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AdmissionError> {
        debug!("Updating appointment: {}", appointment_id);

        let current = self.get_appointment(actor, appointment_id, auth_token).await?;

        let actor_is_doctor = actor.doctor_profile() == Some(current.doctor_id);

        if let Some(new_status) = request.status {
            if !actor_is_doctor && !actor.is_admin() {
                return Err(AdmissionError::Forbidden(
                    "Patients cannot update appointment status".to_string(),
                ));
            }
            if current.status == AppointmentStatus::Completed {
                return Err(AdmissionError::ImmutableState);
            }
            if !current.status.can_transition_to(new_status) {
                return Err(AdmissionError::InvalidTransition {
                    from: current.status,
                    to: new_status,
                });
            }
        }

        if request.doctor_notes.is_some() && !actor_is_doctor && !actor.is_admin() {
            return Err(AdmissionError::Forbidden(
                "Patients cannot update doctor notes".to_string(),
            ));
        }

        let mut update = Map::new();
        if let Some(status) = request.status {
            update.insert("status".to_string(), json!(status));
        }
        if let Some(patient_notes) = request.patient_notes {
            update.insert("patient_notes".to_string(), json!(patient_notes));
        }
        if let Some(doctor_notes) = request.doctor_notes {
            update.insert("doctor_notes".to_string(), json!(doctor_notes));
        }
        update.insert("updated_at".to_string(), json!(now.to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update)),
                Some(return_representation()),
            )
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        let updated = result
            .into_iter()
            .next()
            .ok_or_else(|| AdmissionError::NotFound("Appointment".to_string()))?;

        let appointment: Appointment = serde_json::from_value(updated)
            .map_err(|e| AdmissionError::Database(format!("Failed to parse appointment: {}", e)))?;

        info!("Appointment {} updated successfully", appointment_id);
        Ok(appointment)
    }

    /// Hard delete of a non-completed appointment by its patient, its doctor,
    /// or an admin. There is no cancelled state to fall back to.
    pub async fn delete_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AdmissionError> {
        let appointment = self.get_appointment(actor, appointment_id, auth_token).await?;

        if appointment.status == AppointmentStatus::Completed {
            return Err(AdmissionError::ImmutableState);
        }

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(return_representation()),
            )
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    pub async fn fetch_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AdmissionError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let appointment: Appointment = serde_json::from_value(row).map_err(|e| {
                    AdmissionError::Database(format!("Failed to parse appointment: {}", e))
                })?;
                Ok(Some(appointment))
            }
            None => Ok(None),
        }
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn has_active_booking(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<bool, AdmissionError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&doctor_id=eq.{}&appointment_date=eq.{}&status=in.(PENDING,CONFIRMED)&limit=1",
            patient_id, doctor_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        Ok(!result.is_empty())
    }

    /// Counter assignment and insert, serialized by two scheduling locks: one
    /// per (doctor, date) for the serial number and one per date for the
    /// appointment number. Lock contention backs off and retries.
    async fn persist_with_counters(
        &self,
        patient_id: Uuid,
        window: &AvailabilityWindow,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AdmissionError> {
        let day_lock = format!("apptno_{}", request.appointment_date);
        let queue_lock = format!("booking_{}_{}", request.doctor_id, request.appointment_date);

        for attempt in 1..=self.max_retry_attempts {
            debug!(
                "Booking attempt {} for doctor {} on {}",
                attempt, request.doctor_id, request.appointment_date
            );

            if !self.acquire_scheduling_lock(&day_lock).await? {
                warn!("Appointment-number lock contended, retrying {}/{}", attempt, self.max_retry_attempts);
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64)).await;
                continue;
            }

            let queue_acquired = match self.acquire_scheduling_lock(&queue_lock).await {
                Ok(acquired) => acquired,
                Err(e) => {
                    self.release_lock_best_effort(&day_lock).await;
                    return Err(e);
                }
            };
            if !queue_acquired {
                self.release_lock_best_effort(&day_lock).await;
                warn!("Queue lock contended, retrying {}/{}", attempt, self.max_retry_attempts);
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64)).await;
                continue;
            }

            let outcome = self
                .insert_under_locks(patient_id, window, &request, now, auth_token)
                .await;

            // Both locks come free whether or not the insert went through.
            self.release_lock_best_effort(&queue_lock).await;
            self.release_lock_best_effort(&day_lock).await;

            return outcome;
        }

        Err(AdmissionError::Database(
            "Failed to book appointment after multiple attempts".to_string(),
        ))
    }

    async fn insert_under_locks(
        &self,
        patient_id: Uuid,
        window: &AvailabilityWindow,
        request: &BookAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AdmissionError> {
        let serial_number = self
            .next_serial_number(request.doctor_id, request.appointment_date, auth_token)
            .await?;
        let appointment_number = self
            .next_appointment_number(request.appointment_date, auth_token)
            .await?;

        // Computed once here and frozen on the row.
        let approximate_time = slots::approximate_time(Some(window), serial_number);

        let appointment_id = Uuid::new_v4();
        let row = json!({
            "id": appointment_id,
            "appointment_number": appointment_number,
            "doctor_id": request.doctor_id,
            "patient_id": patient_id,
            "appointment_date": request.appointment_date,
            "serial_number": serial_number,
            "approximate_time": approximate_time,
            "status": AppointmentStatus::Confirmed,
            "patient_notes": request.patient_notes,
            "doctor_notes": null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(row),
                Some(return_representation()),
            )
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        let created = result
            .into_iter()
            .next()
            .ok_or_else(|| AdmissionError::Database("Appointment creation returned no row".to_string()))?;

        let appointment: Appointment = serde_json::from_value(created)
            .map_err(|e| AdmissionError::Database(format!("Failed to parse appointment: {}", e)))?;

        info!(
            "Appointment {} booked: serial {} at {:?}",
            appointment.appointment_number, appointment.serial_number, appointment.approximate_time
        );
        Ok(appointment)
    }

    /// Next queue position for (doctor, date): highest existing serial plus
    /// one. Serials are never reused, even after deletions.
    async fn next_serial_number(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i32, AdmissionError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&select=serial_number&order=serial_number.desc&limit=1",
            doctor_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        let last = result
            .first()
            .and_then(|row| row.get("serial_number"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        Ok(last as i32 + 1)
    }

    /// Next APT-YYYYMMDD-NNN for the date, across all doctors. The sequence
    /// continues from the highest suffix still stored so reaped rows never
    /// free a number. Suffixes are compared numerically here: string
    /// ordering sorts "-1000" below "-999" once a day passes 999 bookings.
    async fn next_appointment_number(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<String, AdmissionError> {
        let path = format!(
            "/rest/v1/appointments?appointment_date=eq.{}&select=appointment_number",
            date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        let next = next_number_sequence(
            result
                .iter()
                .filter_map(|row| row.get("appointment_number"))
                .filter_map(Value::as_str),
        );

        Ok(format_appointment_number(date, next))
    }

    // ==========================================================================
    // SCHEDULING LOCKS
    // ==========================================================================

    async fn acquire_scheduling_lock(&self, lock_key: &str) -> Result<bool, AdmissionError> {
        match self.try_insert_lock(lock_key).await {
            Ok(()) => {
                debug!("Scheduling lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(_) => {
                // Lock row exists; clean it up if its holder expired.
                if self.cleanup_expired_lock(lock_key).await? {
                    match self.try_insert_lock(lock_key).await {
                        Ok(()) => {
                            debug!("Scheduling lock acquired after cleanup: {}", lock_key);
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn try_insert_lock(&self, lock_key: &str) -> Result<(), AdmissionError> {
        let lock_row = json!({
            "lock_key": lock_key,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "process_id": format!("scheduler_{}", Uuid::new_v4()),
        });

        self.supabase
            .request_with_headers::<Vec<Value>>(
                Method::POST,
                "/rest/v1/scheduling_locks",
                None,
                Some(lock_row),
                Some(return_representation()),
            )
            .await
            .map(|_| ())
            .map_err(|e| AdmissionError::Database(e.to_string()))
    }

    async fn release_scheduling_lock(&self, lock_key: &str) -> Result<(), AdmissionError> {
        let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key);
        self.supabase
            .request_with_headers::<Vec<Value>>(
                Method::DELETE,
                &path,
                None,
                None,
                Some(return_representation()),
            )
            .await
            .map_err(|e| AdmissionError::Database(format!("Lock release failed: {}", e)))?;

        debug!("Scheduling lock released: {}", lock_key);
        Ok(())
    }

    /// Release that never masks the caller's own result. A failed release
    /// leaves the row to expire on its own.
    async fn release_lock_best_effort(&self, lock_key: &str) {
        if let Err(e) = self.release_scheduling_lock(lock_key).await {
            warn!("Failed to release scheduling lock {}: {}", lock_key, e);
        }
    }

    async fn cleanup_expired_lock(&self, lock_key: &str) -> Result<bool, AdmissionError> {
        let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AdmissionError::Database(format!("Lock check failed: {}", e)))?;

        if let Some(lock) = result.first() {
            if let Some(expires_at) = lock
                .get("expires_at")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            {
                if expires_at.with_timezone(&Utc) < Utc::now() {
                    self.release_scheduling_lock(lock_key).await?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

pub(crate) fn format_appointment_number(date: NaiveDate, sequence: i32) -> String {
    format!("APT-{}-{:03}", date.format("%Y%m%d"), sequence)
}

pub(crate) fn number_sequence(number: &str) -> Option<i32> {
    number.rsplit('-').next().and_then(|suffix| suffix.parse::<i32>().ok())
}

pub(crate) fn next_number_sequence<'a>(numbers: impl Iterator<Item = &'a str>) -> i32 {
    numbers.filter_map(number_sequence).max().unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appointment_number_format() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 24).unwrap();
        assert_eq!(format_appointment_number(date, 1), "APT-20231224-001");
        assert_eq!(format_appointment_number(date, 42), "APT-20231224-042");
        assert_eq!(format_appointment_number(date, 123), "APT-20231224-123");
    }

    #[test]
    fn number_sequence_continues_from_numeric_max() {
        assert_eq!(next_number_sequence(std::iter::empty()), 1);
        assert_eq!(next_number_sequence(["APT-20231224-001"].into_iter()), 2);
        assert_eq!(
            next_number_sequence(
                ["APT-20231224-002", "APT-20231224-099", "APT-20231224-001"].into_iter()
            ),
            100
        );
    }

    #[test]
    fn four_digit_suffixes_outrank_three_digit_ones() {
        // Lexicographically "-1000" sorts below "-999"; the numeric compare
        // must not stall there.
        assert_eq!(
            next_number_sequence(["APT-20231224-999", "APT-20231224-1000"].into_iter()),
            1001
        );
    }

    #[test]
    fn number_sequence_ignores_garbage() {
        assert_eq!(next_number_sequence(["not-a-number"].into_iter()), 1);
    }
}
