// libs/scheduling-cell/src/services/queue.rs
//
// Read-side queue views: a patient's upcoming/past split and a doctor's
// today/tomorrow/completed lists. All ordering and partitioning decisions live
// in pure functions over already-fetched rows.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AdmissionError, Appointment, AppointmentStatus, CompletedListResponse, DayListResponse,
    MyAppointmentsResponse, TodayQueueResponse,
};

pub struct QueueViewService {
    supabase: Arc<SupabaseClient>,
}

impl QueueViewService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// All of a patient's appointments split into upcoming and past.
    pub async fn my_appointments(
        &self,
        patient_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<MyAppointmentsResponse, AdmissionError> {
        debug!("Fetching appointments for patient {}", patient_id);

        let path = format!("/rest/v1/appointments?patient_id=eq.{}", patient_id);
        let appointments = self.fetch_appointments(&path, auth_token).await?;

        let (upcoming, past) = partition_patient_appointments(appointments, now);
        Ok(MyAppointmentsResponse { upcoming, past })
    }

    /// Today's live queue for a doctor: upcoming slots first, then unslotted
    /// rows; appointments whose approximate time has already passed are
    /// dropped from the view (the reaper owns removing them from storage).
    pub async fn doctor_today(
        &self,
        doctor_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<TodayQueueResponse, AdmissionError> {
        let today = now.date_naive();
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.COMPLETED",
            doctor_id, today
        );
        let appointments = self.fetch_appointments(&path, auth_token).await?;

        Ok(build_today_queue(appointments, now))
    }

    /// Tomorrow's bookings in serial order. No time filtering applies yet.
    pub async fn doctor_tomorrow(
        &self,
        doctor_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<DayListResponse, AdmissionError> {
        let tomorrow = now.date_naive() + Duration::days(1);
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.COMPLETED&order=serial_number.asc",
            doctor_id, tomorrow
        );
        let appointments = self.fetch_appointments(&path, auth_token).await?;

        Ok(DayListResponse {
            date: tomorrow,
            total_appointments: appointments.len(),
            appointments,
        })
    }

    /// A doctor's completed history, most recent day first.
    pub async fn doctor_completed(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<CompletedListResponse, AdmissionError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.COMPLETED&order=appointment_date.desc,created_at.desc",
            doctor_id
        );
        let appointments = self.fetch_appointments(&path, auth_token).await?;

        Ok(CompletedListResponse {
            total_appointments: appointments.len(),
            appointments,
        })
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AdmissionError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AdmissionError::Database(format!("Failed to parse appointment: {}", e))
                })
            })
            .collect()
    }
}

/// Upcoming = not yet completed and dated today or later, soonest first.
/// Past = everything else (older dates, or completed regardless of date),
/// most recent first.
pub fn partition_patient_appointments(
    appointments: Vec<Appointment>,
    now: DateTime<Utc>,
) -> (Vec<Appointment>, Vec<Appointment>) {
    let today = now.date_naive();

    let (mut upcoming, mut past): (Vec<_>, Vec<_>) = appointments.into_iter().partition(|a| {
        a.appointment_date >= today && a.status != AppointmentStatus::Completed
    });

    upcoming.sort_by_key(|a| (a.appointment_date, a.serial_number));
    past.sort_by_key(|a| Reverse((a.appointment_date, a.serial_number)));

    (upcoming, past)
}

/// Assemble today's queue from non-completed rows for the day. Rows with a
/// slot time at or after `now` come first in slot order; rows with no slot
/// time follow in serial order; rows whose slot time has passed are missed
/// and excluded entirely. `missed_count` stays 0: missed rows are deleted by
/// the reaper, not counted here.
pub fn build_today_queue(appointments: Vec<Appointment>, now: DateTime<Utc>) -> TodayQueueResponse {
    let current_time = now.time();

    let mut upcoming: Vec<Appointment> = Vec::new();
    let mut no_time: Vec<Appointment> = Vec::new();

    for appointment in appointments {
        match appointment.approximate_time {
            Some(t) if t >= current_time => upcoming.push(appointment),
            Some(_) => {} // missed, dropped from the view
            None => no_time.push(appointment),
        }
    }

    upcoming.sort_by_key(|a| (a.approximate_time.unwrap_or(NaiveTime::MIN), a.serial_number));
    no_time.sort_by_key(|a| a.serial_number);

    let upcoming_count = upcoming.len();
    let no_time_count = no_time.len();

    let mut queue = upcoming;
    queue.extend(no_time);

    TodayQueueResponse {
        date: now.date_naive(),
        total_appointments: queue.len(),
        upcoming_count,
        missed_count: 0,
        no_time_count,
        appointments: queue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn appointment(
        date: NaiveDate,
        serial: i32,
        approx: Option<&str>,
        status: AppointmentStatus,
    ) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            appointment_number: format!("APT-{}-{:03}", date.format("%Y%m%d"), serial),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            appointment_date: date,
            serial_number: serial,
            approximate_time: approx.map(|t| t.parse().unwrap()),
            status,
            patient_notes: None,
            doctor_notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn at(date: NaiveDate, time: &str) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_time(time.parse().unwrap()))
    }

    #[test]
    fn partition_splits_on_date_and_completion() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let yesterday = today - Duration::days(1);
        let tomorrow = today + Duration::days(1);
        let now = at(today, "10:00:00");

        let rows = vec![
            appointment(yesterday, 1, Some("09:00:00"), AppointmentStatus::Confirmed),
            appointment(today, 2, Some("09:10:00"), AppointmentStatus::Completed),
            appointment(today, 3, Some("09:20:00"), AppointmentStatus::Confirmed),
            appointment(tomorrow, 1, Some("09:00:00"), AppointmentStatus::Pending),
        ];

        let (upcoming, past) = partition_patient_appointments(rows, now);

        // Today's confirmed row stays upcoming even though its slot passed;
        // only date and status matter for the patient view.
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].appointment_date, today);
        assert_eq!(upcoming[1].appointment_date, tomorrow);

        assert_eq!(past.len(), 2);
        assert_eq!(past[0].appointment_date, today); // completed today sorts first
        assert_eq!(past[1].appointment_date, yesterday);
    }

    #[test]
    fn today_queue_drops_missed_and_orders_by_slot() {
        // Sunday window 09:00-16:00, serials 1-4 booked, clock at 09:25:
        // serials 1-3 (09:00, 09:10, 09:20) are missed, serial 4 (09:30) is
        // the only row shown.
        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        let now = at(today, "09:25:00");

        let rows = vec![
            appointment(today, 1, Some("09:00:00"), AppointmentStatus::Confirmed),
            appointment(today, 2, Some("09:10:00"), AppointmentStatus::Confirmed),
            appointment(today, 3, Some("09:20:00"), AppointmentStatus::Confirmed),
            appointment(today, 4, Some("09:30:00"), AppointmentStatus::Confirmed),
        ];

        let queue = build_today_queue(rows, now);

        assert_eq!(queue.total_appointments, 1);
        assert_eq!(queue.upcoming_count, 1);
        assert_eq!(queue.missed_count, 0);
        assert_eq!(queue.appointments[0].serial_number, 4);
    }

    #[test]
    fn today_queue_slot_exactly_now_is_upcoming() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        let now = at(today, "09:10:00");

        let rows = vec![
            appointment(today, 2, Some("09:10:00"), AppointmentStatus::Confirmed),
        ];
        let queue = build_today_queue(rows, now);

        assert_eq!(queue.upcoming_count, 1);
    }

    #[test]
    fn today_queue_unslotted_rows_trail_in_serial_order() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        let now = at(today, "08:00:00");

        let rows = vec![
            appointment(today, 3, None, AppointmentStatus::Confirmed),
            appointment(today, 1, Some("09:00:00"), AppointmentStatus::Confirmed),
            appointment(today, 2, None, AppointmentStatus::Pending),
        ];

        let queue = build_today_queue(rows, now);

        assert_eq!(queue.total_appointments, 3);
        assert_eq!(queue.upcoming_count, 1);
        assert_eq!(queue.no_time_count, 2);
        let serials: Vec<i32> = queue.appointments.iter().map(|a| a.serial_number).collect();
        assert_eq!(serials, vec![1, 2, 3]);
    }

    #[test]
    fn empty_queue_has_zero_counts() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        let queue = build_today_queue(vec![], at(today, "12:00:00"));

        assert_eq!(queue.total_appointments, 0);
        assert_eq!(queue.upcoming_count, 0);
        assert_eq!(queue.no_time_count, 0);
        assert!(queue.appointments.is_empty());
    }
}
