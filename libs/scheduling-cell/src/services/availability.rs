use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_database::supabase::SupabaseClient;

use crate::models::{AdmissionError, AvailabilityWindow};

/// Convert a calendar date's weekday to the domain numbering, 0=Sunday..6=Saturday.
/// chrono counts Monday=0, so the mapping is (monday0 + 1) mod 7.
pub fn domain_weekday(date: NaiveDate) -> i32 {
    (date.weekday().num_days_from_monday() as i32 + 1) % 7
}

/// Full weekday name for user-facing messages ("Doctor is not available on Sunday.").
pub fn weekday_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

/// Read-only lookup of per-doctor, per-weekday open/close windows. The windows
/// themselves are owned by doctor-profile management; the scheduling core never
/// writes them.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// The active window for (doctor, weekday), or None when the doctor does
    /// not sit that day. At most one active window exists per pair.
    pub async fn get_active_window(
        &self,
        doctor_id: uuid::Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Option<AvailabilityWindow>, AdmissionError> {
        debug!(
            "Fetching availability window for doctor {} on weekday {}",
            doctor_id, day_of_week
        );

        let path = format!(
            "/rest/v1/doctor_schedules?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&limit=1",
            doctor_id, day_of_week
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let window: AvailabilityWindow = serde_json::from_value(row).map_err(|e| {
                    AdmissionError::Database(format!("Failed to parse availability window: {}", e))
                })?;
                Ok(Some(window))
            }
            None => Ok(None),
        }
    }
}
