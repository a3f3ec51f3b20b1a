// libs/scheduling-cell/src/services/reaper.rs
//
// Missed-appointment cleanup. A same-day appointment whose approximate time
// has passed without being completed is deleted outright; there is no
// cancelled or missed status to park it in.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{Actor, AdmissionError, Appointment, AppointmentStatus};

/// Missed means: dated today, has a slot time, that time is strictly in the
/// past, and the visit never completed. Future dates are never missed, and a
/// slot exactly at `now` is still live.
pub fn is_missed(appointment: &Appointment, now: DateTime<Utc>) -> bool {
    appointment.appointment_date == now.date_naive()
        && appointment.status != AppointmentStatus::Completed
        && appointment
            .approximate_time
            .map(|t| t < now.time())
            .unwrap_or(false)
}

pub struct ReaperService {
    supabase: Arc<SupabaseClient>,
}

impl ReaperService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Delete every missed appointment for today and return how many went.
    pub async fn sweep_today(
        &self,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<usize, AdmissionError> {
        let today = now.date_naive();
        debug!("Sweeping missed appointments for {}", today);

        let path = format!(
            "/rest/v1/appointments?appointment_date=eq.{}&status=neq.COMPLETED",
            today
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        let mut missed_ids: Vec<Uuid> = Vec::new();
        for row in rows {
            let appointment: Appointment = serde_json::from_value(row).map_err(|e| {
                AdmissionError::Database(format!("Failed to parse appointment: {}", e))
            })?;
            if is_missed(&appointment, now) {
                missed_ids.push(appointment.id);
            }
        }

        if missed_ids.is_empty() {
            debug!("No missed appointments to sweep");
            return Ok(0);
        }

        let id_list = missed_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let delete_path = format!("/rest/v1/appointments?id=in.({})", id_list);

        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &delete_path,
                Some(auth_token),
                None,
                Some(return_representation()),
            )
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        info!("Swept {} missed appointment(s) for {}", deleted.len(), today);
        Ok(deleted.len())
    }

    /// Delete one appointment, but only if the caller is a party to it and it
    /// is actually missed right now.
    pub async fn delete_if_missed(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), AdmissionError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        let appointment: Appointment = rows
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AdmissionError::Database(format!("Failed to parse appointment: {}", e)))?
            .ok_or_else(|| AdmissionError::NotFound("Appointment".to_string()))?;

        if !actor.is_party_to(&appointment) {
            return Err(AdmissionError::Forbidden(
                "You do not have permission to delete this appointment".to_string(),
            ));
        }

        if !is_missed(&appointment, now) {
            return Err(AdmissionError::NotMissed);
        }

        self.supabase
            .request_with_headers::<Vec<Value>>(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(return_representation()),
            )
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        info!("Missed appointment {} deleted", appointment_id);
        Ok(())
    }
}

/// Periodic sweep loop, spawned at startup when an interval is configured.
/// Runs with the configured anon key rather than a per-user token.
pub async fn run_sweep_scheduler(config: Arc<AppConfig>, interval_minutes: u64) {
    let reaper = ReaperService::new(&config);
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval_minutes * 60));

    info!("Missed-appointment sweep running every {} minute(s)", interval_minutes);

    loop {
        ticker.tick().await;
        match reaper.sweep_today(Utc::now(), &config.supabase_anon_key).await {
            Ok(0) => {}
            Ok(count) => info!("Background sweep removed {} appointment(s)", count),
            Err(e) => error!("Background sweep failed: {}", e),
        }
    }
}
