use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AdmissionError, DoctorProfile};

/// Read-only access to the doctor directory. Bookable doctors must be both
/// verified and approved; everything else behaves as if the doctor does not
/// exist.
pub struct DoctorDirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl DoctorDirectoryService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_approved_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<DoctorProfile>, AdmissionError> {
        debug!("Resolving approved doctor {}", doctor_id);

        let path = format!(
            "/rest/v1/doctors?id=eq.{}&is_verified=eq.true&status=eq.APPROVED&limit=1",
            doctor_id
        );
        self.fetch_one(&path, auth_token).await
    }

    /// The caller's own doctor profile, if they have one. Used to build the
    /// `Actor::Doctor` capability and to detect self-booking.
    pub async fn find_profile_for_user(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<DoctorProfile>, AdmissionError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}&limit=1", user_id);
        self.fetch_one(&path, auth_token).await
    }

    async fn fetch_one(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Option<DoctorProfile>, AdmissionError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AdmissionError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let doctor: DoctorProfile = serde_json::from_value(row).map_err(|e| {
                    AdmissionError::Database(format!("Failed to parse doctor profile: {}", e))
                })?;
                Ok(Some(doctor))
            }
            None => Ok(None),
        }
    }
}
