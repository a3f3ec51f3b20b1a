// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{Actor, BookAppointmentRequest, UpdateAppointmentRequest};
use crate::services::admission::AdmissionService;
use crate::services::directory::DoctorDirectoryService;
use crate::services::queue::QueueViewService;
use crate::services::reaper::ReaperService;
use shared_database::supabase::SupabaseClient;

/// Build the caller's capability from the authenticated user. Doctors carry
/// their doctor-profile id; users with a doctor role but no profile row are
/// treated as plain patients.
async fn resolve_actor(
    config: &AppConfig,
    user: &User,
    token: &str,
) -> Result<Actor, AppError> {
    let user_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;

    if user.is_admin() {
        return Ok(Actor::Admin { user_id });
    }

    if user.is_doctor() {
        let directory = DoctorDirectoryService::new(Arc::new(SupabaseClient::new(config)));
        if let Some(profile) = directory.find_profile_for_user(user_id, token).await? {
            return Ok(Actor::Doctor {
                user_id,
                doctor_id: profile.id,
            });
        }
    }

    Ok(Actor::Patient { user_id })
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;

    let admission = AdmissionService::new(&state);
    let appointment = admission
        .create_appointment(&actor, request, Utc::now(), token)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Appointment booked successfully",
            "appointment": appointment,
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;

    let admission = AdmissionService::new(&state);
    let appointment = admission.get_appointment(&actor, appointment_id, token).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;

    let admission = AdmissionService::new(&state);
    let appointment = admission
        .update_appointment(&actor, appointment_id, request, Utc::now(), token)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment updated successfully",
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;

    let admission = AdmissionService::new(&state);
    admission.delete_appointment(&actor, appointment_id, token).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted successfully",
    })))
}

// ==============================================================================
// QUEUE VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;

    let queue = QueueViewService::new(&state);
    let response = queue
        .my_appointments(actor.user_id(), Utc::now(), token)
        .await?;

    Ok(Json(json!(response)))
}

fn require_doctor(actor: &Actor) -> Result<Uuid, AppError> {
    actor
        .doctor_profile()
        .ok_or_else(|| AppError::Forbidden("Only doctors can access this endpoint".to_string()))
}

#[axum::debug_handler]
pub async fn doctor_today_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;
    let doctor_id = require_doctor(&actor)?;

    let queue = QueueViewService::new(&state);
    let response = queue.doctor_today(doctor_id, Utc::now(), token).await?;

    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn doctor_tomorrow_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;
    let doctor_id = require_doctor(&actor)?;

    let queue = QueueViewService::new(&state);
    let response = queue.doctor_tomorrow(doctor_id, Utc::now(), token).await?;

    Ok(Json(json!(response)))
}

#[axum::debug_handler]
pub async fn doctor_completed_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;
    let doctor_id = require_doctor(&actor)?;

    let queue = QueueViewService::new(&state);
    let response = queue.doctor_completed(doctor_id, token).await?;

    Ok(Json(json!(response)))
}

// ==============================================================================
// MISSED-APPOINTMENT CLEANUP
// ==============================================================================

#[axum::debug_handler]
pub async fn cleanup_missed_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only staff members can trigger this action".to_string(),
        ));
    }

    let reaper = ReaperService::new(&state);
    let deleted = reaper.sweep_today(Utc::now(), auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "deleted_count": deleted,
        "message": format!("Removed {} missed appointment(s)", deleted),
    })))
}

#[axum::debug_handler]
pub async fn delete_if_missed(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = resolve_actor(&state, &user, token).await?;

    let reaper = ReaperService::new(&state);
    reaper
        .delete_if_missed(&actor, appointment_id, Utc::now(), token)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Missed appointment deleted",
    })))
}
