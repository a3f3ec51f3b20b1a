// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All scheduling operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/mine", get(handlers::my_appointments))
        // Doctor queue views
        .route("/doctor/today", get(handlers::doctor_today_queue))
        .route("/doctor/tomorrow", get(handlers::doctor_tomorrow_queue))
        .route("/doctor/completed", get(handlers::doctor_completed_appointments))
        // Missed-appointment cleanup (admin only)
        .route("/cleanup-missed", post(handlers::cleanup_missed_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .patch(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route(
            "/{appointment_id}/delete-if-missed",
            delete(handlers::delete_if_missed),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
