pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::jobs::handlers as jobs;
use crate::notifications::handlers as notifications;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/api/health", get(health::health_handler))
        .route("/api/keycheck", get(health::keycheck_handler))
        // Analysis jobs
        .route("/api/analyze", post(jobs::handle_analyze))
        .route("/api/result/:id", get(jobs::handle_get_result))
        // Notifications
        .route("/api/notifications", get(notifications::handle_list_unread))
        .route(
            "/api/notifications/read",
            post(notifications::handle_mark_all_read),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
