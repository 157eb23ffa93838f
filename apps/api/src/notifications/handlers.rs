use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::NotificationRow;
use crate::notifications::store::{get_unread_notifications, mark_notifications_read};
use crate::state::AppState;

/// GET /api/notifications
pub async fn handle_list_unread(
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationRow>>, AppError> {
    Ok(Json(get_unread_notifications(&state.db).await?))
}

/// POST /api/notifications/read
pub async fn handle_mark_all_read(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let marked = mark_notifications_read(&state.db).await?;
    tracing::debug!("Marked {marked} notifications read");
    Ok(Json(json!({ "success": true })))
}
