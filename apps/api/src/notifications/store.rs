use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::NotificationRow;

pub async fn create_notification(
    pool: &SqlitePool,
    id: Uuid,
    job_id: Uuid,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notifications (id, job_id, message, is_read, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(id)
    .bind(job_id)
    .bind(message)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Unread notifications, newest first.
pub async fn get_unread_notifications(
    pool: &SqlitePool,
) -> Result<Vec<NotificationRow>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(
        "SELECT * FROM notifications WHERE is_read = 0 ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(pool)
    .await
}

/// Marks every unread notification as read. There is a single global inbox.
pub async fn mark_notifications_read(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let outcome = sqlx::query("UPDATE notifications SET is_read = 1 WHERE is_read = 0")
        .execute(pool)
        .await?;
    Ok(outcome.rows_affected())
}
