//! Job persistence. Every write is a single statement touching one row
//! (or one predicate-qualified set), so no explicit locking is needed.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{JobRow, JobStatus};

/// Inserts a new job in `pending`. Fails with a constraint violation if `id` already exists.
pub async fn create_job(
    pool: &SqlitePool,
    id: Uuid,
    cv_content: &str,
    target_role: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO jobs (id, status, cv_content, target_role, result, error, created_at, updated_at)
        VALUES (?, ?, ?, ?, NULL, NULL, ?, ?)
        "#,
    )
    .bind(id)
    .bind(JobStatus::Pending)
    .bind(cv_content)
    .bind(target_role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrites status, result, error and `updated_at`. Returns the number of rows
/// affected; zero means `id` does not exist.
pub async fn update_job_status(
    pool: &SqlitePool,
    id: Uuid,
    status: JobStatus,
    result: Option<&str>,
    error: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE jobs SET status = ?, result = ?, error = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(result)
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected())
}

/// Moves a job from `pending` to `processing`. Returns `false` when the job is
/// missing or was already claimed.
pub async fn claim_job(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query(
        "UPDATE jobs SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(JobStatus::Processing)
    .bind(Utc::now())
    .bind(id)
    .bind(JobStatus::Pending)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() == 1)
}

pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// All pending jobs, oldest first. Insertion order breaks timestamp ties.
pub async fn get_pending_jobs(pool: &SqlitePool) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(
        "SELECT * FROM jobs WHERE status = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(JobStatus::Pending)
    .fetch_all(pool)
    .await
}

/// Fails every job left in `processing` by a previous process and returns them.
pub async fn fail_interrupted_jobs(
    pool: &SqlitePool,
    message: &str,
) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs SET status = ?, result = NULL, error = ?, updated_at = ?
        WHERE status = ?
        RETURNING *
        "#,
    )
    .bind(JobStatus::Failed)
    .bind(message)
    .bind(Utc::now())
    .bind(JobStatus::Processing)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStats {
    pub jobs: u64,
    pub notifications: u64,
}

/// Deletes terminal jobs last touched before `cutoff` (with their notifications)
/// and read notifications created before `cutoff`.
pub async fn purge_expired(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<PurgeStats, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let linked = sqlx::query(
        r#"
        DELETE FROM notifications WHERE job_id IN (
            SELECT id FROM jobs WHERE status IN (?, ?) AND updated_at < ?
        )
        "#,
    )
    .bind(JobStatus::Completed)
    .bind(JobStatus::Failed)
    .bind(cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let jobs = sqlx::query("DELETE FROM jobs WHERE status IN (?, ?) AND updated_at < ?")
        .bind(JobStatus::Completed)
        .bind(JobStatus::Failed)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let read = sqlx::query("DELETE FROM notifications WHERE is_read = 1 AND created_at < ?")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    Ok(PurgeStats {
        jobs,
        notifications: linked + read,
    })
}
