//! Background analysis worker.
//!
//! Polls the `jobs` table on a fixed interval and drives every pending job to
//! `completed` or `failed`. Jobs within a tick run one after another in
//! creation order. A failing job never aborts the tick and is never retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::prompts::build_radar_prompt;
use crate::analysis::sanitize::{log_prefix, parse_analysis, sanitize, ParseError};
use crate::config::Config;
use crate::jobs::store::{
    claim_job, fail_interrupted_jobs, get_pending_jobs, purge_expired, update_job_status,
};
use crate::llm_client::{GenerationRequest, LlmError, TextGenerator};
use crate::models::{JobRow, JobStatus};
use crate::notifications::store::create_notification;

/// Error recorded on jobs that were mid-flight when the previous process stopped.
pub const INTERRUPTED_ERROR: &str = "Analysis was interrupted by a server restart";

/// Error prefix for jobs whose analysis succeeded but could not be stored.
pub const RECORD_FAILED_ERROR: &str = "Failed to store analysis result";

const TERMINAL_WRITE_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("AI request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub poll_interval: Duration,
    pub ai_timeout: Duration,
    pub search_grounding: bool,
    pub retention: Option<chrono::Duration>,
}

impl From<&Config> for WorkerOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            ai_timeout: config.ai_timeout,
            search_grounding: config.search_grounding,
            retention: config.retention,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// Another tick or process claimed the job first.
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Jobs abandoned because of a store error.
    pub errors: usize,
}

impl TickSummary {
    fn is_empty(&self) -> bool {
        *self == TickSummary::default()
    }
}

/// Handle to the spawned worker. `shutdown` lets the in-flight job finish,
/// stops further ticks and waits for the task to exit.
pub struct WorkerHandle {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl WorkerHandle {
    pub async fn shutdown(self) {
        // The receiver only disappears once the task has already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!("Analysis worker task failed: {e}");
        }
    }
}

#[derive(Clone)]
pub struct AnalysisWorker {
    pool: SqlitePool,
    generator: Arc<dyn TextGenerator>,
    options: WorkerOptions,
}

impl AnalysisWorker {
    pub fn new(pool: SqlitePool, generator: Arc<dyn TextGenerator>, options: WorkerOptions) -> Self {
        Self {
            pool,
            generator,
            options,
        }
    }

    /// Starts the polling loop on its own task. Call once per process.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(
                "Analysis worker started (interval: {}ms)",
                self.options.poll_interval.as_millis()
            );

            match self.recover_interrupted().await {
                Ok(0) => {}
                Ok(n) => warn!(count = n, "Failed jobs interrupted by a previous shutdown"),
                Err(e) => error!("Failed to recover interrupted jobs: {e}"),
            }

            let mut tick = tokio::time::interval(self.options.poll_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    // Fires on a shutdown request and when the handle is dropped.
                    _ = shutdown_rx.changed() => break,
                }

                let summary = self.run_tick(&shutdown_rx).await;
                if !summary.is_empty() {
                    info!(
                        completed = summary.completed,
                        failed = summary.failed,
                        skipped = summary.skipped,
                        errors = summary.errors,
                        "Worker tick finished"
                    );
                }

                if *shutdown_rx.borrow() {
                    break;
                }
            }

            info!("Analysis worker stopped");
        });

        WorkerHandle { handle, shutdown }
    }

    /// One tick: process every pending job oldest first, then apply retention.
    pub async fn run_tick(&self, shutdown: &watch::Receiver<bool>) -> TickSummary {
        let mut summary = TickSummary::default();

        let jobs = match get_pending_jobs(&self.pool).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to fetch pending jobs: {e}");
                return summary;
            }
        };

        if !jobs.is_empty() {
            debug!(count = jobs.len(), "Pending jobs found");
        }

        for job in &jobs {
            if *shutdown.borrow() {
                info!("Shutdown requested; remaining jobs stay pending");
                break;
            }

            match self.process_job(job).await {
                Ok(JobOutcome::Completed) => summary.completed += 1,
                Ok(JobOutcome::Failed) => summary.failed += 1,
                Ok(JobOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(job_id = %job.id, "Store error while processing job: {e}");
                    summary.errors += 1;
                }
            }
        }

        if let Some(retention) = self.options.retention {
            self.purge(retention).await;
        }

        summary
    }

    async fn purge(&self, retention: chrono::Duration) {
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            warn!("Retention window {retention} is out of range; skipping purge");
            return;
        };
        match purge_expired(&self.pool, cutoff).await {
            Ok(stats) if stats.jobs > 0 || stats.notifications > 0 => info!(
                jobs = stats.jobs,
                notifications = stats.notifications,
                "Purged expired records"
            ),
            Ok(_) => {}
            Err(e) => error!("Retention purge failed: {e}"),
        }
    }

    /// Fails jobs left in `processing` by a previous process, one notification each.
    /// Assumes this is the only worker process using the database.
    pub async fn recover_interrupted(&self) -> Result<usize, sqlx::Error> {
        let jobs = fail_interrupted_jobs(&self.pool, INTERRUPTED_ERROR).await?;
        for job in &jobs {
            warn!(job_id = %job.id, "Job was interrupted mid-analysis; marked failed");
            create_notification(
                &self.pool,
                Uuid::new_v4(),
                job.id,
                &failure_message(&job.target_role),
            )
            .await?;
        }
        Ok(jobs.len())
    }

    /// Claims and runs a single job. Analysis errors become the job's terminal
    /// state. If the completed result cannot be stored, the job is failed
    /// instead so it never stays claimed. Only store errors are returned.
    async fn process_job(&self, job: &JobRow) -> Result<JobOutcome, sqlx::Error> {
        if !claim_job(&self.pool, job.id).await? {
            warn!(job_id = %job.id, "Job already claimed; skipping");
            return Ok(JobOutcome::Skipped);
        }

        info!(job_id = %job.id, target_role = %job.target_role, "Processing job");

        let error = match self.analyze(job).await {
            Ok(result) => {
                let serialized = result.to_string();
                match self
                    .record(job.id, JobStatus::Completed, Some(&serialized), None)
                    .await
                {
                    Ok(recorded) => {
                        if recorded {
                            self.notify(job.id, &completion_message(&job.target_role))
                                .await?;
                        }
                        info!(job_id = %job.id, "Job completed");
                        return Ok(JobOutcome::Completed);
                    }
                    Err(e) => {
                        error!(job_id = %job.id, "Failed to store analysis result: {e}");
                        format!("{RECORD_FAILED_ERROR}: {e}")
                    }
                }
            }
            Err(e) => e.to_string(),
        };

        warn!(job_id = %job.id, error = %error, "Job failed");
        if self
            .record(job.id, JobStatus::Failed, None, Some(&error))
            .await?
        {
            self.notify(job.id, &failure_message(&job.target_role))
                .await?;
        }
        Ok(JobOutcome::Failed)
    }

    async fn analyze(&self, job: &JobRow) -> Result<Value, AnalysisError> {
        let prompt = build_radar_prompt(&job.cv_content, &job.target_role);
        let request = GenerationRequest {
            prompt: &prompt,
            search_grounding: self.options.search_grounding,
        };

        let raw = tokio::time::timeout(self.options.ai_timeout, self.generator.generate(&request))
            .await
            .map_err(|_| AnalysisError::Timeout(self.options.ai_timeout))??;

        parse_analysis(&raw).map_err(|e| {
            if let ParseError::Malformed(reason) = &e {
                error!(
                    job_id = %job.id,
                    reason = %reason,
                    "Failed to parse AI response as JSON: {}",
                    log_prefix(&sanitize(&raw))
                );
            }
            AnalysisError::Parse(e)
        })
    }

    /// Writes a terminal state, retrying once after a store error. Returns
    /// `false` when the job no longer exists.
    async fn record(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        debug_assert!(status.is_terminal());
        let affected = match update_job_status(&self.pool, job_id, status, result, error).await {
            Ok(affected) => affected,
            Err(e) => {
                warn!(job_id = %job_id, "Retrying {status} write after store error: {e}");
                tokio::time::sleep(TERMINAL_WRITE_RETRY_DELAY).await;
                update_job_status(&self.pool, job_id, status, result, error).await?
            }
        };
        if affected == 0 {
            warn!(job_id = %job_id, "Job vanished before its {status} state was recorded");
        }
        Ok(affected > 0)
    }

    async fn notify(&self, job_id: Uuid, message: &str) -> Result<(), sqlx::Error> {
        create_notification(&self.pool, Uuid::new_v4(), job_id, message).await
    }
}

fn completion_message(target_role: &str) -> String {
    format!("Your analysis for {target_role} is complete!")
}

fn failure_message(target_role: &str) -> String {
    format!("Your analysis for {target_role} failed. Please try again.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::db::test_pool;
    use crate::jobs::store::{create_job, get_job};
    use crate::notifications::store::get_unread_notifications;

    const RADAR_JSON: &str = r#"{"run_date":"2025-01-01","current_profile_summary":"SQL-focused analyst","recommended_technologies":[{"technology_name":"dbt","category":"Data Engineering","priority":"High","sources":["https://docs.getdbt.com"]}],"top_5_next_skills":["dbt","Snowflake","Looker","Airflow","Python"]}"#;

    enum Reply {
        Text(String),
        Error(LlmError),
        Hang,
    }

    /// Replays canned replies in order and records what it was asked, plus the
    /// job statuses visible at the moment of each call.
    struct ScriptedGenerator {
        pool: SqlitePool,
        replies: Mutex<VecDeque<Reply>>,
        prompts: Mutex<Vec<String>>,
        snapshots: Mutex<Vec<Vec<(Uuid, JobStatus)>>>,
    }

    impl ScriptedGenerator {
        fn new(pool: &SqlitePool, replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                pool: pool.clone(),
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
                snapshots: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, LlmError> {
            let snapshot: Vec<(Uuid, JobStatus)> =
                sqlx::query_as("SELECT id, status FROM jobs ORDER BY rowid")
                    .fetch_all(&self.pool)
                    .await
                    .unwrap();
            self.snapshots.lock().unwrap().push(snapshot);
            self.prompts.lock().unwrap().push(request.prompt.to_string());

            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Text(text)) => Ok(text),
                Some(Reply::Error(e)) => Err(e),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(RADAR_JSON.to_string())
                }
                None => Err(LlmError::EmptyContent),
            }
        }
    }

    fn options() -> WorkerOptions {
        WorkerOptions {
            poll_interval: Duration::from_millis(20),
            ai_timeout: Duration::from_secs(5),
            search_grounding: false,
            retention: None,
        }
    }

    fn worker(pool: &SqlitePool, generator: Arc<ScriptedGenerator>) -> AnalysisWorker {
        AnalysisWorker::new(pool.clone(), generator, options())
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    async fn notification_count(pool: &SqlitePool, job_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn new_job(pool: &SqlitePool, cv: &str, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        create_job(pool, id, cv, role).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_fenced_json_completes_job_with_one_notification() {
        let pool = test_pool().await;
        let id = new_job(&pool, "5 years SQL experience", "Data Analyst").await;
        let generator = ScriptedGenerator::new(
            &pool,
            vec![Reply::Text(format!("```json\n{RADAR_JSON}\n```"))],
        );

        let summary = worker(&pool, generator.clone())
            .run_tick(&no_shutdown())
            .await;
        assert_eq!(summary.completed, 1);

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        let result: Value = serde_json::from_str(job.result.as_deref().unwrap()).unwrap();
        let expected: Value = serde_json::from_str(RADAR_JSON).unwrap();
        assert_eq!(result, expected);

        let notifications = get_unread_notifications(&pool).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].job_id, id);
        assert!(notifications[0].message.contains("Data Analyst"));

        let prompt = &generator.prompts.lock().unwrap()[0];
        assert!(prompt.contains("5 years SQL experience"));
        assert!(prompt.contains("Data Analyst"));
    }

    #[tokio::test]
    async fn test_refusal_fails_job_with_parse_error() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "Data Analyst").await;
        let generator = ScriptedGenerator::new(
            &pool,
            vec![Reply::Text("Sorry, I cannot help with that.".to_string())],
        );

        let summary = worker(&pool, generator).run_tick(&no_shutdown()).await;
        assert_eq!(summary.failed, 1);

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());
        assert!(job.error.unwrap().starts_with("JSON Parse Error: "));

        let notifications = get_unread_notifications(&pool).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].message.contains("failed"));
    }

    #[tokio::test]
    async fn test_empty_response_fails_job() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "role").await;
        let generator =
            ScriptedGenerator::new(&pool, vec![Reply::Text("```json\n\n```".to_string())]);

        worker(&pool, generator).run_tick(&no_shutdown()).await;

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("AI model returned an empty response")
        );
    }

    #[tokio::test]
    async fn test_collaborator_error_is_recorded_on_job() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "role").await;
        let generator = ScriptedGenerator::new(
            &pool,
            vec![Reply::Error(LlmError::Api {
                status: 503,
                message: "model overloaded".to_string(),
            })],
        );

        worker(&pool, generator).run_tick(&no_shutdown()).await;

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("API error (status 503): model overloaded")
        );
        assert_eq!(notification_count(&pool, id).await, 1);
    }

    #[tokio::test]
    async fn test_hung_collaborator_times_out() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "role").await;
        let generator = ScriptedGenerator::new(&pool, vec![Reply::Hang]);
        let options = WorkerOptions {
            ai_timeout: Duration::from_millis(50),
            ..options()
        };

        AnalysisWorker::new(pool.clone(), generator, options)
            .run_tick(&no_shutdown())
            .await;

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_tick() {
        let pool = test_pool().await;
        let bad = new_job(&pool, "cv one", "role").await;
        let good = new_job(&pool, "cv two", "role").await;
        let generator = ScriptedGenerator::new(
            &pool,
            vec![
                Reply::Error(LlmError::EmptyContent),
                Reply::Text(RADAR_JSON.to_string()),
            ],
        );

        let summary = worker(&pool, generator).run_tick(&no_shutdown()).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);

        assert_eq!(
            get_job(&pool, bad).await.unwrap().unwrap().status,
            JobStatus::Failed
        );
        assert_eq!(
            get_job(&pool, good).await.unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_jobs_run_sequentially_oldest_first() {
        let pool = test_pool().await;
        let a = new_job(&pool, "cv for job A", "role").await;
        let b = new_job(&pool, "cv for job B", "role").await;
        let generator = ScriptedGenerator::new(
            &pool,
            vec![
                Reply::Text(RADAR_JSON.to_string()),
                Reply::Text(RADAR_JSON.to_string()),
            ],
        );

        worker(&pool, generator.clone())
            .run_tick(&no_shutdown())
            .await;

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("cv for job A"));
        assert!(prompts[1].contains("cv for job B"));

        let snapshots = generator.snapshots.lock().unwrap();
        // During A's call, A is claimed and B has not been touched.
        assert_eq!(
            snapshots[0],
            vec![(a, JobStatus::Processing), (b, JobStatus::Pending)]
        );
        // A is fully finished before B's call starts.
        assert_eq!(
            snapshots[1],
            vec![(a, JobStatus::Completed), (b, JobStatus::Processing)]
        );
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_never_reprocessed() {
        let pool = test_pool().await;
        let failed = new_job(&pool, "cv", "role").await;
        let completed = new_job(&pool, "cv", "role").await;
        let generator = ScriptedGenerator::new(
            &pool,
            vec![
                Reply::Text("not json".to_string()),
                Reply::Text(RADAR_JSON.to_string()),
                Reply::Text(RADAR_JSON.to_string()),
            ],
        );
        let worker = worker(&pool, generator.clone());

        worker.run_tick(&no_shutdown()).await;
        let failed_before = get_job(&pool, failed).await.unwrap().unwrap();
        let completed_before = get_job(&pool, completed).await.unwrap().unwrap();

        let summary = worker.run_tick(&no_shutdown()).await;
        assert!(summary.is_empty());
        assert_eq!(generator.calls(), 2);

        let failed_after = get_job(&pool, failed).await.unwrap().unwrap();
        let completed_after = get_job(&pool, completed).await.unwrap().unwrap();
        assert_eq!(failed_after.status, JobStatus::Failed);
        assert_eq!(failed_after.error, failed_before.error);
        assert_eq!(failed_after.updated_at, failed_before.updated_at);
        assert_eq!(completed_after.result, completed_before.result);
        assert_eq!(completed_after.updated_at, completed_before.updated_at);

        assert_eq!(notification_count(&pool, failed).await, 1);
        assert_eq!(notification_count(&pool, completed).await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_signal_leaves_unclaimed_jobs_pending() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "role").await;
        let generator = ScriptedGenerator::new(&pool, vec![Reply::Text(RADAR_JSON.to_string())]);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let summary = worker(&pool, generator.clone()).run_tick(&rx).await;
        assert!(summary.is_empty());
        assert_eq!(generator.calls(), 0);
        assert_eq!(
            get_job(&pool, id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_recover_interrupted_fails_processing_jobs() {
        let pool = test_pool().await;
        let stuck = new_job(&pool, "cv", "Data Engineer").await;
        claim_job(&pool, stuck).await.unwrap();
        let generator = ScriptedGenerator::new(&pool, vec![]);

        let recovered = worker(&pool, generator).recover_interrupted().await.unwrap();
        assert_eq!(recovered, 1);

        let job = get_job(&pool, stuck).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(INTERRUPTED_ERROR));
        assert_eq!(notification_count(&pool, stuck).await, 1);
    }

    #[tokio::test]
    async fn test_retention_keeps_freshly_finished_jobs() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "role").await;
        let generator = ScriptedGenerator::new(&pool, vec![Reply::Text(RADAR_JSON.to_string())]);
        let options = WorkerOptions {
            retention: Some(chrono::Duration::days(1)),
            ..options()
        };

        let summary = AnalysisWorker::new(pool.clone(), generator, options)
            .run_tick(&no_shutdown())
            .await;
        assert_eq!(summary.completed, 1);

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(notification_count(&pool, id).await, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_retention_skips_purge_without_panicking() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "role").await;
        let generator = ScriptedGenerator::new(&pool, vec![Reply::Text(RADAR_JSON.to_string())]);
        let options = WorkerOptions {
            retention: Some(chrono::Duration::days(200_000_000)),
            ..options()
        };

        let summary = AnalysisWorker::new(pool.clone(), generator, options)
            .run_tick(&no_shutdown())
            .await;
        assert_eq!(summary.completed, 1);
        assert!(get_job(&pool, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unstorable_result_fails_job_instead_of_leaving_it_claimed() {
        let pool = test_pool().await;
        let id = new_job(&pool, "cv", "Data Analyst").await;
        sqlx::query(
            "CREATE TRIGGER reject_completed BEFORE UPDATE OF status ON jobs \
             WHEN NEW.status = 'completed' \
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END",
        )
        .execute(&pool)
        .await
        .unwrap();
        let generator = ScriptedGenerator::new(&pool, vec![Reply::Text(RADAR_JSON.to_string())]);

        let summary = worker(&pool, generator).run_tick(&no_shutdown()).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, 0);

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());
        assert!(job.error.unwrap().starts_with(RECORD_FAILED_ERROR));

        let notifications = get_unread_notifications(&pool).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].message.contains("failed"));
    }

    #[tokio::test]
    async fn test_spawned_worker_reaches_terminal_state_and_shuts_down() {
        let pool = test_pool().await;
        let generator = ScriptedGenerator::new(
            &pool,
            vec![
                Reply::Text(RADAR_JSON.to_string()),
                Reply::Text("garbage".to_string()),
            ],
        );
        let handle = worker(&pool, generator).spawn();

        let first = new_job(&pool, "cv", "role").await;
        let second = new_job(&pool, "cv", "role").await;

        let mut terminal = false;
        for _ in 0..200 {
            let a = get_job(&pool, first).await.unwrap().unwrap();
            let b = get_job(&pool, second).await.unwrap().unwrap();
            if a.status.is_terminal() && b.status.is_terminal() {
                terminal = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(terminal, "jobs did not reach a terminal state");

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("worker did not shut down");

        assert_eq!(notification_count(&pool, first).await, 1);
        assert_eq!(notification_count(&pool, second).await, 1);
    }
}
