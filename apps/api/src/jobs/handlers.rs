//! Axum route handlers for job submission and result lookup.

use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    Form, Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::store::{create_job, get_job};
use crate::models::JobRow;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Text fields of a submission, shared by multipart, urlencoded and JSON bodies.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeForm {
    pub cv_text: Option<String>,
    pub target_role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub message: String,
    pub job_id: Uuid,
}

struct Submission {
    form: AnalyzeForm,
    /// Raw bytes of the `cv` file field, when one was uploaded.
    pdf: Option<Bytes>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/analyze
///
/// Validates the submission and queues a pending job. An uploaded PDF takes
/// precedence over `cvText`. Analysis happens later in the background worker.
pub async fn handle_analyze(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Submission { form, pdf } = read_submission(&state, request).await?;

    let cv_content = match pdf {
        Some(bytes) => extract_pdf_text(bytes).await?,
        None => form.cv_text.unwrap_or_default(),
    };
    let cv_content = cv_content.trim();
    if cv_content.is_empty() {
        return Err(AppError::Validation("CV content is required.".to_string()));
    }

    let target_role = form.target_role.as_deref().map(str::trim).unwrap_or_default();
    if target_role.is_empty() {
        return Err(AppError::Validation("Target role is required.".to_string()));
    }

    let job_id = Uuid::new_v4();
    create_job(&state.db, job_id, cv_content, target_role).await?;
    info!(job_id = %job_id, target_role, "Analysis queued");

    Ok(Json(AnalyzeResponse {
        message: "Analysis queued successfully".to_string(),
        job_id,
    }))
}

/// GET /api/result/:id
///
/// Returns the job row. Unknown and malformed ids are both 404.
pub async fn handle_get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRow>, AppError> {
    let not_found = || AppError::NotFound("Job not found".to_string());
    let id = Uuid::parse_str(&id).map_err(|_| not_found())?;
    let job = get_job(&state.db, id).await?.ok_or_else(not_found)?;
    Ok(Json(job))
}

// ────────────────────────────────────────────────────────────────────────────
// Body parsing
// ────────────────────────────────────────────────────────────────────────────

async fn read_submission(state: &AppState, request: Request) -> Result<Submission, AppError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| rejected(e.status(), e.body_text()))?;
        read_multipart(multipart).await
    } else if content_type.starts_with("application/json") {
        let Json(form) = Json::<AnalyzeForm>::from_request(request, state)
            .await
            .map_err(|e| rejected(e.status(), e.body_text()))?;
        Ok(Submission { form, pdf: None })
    } else {
        let Form(form) = Form::<AnalyzeForm>::from_request(request, state)
            .await
            .map_err(|e| rejected(e.status(), e.body_text()))?;
        Ok(Submission { form, pdf: None })
    }
}

fn rejected(status: StatusCode, message: String) -> AppError {
    AppError::Rejected { status, message }
}

async fn read_multipart(mut multipart: Multipart) -> Result<Submission, AppError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        rejected(e.status(), format!("Invalid multipart body: {}", e.body_text()))
    };

    let mut form = AnalyzeForm::default();
    let mut pdf = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cv" => {
                let bytes = field.bytes().await.map_err(invalid)?;
                if !bytes.is_empty() {
                    pdf = Some(bytes);
                }
            }
            "cvText" => form.cv_text = Some(field.text().await.map_err(invalid)?),
            "targetRole" => form.target_role = Some(field.text().await.map_err(invalid)?),
            _ => {}
        }
    }

    Ok(Submission { form, pdf })
}

/// PDF parsing is CPU-bound and can panic on hostile input, so it runs on the
/// blocking pool and any failure is reported as an unreadable upload.
async fn extract_pdf_text(bytes: Bytes) -> Result<String, AppError> {
    let unreadable = || AppError::Validation("Could not read text from the uploaded PDF.".to_string());

    match tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => {
            warn!("PDF text extraction failed: {e}");
            Err(unreadable())
        }
        Err(e) if e.is_panic() => {
            warn!("PDF text extraction panicked");
            Err(unreadable())
        }
        Err(e) => Err(AppError::Internal(anyhow::anyhow!(
            "PDF extraction task failed: {e}"
        ))),
    }
}
