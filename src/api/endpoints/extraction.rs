//! Referral extraction jobs.
//!
//! `POST /api/sessions/:session_id/extractions`: upload a referral PDF.
//! The upload is checked before anything runs; extraction itself is a
//! background job polled through its status endpoint. A successful result
//! is applied to the session on the first poll that sees it.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WaitQuery;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionView, UploadPayload};
use crate::pipeline::extraction::{check_upload, extract_referral};
use crate::pipeline::jobs::JobStatus;

#[derive(Debug, Deserialize)]
pub struct ExtractionRequest {
    pub file: UploadPayload,
}

#[derive(Debug, Serialize)]
pub struct JobStarted {
    pub job_id: Uuid,
    pub revision: u64,
}

#[derive(Debug, Serialize)]
pub struct ExtractionStatus {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Present once the result has been applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

pub async fn start(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
    Json(request): Json<ExtractionRequest>,
) -> Result<Json<JobStarted>, ApiError> {
    let session = ctx.session(&session_id)?;
    let max_bytes = ctx.core.config.max_upload_bytes;
    let document = request.file.decode(max_bytes)?;
    check_upload(&document, max_bytes)?;

    let revision = session.snapshot()?.revision;
    let extractor = ctx.core.extractor();
    let job_id = ctx.core.extractions.spawn(&session_id, revision, move |progress| {
        progress.report(0.1);
        extract_referral(extractor.as_ref(), &document, max_bytes)
    });

    Ok(Json(JobStarted { job_id, revision }))
}

/// `GET /api/sessions/:session_id/extractions/:job_id?wait_ms=`
pub async fn status(
    State(ctx): State<ApiContext>,
    Path((session_id, job_id)): Path<(String, Uuid)>,
    Query(wait): Query<WaitQuery>,
) -> Result<Json<ExtractionStatus>, ApiError> {
    let jobs = &ctx.core.extractions;
    if !jobs.is_owned_by(&job_id, &session_id) {
        return Err(ApiError::NotFound(format!("Extraction job {job_id}")));
    }

    let status = jobs
        .wait(&job_id, wait.timeout())
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Extraction job {job_id}")))?;
    if status != JobStatus::Succeeded {
        return Ok(Json(ExtractionStatus {
            job_id,
            status,
            session: None,
            raw_text: None,
        }));
    }

    let revision = jobs.revision(&job_id).unwrap_or_default();
    let extraction = jobs
        .take_result(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Extraction job {job_id}")))?;
    let raw_text = extraction.raw_text.clone();

    let session = ctx.session(&session_id)?;
    let state = session.apply_extraction(revision, extraction)?;

    Ok(Json(ExtractionStatus {
        job_id,
        status,
        session: Some(SessionView::of(&session, state)),
        raw_text: Some(raw_text),
    }))
}

/// `POST /api/sessions/:session_id/extractions/:job_id/cancel`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Path((session_id, job_id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !ctx.core.extractions.is_owned_by(&job_id, &session_id) {
        return Err(ApiError::NotFound(format!("Extraction job {job_id}")));
    }
    let cancelled = ctx.core.extractions.cancel(&job_id);
    Ok(Json(serde_json::json!({ "job_id": job_id, "cancelled": cancelled })))
}
