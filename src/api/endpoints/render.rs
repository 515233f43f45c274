//! Document generation jobs.
//!
//! Rendering works on a snapshot of the record taken when the job starts.
//! If the record changes before the document is collected, the document
//! is discarded and the client asked to render again.

use axum::extract::{Path, Query, State};
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extraction::JobStarted;
use super::WaitQuery;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::jobs::JobStatus;
use crate::pipeline::render::{
    render_with_progress, GenerationOptions, GenerationSummary, GenerationTarget,
};
use crate::pipeline::template;

#[derive(Debug, Default, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub options: GenerationOptions,
    /// Custom template to fill; the fixed report when absent.
    #[serde(default)]
    pub template_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RenderStatus {
    pub job_id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub mime_type: String,
    pub content_length: usize,
    /// Base64 of the document bytes.
    pub data: String,
    pub summary: GenerationSummary,
}

/// `POST /api/sessions/:session_id/renders`
pub async fn start(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
    Json(request): Json<RenderRequest>,
) -> Result<Json<JobStarted>, ApiError> {
    let session = ctx.session(&session_id)?;
    let snapshot = session.snapshot()?;

    let target = match request.template_id {
        Some(id) => {
            let (descriptor, document) =
                template::load_for_render(ctx.core.templates(), &session_id, &id)?;
            GenerationTarget::Custom {
                descriptor,
                document,
            }
        }
        None => GenerationTarget::FixedLayout,
    };

    let render_ctx = ctx.core.render_context();
    let options = request.options;
    let record = snapshot.record.clone();
    let job_id = ctx
        .core
        .renders
        .spawn(&session_id, snapshot.revision, move |progress| {
            render_with_progress(&record, &target, &options, &render_ctx, &|p| progress.report(p))
        });

    Ok(Json(JobStarted {
        job_id,
        revision: snapshot.revision,
    }))
}

/// `GET /api/sessions/:session_id/renders/:job_id?wait_ms=`
pub async fn status(
    State(ctx): State<ApiContext>,
    Path((session_id, job_id)): Path<(String, Uuid)>,
    Query(wait): Query<WaitQuery>,
) -> Result<Json<RenderStatus>, ApiError> {
    if !ctx.core.renders.is_owned_by(&job_id, &session_id) {
        return Err(ApiError::NotFound(format!("Render job {job_id}")));
    }
    let status = ctx
        .core
        .renders
        .wait(&job_id, wait.timeout())
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Render job {job_id}")))?;
    Ok(Json(RenderStatus { job_id, status }))
}

/// `GET /api/sessions/:session_id/renders/:job_id/document`: collect the
/// output once. Later calls get 404.
pub async fn document(
    State(ctx): State<ApiContext>,
    Path((session_id, job_id)): Path<(String, Uuid)>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let jobs = &ctx.core.renders;
    if !jobs.is_owned_by(&job_id, &session_id) {
        return Err(ApiError::NotFound(format!("Render job {job_id}")));
    }
    match jobs.status(&job_id) {
        Some(JobStatus::Succeeded) => {}
        Some(other) => {
            return Err(ApiError::Conflict {
                code: "NOT_READY",
                message: format!("Render job is {}", status_label(&other)),
            })
        }
        None => return Err(ApiError::NotFound(format!("Render job {job_id}"))),
    }

    let started_at = jobs.revision(&job_id).unwrap_or_default();
    let rendered = jobs
        .take_result(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Render job {job_id}")))?;

    let current = ctx.session(&session_id)?.snapshot()?.revision;
    if current != started_at {
        tracing::warn!(
            session_id = %session_id,
            job_id = %job_id,
            started_at,
            current,
            "Discarding document rendered from an older record"
        );
        return Err(ApiError::Conflict {
            code: "STALE_RESULT",
            message: format!(
                "Document was rendered from revision {started_at}, record is now at {current}"
            ),
        });
    }

    Ok(Json(DocumentResponse {
        data: base64::engine::general_purpose::STANDARD.encode(&rendered.bytes),
        mime_type: rendered.mime_type,
        content_length: rendered.content_length,
        summary: rendered.summary,
    }))
}

/// `POST /api/sessions/:session_id/renders/:job_id/cancel`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Path((session_id, job_id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !ctx.core.renders.is_owned_by(&job_id, &session_id) {
        return Err(ApiError::NotFound(format!("Render job {job_id}")));
    }
    let cancelled = ctx.core.renders.cancel(&job_id);
    Ok(Json(serde_json::json!({ "job_id": job_id, "cancelled": cancelled })))
}

fn status_label(status: &JobStatus) -> &'static str {
    match status {
        JobStatus::Running { .. } => "still running",
        JobStatus::Succeeded => "done",
        JobStatus::Failed { .. } => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}
