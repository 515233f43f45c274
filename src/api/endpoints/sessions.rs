//! Review session endpoints: read state, dispatch wizard messages, restart.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionView};
use crate::pipeline::validation::ValidationIssue;
use crate::workflow::WorkflowMessage;

/// `GET /api/sessions/:session_id`: current state, resuming a saved draft.
pub async fn show(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = ctx.session(&session_id)?;
    let state = session.snapshot()?;
    Ok(Json(SessionView::of(&session, state)))
}

/// `GET /api/sessions/:session_id/issues`: validation issues, recomputed.
pub async fn issues(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ValidationIssue>>, ApiError> {
    let session = ctx.session(&session_id)?;
    Ok(Json(session.issues()?))
}

/// `POST /api/sessions/:session_id/messages`: apply one wizard message.
pub async fn dispatch(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
    Json(message): Json<WorkflowMessage>,
) -> Result<Json<SessionView>, ApiError> {
    let session = ctx.session(&session_id)?;
    let state = session.dispatch(message)?;
    Ok(Json(SessionView::of(&session, state)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RestartRequest {
    #[serde(default)]
    pub confirmed: bool,
}

/// `POST /api/sessions/:session_id/restart`: start a new review.
pub async fn restart(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
    Json(request): Json<RestartRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = ctx.session(&session_id)?;
    let state = session.start_new(request.confirmed)?;
    Ok(Json(SessionView::of(&session, state)))
}
