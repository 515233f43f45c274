//! Shared request and response types for the API layer.

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::pipeline::extraction::UploadedDocument;
use crate::pipeline::validation::ValidationIssue;
use crate::workflow::{ReviewSession, ReviewState};

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    pub fn session(&self, session_id: &str) -> Result<Arc<ReviewSession>, ApiError> {
        if session_id.trim().is_empty() {
            return Err(ApiError::BadRequest("Session id is empty".into()));
        }
        Ok(self.core.sessions().open(session_id)?)
    }
}

// ═══════════════════════════════════════════════════════════
// Uploads
// ═══════════════════════════════════════════════════════════

/// A file sent as JSON.
#[derive(Debug, Deserialize)]
pub struct UploadPayload {
    #[serde(default)]
    pub filename: Option<String>,
    /// Base64 data URL (e.g. `data:application/pdf;base64,JVBERi0...`) or raw base64.
    pub data: String,
}

impl UploadPayload {
    pub fn decode(self, max_bytes: u64) -> Result<UploadedDocument, ApiError> {
        // Base64 inflates by 4/3; reject before decoding.
        if self.data.len() as u64 / 4 * 3 > max_bytes + 3 {
            return Err(ApiError::TooLarge(format!("limit is {max_bytes} bytes")));
        }
        let bytes = decode_data_url(&self.data)
            .map_err(|e| ApiError::BadRequest(format!("Invalid file data: {e}")))?;
        Ok(UploadedDocument {
            filename: self.filename,
            bytes,
        })
    }
}

/// Decode a base64 data URL to raw bytes.
///
/// Handles both `data:application/pdf;base64,...` and raw base64 strings.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, String> {
    let base64_data = match data_url.find(',') {
        Some(idx) => &data_url[idx + 1..],
        None => data_url,
    };

    base64::engine::general_purpose::STANDARD
        .decode(base64_data.trim())
        .map_err(|e| format!("Base64 decode failed: {e}"))
}

// ═══════════════════════════════════════════════════════════
// Session views
// ═══════════════════════════════════════════════════════════

/// A review snapshot with its current issues.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub state: ReviewState,
    pub issues: Vec<ValidationIssue>,
    pub needs_review: Vec<String>,
}

impl SessionView {
    pub fn of(session: &ReviewSession, state: Arc<ReviewState>) -> Self {
        let issues = state.issues(session.validation_context());
        let needs_review = state.record.needs_review();
        Self {
            state: (*state).clone(),
            issues,
            needs_review,
        }
    }
}
