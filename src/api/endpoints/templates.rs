//! Custom template upload and field mapping.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UploadPayload};
use crate::pipeline::path::catalogue::{data_path_catalogue, CatalogueEntry};
use crate::pipeline::template::{
    self, suggest_mappings, MappingSuggestion, TemplateDescriptor,
};

#[derive(Debug, Deserialize)]
pub struct TemplateUpload {
    pub name: String,
    pub file: UploadPayload,
}

#[derive(Debug, Deserialize)]
pub struct MapFieldRequest {
    pub data_path: String,
}

/// A descriptor with its completeness and mapping suggestions.
#[derive(Debug, Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    pub descriptor: TemplateDescriptor,
    pub complete: bool,
    pub unmapped_fields: Vec<String>,
    pub suggestions: Vec<MappingSuggestion>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pruned_mappings: Vec<String>,
}

impl From<TemplateDescriptor> for TemplateView {
    fn from(descriptor: TemplateDescriptor) -> Self {
        Self {
            complete: descriptor.is_complete(),
            unmapped_fields: descriptor.unmapped_fields(),
            suggestions: suggest_mappings(&descriptor),
            pruned_mappings: Vec::new(),
            descriptor,
        }
    }
}

/// `GET /api/catalogue`: every data path a template field can map to.
pub async fn catalogue() -> Json<&'static [CatalogueEntry]> {
    Json(data_path_catalogue())
}

/// `POST /api/sessions/:session_id/templates`
pub async fn upload(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
    Json(request): Json<TemplateUpload>,
) -> Result<(StatusCode, Json<TemplateView>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Template name is empty".into()));
    }
    let document = request.file.decode(ctx.core.config.max_upload_bytes)?;
    if document.bytes.is_empty() {
        return Err(ApiError::Unprocessable("Uploaded template is empty".into()));
    }

    let descriptor =
        template::register_template(ctx.core.templates(), &session_id, name, &document)?;
    Ok((StatusCode::CREATED, Json(descriptor.into())))
}

/// `GET /api/sessions/:session_id/templates`
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<TemplateView>>, ApiError> {
    let templates = ctx.core.templates().list_templates(&session_id)?;
    Ok(Json(templates.into_iter().map(TemplateView::from).collect()))
}

/// `GET /api/sessions/:session_id/templates/:template_id`
pub async fn show(
    State(ctx): State<ApiContext>,
    Path((session_id, template_id)): Path<(String, Uuid)>,
) -> Result<Json<TemplateView>, ApiError> {
    let descriptor = template::owned_template(ctx.core.templates(), &session_id, &template_id)?;
    Ok(Json(descriptor.into()))
}

/// `PUT /api/sessions/:session_id/templates/:template_id`: new version of
/// the document. Mappings for fields that disappeared are pruned.
pub async fn replace(
    State(ctx): State<ApiContext>,
    Path((session_id, template_id)): Path<(String, Uuid)>,
    Json(file): Json<UploadPayload>,
) -> Result<Json<TemplateView>, ApiError> {
    let document = file.decode(ctx.core.config.max_upload_bytes)?;
    let reupload =
        template::replace_template(ctx.core.templates(), &session_id, &template_id, &document)?;
    let mut view = TemplateView::from(reupload.descriptor);
    view.pruned_mappings = reupload.pruned_mappings;
    Ok(Json(view))
}

/// `DELETE /api/sessions/:session_id/templates/:template_id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path((session_id, template_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
    template::owned_template(ctx.core.templates(), &session_id, &template_id)?;
    ctx.core.templates().delete_template(&template_id)?;
    tracing::info!(template_id = %template_id, "Template deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/sessions/:session_id/templates/:template_id/mapping/:field`
pub async fn map_field(
    State(ctx): State<ApiContext>,
    Path((session_id, template_id, field)): Path<(String, Uuid, String)>,
    Json(request): Json<MapFieldRequest>,
) -> Result<Json<TemplateView>, ApiError> {
    let descriptor = template::map_field(
        ctx.core.templates(),
        &session_id,
        &template_id,
        &field,
        request.data_path.trim(),
    )?;
    Ok(Json(descriptor.into()))
}

/// `DELETE /api/sessions/:session_id/templates/:template_id/mapping/:field`
pub async fn unmap_field(
    State(ctx): State<ApiContext>,
    Path((session_id, template_id, field)): Path<(String, Uuid, String)>,
) -> Result<Json<TemplateView>, ApiError> {
    let descriptor =
        template::unmap_field(ctx.core.templates(), &session_id, &template_id, &field)?;
    Ok(Json(descriptor.into()))
}
