//! Template Field Mapper.
//!
//! Custom templates come in two kinds: form-fillable PDFs and merge-field
//! DOCX documents. Both discover their field names and fill them from a
//! `field → text` map; the mapping from field to data path is stored on
//! the template's descriptor and owned by the session that uploaded it.

pub mod acroform;
pub mod docx;
pub mod mapping;

pub use acroform::AcroFormTemplate;
pub use docx::DocxTemplate;
pub use mapping::*;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{DatabaseError, TemplateStore};
use crate::models::enums::TemplateKind;
use crate::pipeline::extraction::UploadedDocument;
use crate::pipeline::format::{detect_format, DocumentFormat};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unsupported template type: {0}")]
    UnsupportedFormat(String),

    #[error("Template is malformed: {0}")]
    Malformed(String),

    #[error("Template has no field named '{0}'")]
    UnknownField(String),

    #[error("'{0}' is not a mappable data path")]
    UnknownDataPath(String),

    #[error("Template not found: {0}")]
    NotFound(Uuid),

    #[error("Template fill failed: {0}")]
    FillFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A parsed custom template. The set of kinds is closed.
#[derive(Debug, Clone)]
pub enum TemplateDocument {
    FormFillable(AcroFormTemplate),
    MergeField(DocxTemplate),
}

impl TemplateDocument {
    pub fn load(bytes: &[u8], filename: Option<&str>) -> Result<Self, TemplateError> {
        let detection = detect_format(bytes, filename);
        match detection.format {
            DocumentFormat::Pdf => Ok(Self::FormFillable(AcroFormTemplate::parse(bytes)?)),
            DocumentFormat::Docx => Ok(Self::MergeField(DocxTemplate::parse(bytes)?)),
            DocumentFormat::Unsupported => {
                Err(TemplateError::UnsupportedFormat(detection.mime_type))
            }
        }
    }

    pub fn kind(&self) -> TemplateKind {
        match self {
            Self::FormFillable(_) => TemplateKind::FormFillable,
            Self::MergeField(_) => TemplateKind::MergeField,
        }
    }

    /// Field names in document order, without duplicates.
    pub fn discover_fields(&self) -> Result<Vec<String>, TemplateError> {
        match self {
            Self::FormFillable(t) => t.discover_fields(),
            Self::MergeField(t) => t.discover_fields(),
        }
    }

    pub fn fill(&self, values: &BTreeMap<String, String>) -> Result<Vec<u8>, TemplateError> {
        match self {
            Self::FormFillable(t) => t.fill(values),
            Self::MergeField(t) => t.fill(values),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::FormFillable(_) => "application/pdf",
            Self::MergeField(_) => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ═══════════════════════════════════════════════════════════
// Persisted operations
// ═══════════════════════════════════════════════════════════

/// Result of uploading a new version of an existing template.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Reupload {
    pub descriptor: TemplateDescriptor,
    pub pruned_mappings: Vec<String>,
}

pub fn register_template(
    store: &dyn TemplateStore,
    owner_session: &str,
    name: &str,
    upload: &UploadedDocument,
) -> Result<TemplateDescriptor, TemplateError> {
    let document = TemplateDocument::load(&upload.bytes, upload.filename.as_deref())?;
    let fields = document.discover_fields()?;

    let descriptor = TemplateDescriptor::new(
        owner_session,
        name,
        document.kind(),
        fingerprint(&upload.bytes),
        fields,
    );
    store.insert_template(&descriptor, &upload.bytes)?;

    tracing::info!(
        template_id = %descriptor.id,
        kind = %descriptor.kind,
        fields = descriptor.discovered_fields.len(),
        "Template registered"
    );
    Ok(descriptor)
}

/// Fetch a descriptor, hiding templates owned by other sessions.
pub fn owned_template(
    store: &dyn TemplateStore,
    owner_session: &str,
    id: &Uuid,
) -> Result<TemplateDescriptor, TemplateError> {
    store.get_template(id)?
        .filter(|d| d.owner_session == owner_session)
        .ok_or(TemplateError::NotFound(*id))
}

pub fn replace_template(
    store: &dyn TemplateStore,
    owner_session: &str,
    id: &Uuid,
    upload: &UploadedDocument,
) -> Result<Reupload, TemplateError> {
    let mut descriptor = owned_template(store, owner_session, id)?;
    let document = TemplateDocument::load(&upload.bytes, upload.filename.as_deref())?;
    let fields = document.discover_fields()?;

    descriptor.kind = document.kind();
    let pruned_mappings = descriptor.rediscover(fields, fingerprint(&upload.bytes));
    store.update_template(&descriptor, Some(&upload.bytes))?;

    if !pruned_mappings.is_empty() {
        tracing::info!(
            template_id = %descriptor.id,
            pruned = pruned_mappings.len(),
            "Template re-upload dropped mappings"
        );
    }
    Ok(Reupload {
        descriptor,
        pruned_mappings,
    })
}

pub fn map_field(
    store: &dyn TemplateStore,
    owner_session: &str,
    id: &Uuid,
    field: &str,
    data_path: &str,
) -> Result<TemplateDescriptor, TemplateError> {
    let mut descriptor = owned_template(store, owner_session, id)?;
    descriptor.map(field, data_path)?;
    store.update_template(&descriptor, None)?;
    Ok(descriptor)
}

pub fn unmap_field(
    store: &dyn TemplateStore,
    owner_session: &str,
    id: &Uuid,
    field: &str,
) -> Result<TemplateDescriptor, TemplateError> {
    let mut descriptor = owned_template(store, owner_session, id)?;
    if descriptor.unmap(field) {
        store.update_template(&descriptor, None)?;
    }
    Ok(descriptor)
}

pub fn is_complete(
    store: &dyn TemplateStore,
    owner_session: &str,
    id: &Uuid,
) -> Result<bool, TemplateError> {
    Ok(owned_template(store, owner_session, id)?.is_complete())
}

/// Descriptor and parsed document, ready for rendering.
pub fn load_for_render(
    store: &dyn TemplateStore,
    owner_session: &str,
    id: &Uuid,
) -> Result<(TemplateDescriptor, TemplateDocument), TemplateError> {
    let descriptor = owned_template(store, owner_session, id)?;
    let source = store.get_template_source(id)?.ok_or(TemplateError::NotFound(*id))?;
    let document = match descriptor.kind {
        TemplateKind::FormFillable => TemplateDocument::FormFillable(AcroFormTemplate::parse(&source)?),
        TemplateKind::MergeField => TemplateDocument::MergeField(DocxTemplate::parse(&source)?),
    };
    Ok((descriptor, document))
}
