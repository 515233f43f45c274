//! Document Renderer.
//!
//! Produces the final artifact from a record: either the fixed-layout HMR
//! report or a custom template filled through its mapping. Output bytes
//! are returned to the caller and never stored here.

pub mod custom;
pub mod narrative;
pub mod report;

pub use custom::{field_values, FieldFailure, FieldValues};

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::{PageFormat, Watermark};
use crate::models::CanonicalRecord;
use crate::pipeline::template::{TemplateDescriptor, TemplateDocument, TemplateError};
use crate::pipeline::validation::{self, resolve_pharmacist, ValidationContext};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("Template rendering failed: {0}")]
    Template(#[from] TemplateError),
}

impl RenderError {
    /// Whether trying the same render again can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Pdf(_) => true,
            Self::Template(TemplateError::Database(_)) => true,
            Self::Template(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub include_appendices: bool,
    pub watermark: Watermark,
    /// "a4" or "letter"; anything else falls back to A4.
    pub page_format: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            include_appendices: false,
            watermark: Watermark::Draft,
            page_format: PageFormat::A4.as_str().to_string(),
        }
    }
}

impl GenerationOptions {
    /// The page format to use, and a warning when the request was not understood.
    pub fn resolved_page_format(&self) -> (PageFormat, Option<String>) {
        let requested = self.page_format.trim().to_lowercase();
        let requested = match requested.as_str() {
            "us_letter" | "us letter" => "letter",
            other => other,
        };
        match PageFormat::from_str(requested) {
            Ok(format) => (format, None),
            Err(_) => (
                PageFormat::A4,
                Some(format!(
                    "Unknown page format '{}', using A4",
                    self.page_format
                )),
            ),
        }
    }
}

/// Defaults for the preparing pharmacist, consulted after the record.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub profile_pharmacist: Option<String>,
    pub static_pharmacist: Option<String>,
}

impl RenderContext {
    pub fn validation_context(&self) -> ValidationContext {
        ValidationContext {
            profile_pharmacist: self.profile_pharmacist.clone(),
        }
    }

    pub fn pharmacist_for(&self, record: &CanonicalRecord) -> Option<String> {
        resolve_pharmacist(
            &record.interview.pharmacist_name,
            self.profile_pharmacist.as_deref(),
            self.static_pharmacist.as_deref(),
        )
    }
}

/// What to render.
pub enum GenerationTarget {
    FixedLayout,
    Custom {
        descriptor: TemplateDescriptor,
        document: TemplateDocument,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub watermark: Watermark,
    pub requested_watermark: Watermark,
    pub page_format: PageFormat,
    pub blocking_issues: usize,
    pub unmapped_fields: Vec<String>,
    pub path_errors: Vec<FieldFailure>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub content_length: usize,
    pub mime_type: String,
    pub summary: GenerationSummary,
}

/// Final is only granted to a record with no blocking issues.
pub fn effective_watermark(requested: Watermark, blocking_issues: usize) -> Watermark {
    match requested {
        Watermark::Final if blocking_issues > 0 => Watermark::Draft,
        other => other,
    }
}

pub fn render(
    record: &CanonicalRecord,
    target: &GenerationTarget,
    options: &GenerationOptions,
    ctx: &RenderContext,
) -> Result<RenderedDocument, RenderError> {
    render_with_progress(record, target, options, ctx, &|_| {})
}

/// Render, reporting progress in `0.0..=1.0` as sections complete.
pub fn render_with_progress(
    record: &CanonicalRecord,
    target: &GenerationTarget,
    options: &GenerationOptions,
    ctx: &RenderContext,
    progress: &dyn Fn(f32),
) -> Result<RenderedDocument, RenderError> {
    let issues = validation::validate(record, &ctx.validation_context());
    let blocking_issues = issues.iter().filter(|i| i.is_blocking()).count();
    let watermark = effective_watermark(options.watermark, blocking_issues);
    let (page_format, format_warning) = options.resolved_page_format();

    let mut summary = GenerationSummary {
        watermark,
        requested_watermark: options.watermark,
        page_format,
        blocking_issues,
        unmapped_fields: Vec::new(),
        path_errors: Vec::new(),
        warnings: format_warning.into_iter().collect(),
    };
    if watermark != options.watermark {
        summary.warnings.push(format!(
            "{blocking_issues} blocking issue(s) remain; document marked DRAFT"
        ));
    }

    let (bytes, mime_type) = match target {
        GenerationTarget::FixedLayout => {
            let pharmacist = ctx.pharmacist_for(record);
            let input = report::ReportInput {
                record,
                pharmacist: pharmacist.as_deref(),
                issues: &issues,
                watermark,
                page_format,
                include_appendices: options.include_appendices,
                generated_on: Utc::now().date_naive(),
            };
            (report::render_report(&input, progress)?, "application/pdf".to_string())
        }
        GenerationTarget::Custom {
            descriptor,
            document,
        } => {
            let filled = field_values(record, descriptor);
            progress(0.5);
            summary.unmapped_fields = filled.unmapped;
            summary.path_errors = filled.failures;
            summary
                .warnings
                .push("Custom templates are filled as-is; no watermark is stamped".into());
            (document.fill(&filled.values)?, document.mime_type().to_string())
        }
    };
    progress(1.0);

    if !summary.path_errors.is_empty() {
        tracing::warn!(
            failed_fields = summary.path_errors.len(),
            "Generated with unresolved template fields"
        );
    }
    tracing::info!(
        watermark = %summary.watermark,
        bytes = bytes.len(),
        "Document generated"
    );

    Ok(RenderedDocument {
        content_length: bytes.len(),
        bytes,
        mime_type,
        summary,
    })
}
