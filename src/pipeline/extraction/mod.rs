//! Referral intake: format gate, text extraction, normalization.
//!
//! Extraction output is untrusted. Everything it produces passes
//! through `normalize`, which never fails.

pub mod confidence;
pub mod normalize;
pub mod text_layer;
pub mod types;

pub use confidence::*;
pub use normalize::*;
pub use text_layer::*;
pub use types::*;

use thiserror::Error;

use crate::pipeline::format::{detect_format, DocumentFormat, FormatDetection};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Uploaded document is empty")]
    Empty,

    #[error("Document too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported document type for extraction: {0}")]
    UnsupportedFormat(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Extractor failed: {0}")]
    ExtractorFailed(String),
}

/// Reject anything the extractor cannot take before it is invoked.
pub fn check_upload(
    document: &UploadedDocument,
    max_bytes: u64,
) -> Result<FormatDetection, ExtractionError> {
    if document.bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let detection = detect_format(&document.bytes, document.filename.as_deref());
    if detection.size_bytes > max_bytes {
        return Err(ExtractionError::TooLarge {
            size: detection.size_bytes,
            limit: max_bytes,
        });
    }
    if detection.format != DocumentFormat::Pdf {
        return Err(ExtractionError::UnsupportedFormat(detection.mime_type));
    }

    Ok(detection)
}

/// Gate, extract and normalize one uploaded referral.
pub fn extract_referral(
    extractor: &dyn DocumentExtractor,
    document: &UploadedDocument,
    max_bytes: u64,
) -> Result<NormalizedExtraction, ExtractionError> {
    let detection = check_upload(document, max_bytes)?;
    tracing::info!(
        extractor = extractor.name(),
        size = detection.size_bytes,
        "Extracting referral"
    );

    let raw = extractor.extract(&document.bytes)?;
    let normalized = normalize(&raw);

    tracing::info!(
        medications = normalized.record.medications.len(),
        flagged = normalized.record.needs_review().len(),
        "Referral normalized"
    );
    Ok(normalized)
}
