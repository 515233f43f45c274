use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ExtractionError;
use crate::models::CanonicalRecord;

/// One uploaded file, as received.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// What an extractor hands back: the full text plus a best-effort,
/// possibly malformed guess at the record shape.
///
/// `fields` may carry `patient`, `medications`, `interview`,
/// `recommendations`, flat aliases such as `patient_name`, and an
/// optional `field_confidence` map of dotted path to score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub fields: Value,
}

/// Normalizer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedExtraction {
    pub record: CanonicalRecord,
    pub raw_text: String,
}

/// Turns a referral PDF into raw text and field guesses.
pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, pdf_bytes: &[u8]) -> Result<RawExtraction, ExtractionError>;
}
