//! Built-in extractor for digital referral PDFs.
//!
//! Reads the PDF text layer with lopdf and picks patient details out of
//! labelled lines ("Name:", "DOB:", ...) and a medication list section.
//! Scanned referrals without a text layer come back as empty guesses;
//! the reviewer then enters details by hand.

use std::sync::LazyLock;

use lopdf::Document;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::confidence::thresholds;
use super::types::{DocumentExtractor, RawExtraction};
use super::ExtractionError;

/// Extracts text from PDFs that carry a text layer.
pub struct PdfTextLayerExtractor;

impl DocumentExtractor for PdfTextLayerExtractor {
    fn name(&self) -> &'static str {
        "pdf_text_layer"
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<RawExtraction, ExtractionError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(ExtractionError::PdfParsing("document has no pages".into()));
        }

        let raw_text = doc
            .extract_text(&page_numbers)
            .map_err(|e| ExtractionError::ExtractorFailed(e.to_string()))?;

        tracing::debug!(
            pages = page_numbers.len(),
            chars = raw_text.len(),
            "Read PDF text layer"
        );

        Ok(RawExtraction {
            fields: guess_fields(&raw_text),
            raw_text,
        })
    }
}

/// Label patterns for patient fields, as (field, pattern).
static LABELLED_FIELDS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("name", r"(?im)^[ \t]*(?:patient(?:\s+name)?|name)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("date_of_birth", r"(?im)^[ \t]*(?:dob|d\.o\.b\.?|date\s+of\s+birth)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("gender", r"(?im)^[ \t]*(?:gender|sex)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("medicare_number", r"(?im)^[ \t]*medicare(?:\s+(?:no\.?|number))?[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("phone", r"(?im)^[ \t]*(?:phone|telephone|mobile|ph)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("email", r"(?im)^[ \t]*e-?mail[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("address", r"(?im)^[ \t]*address[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("referring_gp", r"(?im)^[ \t]*(?:referring\s+(?:gp|doctor)|gp|doctor)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("gp_practice", r"(?im)^[ \t]*(?:practice|clinic)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("allergies", r"(?im)^[ \t]*(?:allergies|allergy|adverse\s+reactions)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
        ("conditions", r"(?im)^[ \t]*(?:conditions|diagnoses|medical\s+conditions)[ \t]*[:\-][ \t]*(.+?)[ \t]*$"),
    ]
    .into_iter()
    .map(|(field, pattern)| (field, Regex::new(pattern).unwrap()))
    .collect()
});

static MEDICATION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:current\s+)?medications?(?:\s+list)?\s*:?\s*$").unwrap()
});

/// "Metformin 500 mg tablet 1 BD" → name, strength, remainder.
static MEDICATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[\s\-\*\u{2022}\d\.\)]*([A-Za-z][A-Za-z\-/ ]*?)\s+(\d+(?:\.\d+)?\s*(?:mg|mcg|microgram|g|ml|units?|%))(?:\s+(.*))?$",
    )
    .unwrap()
});

static DATE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,4}[/\-.]\d{1,2}[/\-.]\d{1,4}$").unwrap()
});

/// Best-effort field guesses from referral text.
pub fn guess_fields(text: &str) -> Value {
    let mut patient = Map::new();
    let mut scores = Map::new();

    for (field, pattern) in LABELLED_FIELDS.iter() {
        if let Some(value) = pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
        {
            let confidence = match *field {
                "date_of_birth" if !DATE_LIKE.is_match(&value) => thresholds::LOW,
                _ => thresholds::HIGH,
            };
            scores.insert(format!("patient.{field}"), json!(confidence));
            patient.insert((*field).to_string(), Value::String(value));
        }
    }

    json!({
        "patient": patient,
        "medications": medication_section(text),
        "field_confidence": scores,
    })
}

/// Lines following a "Medications" header, up to the first blank line.
fn medication_section(text: &str) -> Vec<Value> {
    let mut meds = Vec::new();
    let mut in_section = false;

    for line in text.lines() {
        if MEDICATION_HEADER.is_match(line) {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if line.trim().is_empty() {
            if meds.is_empty() {
                continue;
            }
            break;
        }

        let entry = match MEDICATION_LINE.captures(line) {
            Some(caps) => json!({
                "name": caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default(),
                "strength": caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default(),
                "dosage": caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default(),
                "confidence": thresholds::HIGH,
            }),
            None => json!({
                "name": line.trim().trim_start_matches(['-', '*', '\u{2022}']).trim(),
                "confidence": thresholds::LOW,
            }),
        };
        meds.push(entry);
    }

    meds
}
