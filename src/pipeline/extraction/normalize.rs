//! Raw extractor output → canonical record.
//!
//! Total: malformed or missing input degrades to empty strings and empty
//! lists, never to an error. Extractors disagree on key names, so each
//! target field has an alias list.

use serde_json::{Map, Value};

use super::confidence::parse_confidence;
use super::types::{NormalizedExtraction, RawExtraction};
use crate::models::enums::{ComplianceStatus, FieldOrigin, Priority, Regularity};
use crate::models::{
    CanonicalRecord, InterviewAssessment, MedicationEntry, PatientInfo, Provenance,
    Recommendation,
};

const PATIENT_ALIASES: &[(&str, &[&str])] = &[
    ("name", &["name", "full_name", "patient_name", "patientName"]),
    ("date_of_birth", &["date_of_birth", "dob", "dateOfBirth", "birth_date"]),
    ("gender", &["gender", "sex"]),
    ("medicare_number", &["medicare_number", "medicare", "medicareNumber"]),
    ("phone", &["phone", "phone_number", "telephone", "mobile"]),
    ("email", &["email", "email_address", "patient_email"]),
    ("address", &["address", "home_address"]),
    ("referring_gp", &["referring_gp", "gp", "gp_name", "doctor", "referring_doctor", "doctorName"]),
    ("gp_practice", &["gp_practice", "practice", "clinic"]),
    ("gp_email", &["gp_email", "doctor_email", "doctorEmail"]),
    ("allergies", &["allergies", "allergy"]),
    ("conditions", &["conditions", "diagnoses", "problems"]),
    ("medical_history", &["medical_history", "history", "past_history"]),
];

const INTERVIEW_ALIASES: &[(&str, &[&str])] = &[
    ("interview_date", &["interview_date", "date_of_interview", "interviewDate"]),
    ("pharmacist_name", &["pharmacist_name", "pharmacist"]),
    ("smoking_status", &["smoking_status", "smoking", "smoker"]),
    ("alcohol_use", &["alcohol_use", "alcohol"]),
    ("fluid_intake", &["fluid_intake", "fluids"]),
    ("exercise_level", &["exercise_level", "exercise"]),
];

const MEDICATION_ALIASES: &[(&str, &[&str])] = &[
    ("name", &["name", "drug", "medication", "medicine", "drug_name"]),
    ("strength", &["strength"]),
    ("form", &["form", "dose_form"]),
    ("dosage", &["dosage", "dose", "directions", "sig"]),
    ("frequency", &["frequency", "freq"]),
    ("route", &["route"]),
    ("prescriber", &["prescriber", "prescribed_by", "doctor"]),
    ("compliance_notes", &["compliance_notes", "notes", "comment"]),
];

const MEDICATION_LIST_KEYS: &[&str] = &["medications", "medication_list", "meds", "medicines"];
const RECOMMENDATION_LIST_KEYS: &[&str] = &["recommendations", "recommendation_list"];

/// Normalize raw extractor output. Never fails.
pub fn normalize(raw: &RawExtraction) -> NormalizedExtraction {
    let empty = Map::new();
    let fields = raw.fields.as_object().unwrap_or(&empty);

    let mut record = CanonicalRecord::default();

    let patient_src = section(fields, "patient");
    for name in PatientInfo::FIELDS {
        let value = lookup(name, aliases_for(PATIENT_ALIASES, name), patient_src, fields);
        if let Some(slot) = record.patient.field_mut(name) {
            *slot = value;
        }
    }

    let interview_src = section(fields, "interview");
    for name in InterviewAssessment::FIELDS {
        let value = lookup(name, aliases_for(INTERVIEW_ALIASES, name), interview_src, fields);
        if let Some(slot) = record.interview.field_mut(name) {
            *slot = value;
        }
    }

    record.medications = list_items(fields, MEDICATION_LIST_KEYS)
        .iter()
        .filter_map(medication_from_value)
        .collect();

    record.recommendations = list_items(fields, RECOMMENDATION_LIST_KEYS)
        .iter()
        .filter_map(recommendation_from_value)
        .collect();

    record_provenance(&mut record, fields);

    tracing::debug!(
        medications = record.medications.len(),
        recommendations = record.recommendations.len(),
        scored_fields = record.provenance.len(),
        "Normalized extraction"
    );

    NormalizedExtraction {
        record,
        raw_text: raw.raw_text.clone(),
    }
}

fn section<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    fields.get(key).and_then(Value::as_object)
}

fn aliases_for(table: &'static [(&'static str, &'static [&'static str])], field: &str) -> &'static [&'static str] {
    table
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// First non-empty value under the field name or one of its aliases,
/// looked up in the section first and then at the top level.
fn lookup(
    field: &str,
    aliases: &[&str],
    nested: Option<&Map<String, Value>>,
    flat: &Map<String, Value>,
) -> String {
    let keys = std::iter::once(field).chain(aliases.iter().copied());
    for map in nested.into_iter().chain(std::iter::once(flat)) {
        for key in keys.clone() {
            if let Some(v) = map.get(key) {
                let text = coerce_string(v);
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }
    String::new()
}

/// Coerce any JSON value to display text. Missing and null become "".
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => (if *b { "Yes" } else { "No" }).to_string(),
        Value::Array(items) => items
            .iter()
            .map(coerce_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => ["value", "text", "name"]
            .iter()
            .find_map(|k| map.get(*k))
            .map(coerce_string)
            .unwrap_or_default(),
    }
}

/// A list, a single object, a bare string, or nothing, as a list.
fn list_items(fields: &Map<String, Value>, keys: &[&str]) -> Vec<Value> {
    let Some(value) = keys.iter().find_map(|k| fields.get(*k)) else {
        return Vec::new();
    };
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![value.clone()],
        Value::String(s) => s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| Value::String(l.to_string()))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn medication_from_value(value: &Value) -> Option<MedicationEntry> {
    let mut entry = MedicationEntry {
        origin: FieldOrigin::Extracted,
        ..Default::default()
    };

    match value {
        Value::Object(map) => {
            let texts = |field: &str| lookup(field, aliases_for(MEDICATION_ALIASES, field), Some(map), &Map::new());
            entry.name = texts("name");
            entry.strength = texts("strength");
            entry.form = texts("form");
            entry.dosage = texts("dosage");
            entry.frequency = texts("frequency");
            entry.route = texts("route");
            entry.prescriber = texts("prescriber");
            entry.compliance_notes = texts("compliance_notes");

            let regularity = lookup("regularity", &["type", "status"], Some(map), &Map::new());
            entry.regularity = parse_regularity(&regularity);
            let compliance = lookup("compliance_status", &["compliance", "adherence"], Some(map), &Map::new());
            entry.compliance_status = parse_compliance(&compliance);
            entry.confidence = parse_confidence(map.get("confidence"));
        }
        other => {
            entry.name = coerce_string(other);
        }
    }

    let has_content = [
        &entry.name,
        &entry.strength,
        &entry.dosage,
        &entry.frequency,
        &entry.compliance_notes,
    ]
    .iter()
    .any(|s| !s.is_empty());

    has_content.then_some(entry)
}

fn recommendation_from_value(value: &Value) -> Option<Recommendation> {
    let rec = match value {
        Value::Object(map) => {
            let get = |field: &str, aliases: &[&str]| lookup(field, aliases, Some(map), &Map::new());
            Recommendation {
                issue: get("issue", &["problem", "finding"]),
                action: get("action", &["recommendation", "plan"]),
                priority: parse_priority(&get("priority", &["urgency"])),
                counselling: get("counselling", &["counseling", "patient_counselling"]),
            }
        }
        other => Recommendation {
            action: coerce_string(other),
            ..Default::default()
        },
    };

    (!rec.issue.is_empty() || !rec.action.is_empty()).then_some(rec)
}

fn record_provenance(record: &mut CanonicalRecord, fields: &Map<String, Value>) {
    let scores = fields.get("field_confidence").and_then(Value::as_object);

    let mut paths: Vec<String> = Vec::new();
    for name in PatientInfo::FIELDS {
        if record.patient.field(name).is_some_and(|v| !v.is_empty()) {
            paths.push(format!("patient.{name}"));
        }
    }
    for name in InterviewAssessment::FIELDS {
        if record.interview.field(name).is_some_and(|v| !v.is_empty()) {
            paths.push(format!("interview.{name}"));
        }
    }

    for path in paths {
        let confidence = parse_confidence(scores.and_then(|s| s.get(&path)));
        record.provenance.insert(
            path,
            Provenance {
                confidence,
                origin: FieldOrigin::Extracted,
            },
        );
    }
}

fn folded(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect()
}

/// Lenient read of a regularity label. Unrecognised text means regular.
pub fn parse_regularity(text: &str) -> Regularity {
    let t = folded(text);
    if t.contains("prn") || t.contains("as required") || t.contains("as needed") {
        Regularity::Prn
    } else if t.contains("stop") || t.contains("ceas") || t.contains("discontinu") {
        Regularity::Stopped
    } else if t.contains("limited") || t.contains("short term") || t.contains("course") {
        Regularity::LimitedDuration
    } else {
        Regularity::Regular
    }
}

/// Lenient read of a compliance label. Unrecognised text means good.
pub fn parse_compliance(text: &str) -> ComplianceStatus {
    let t = folded(text);
    if t.contains("non adher") || t.contains("nonadher") || t.contains("non compl") || t.contains("not taking") {
        ComplianceStatus::NonAdherent
    } else if t.contains("poor") {
        ComplianceStatus::Poor
    } else if t.contains("moderate") || t.contains("partial") || t.contains("fair") {
        ComplianceStatus::Moderate
    } else {
        ComplianceStatus::Good
    }
}

/// Lenient read of a priority label. Unrecognised text means medium.
pub fn parse_priority(text: &str) -> Priority {
    let t = folded(text);
    let has = |word: &str| t.split_whitespace().any(|w| w == word);
    if has("high") || has("urgent") {
        Priority::High
    } else if has("low") {
        Priority::Low
    } else {
        Priority::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(fields: Value) -> CanonicalRecord {
        normalize(&RawExtraction {
            raw_text: "text".into(),
            fields,
        })
        .record
    }

    #[test]
    fn empty_input_gives_empty_record() {
        let out = normalize(&RawExtraction::default());
        assert!(out.record.is_empty());
        assert_eq!(out.raw_text, "");

        for junk in [json!(null), json!(42), json!("text"), json!([1, 2])] {
            assert!(run(junk).is_empty());
        }
    }

    #[test]
    fn scalars_are_coerced_to_strings() {
        let record = run(json!({
            "patient": {
                "name": "  Jane Doe ",
                "dob": "1950-01-01",
                "medicare": 29501234561u64,
                "allergies": ["penicillin", null, "sulfa"],
                "gender": null,
                "email": { "value": "jane@example.com" }
            }
        }));
        assert_eq!(record.patient.name, "Jane Doe");
        assert_eq!(record.patient.date_of_birth, "1950-01-01");
        assert_eq!(record.patient.medicare_number, "29501234561");
        assert_eq!(record.patient.allergies, "penicillin, sulfa");
        assert_eq!(record.patient.gender, "");
        assert_eq!(record.patient.email, "jane@example.com");
    }

    #[test]
    fn flat_aliases_fill_patient_fields() {
        let record = run(json!({ "patient_name": "John Smith", "gp_name": "Dr Lee" }));
        assert_eq!(record.patient.name, "John Smith");
        assert_eq!(record.patient.referring_gp, "Dr Lee");
    }

    #[test]
    fn medications_single_object_becomes_list() {
        let record = run(json!({ "medications": { "name": "Metformin", "dose": "500mg BD" } }));
        assert_eq!(record.medications.len(), 1);
        assert_eq!(record.medications[0].dosage, "500mg BD");
        assert_eq!(record.medications[0].confidence, 1.0);
        assert_eq!(record.medications[0].origin, FieldOrigin::Extracted);
    }

    #[test]
    fn medications_bare_string_splits_lines() {
        let record = run(json!({ "medications": "Aspirin 100mg\n\nPerindopril 5mg" }));
        let names: Vec<_> = record.medications.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Aspirin 100mg", "Perindopril 5mg"]);
    }

    #[test]
    fn medication_confidence_is_retained() {
        let record = run(json!({ "medications": [{ "name": "Wafarin", "confidence": 0.4 }] }));
        let med = &record.medications[0];
        assert_eq!(med.name, "Wafarin");
        assert_eq!(med.confidence, 0.4);
        assert!(med.needs_review());
    }

    #[test]
    fn blank_and_null_medications_are_dropped() {
        let record = run(json!({ "medications": [null, {}, { "confidence": 0.2 }, "Digoxin"] }));
        assert_eq!(record.medications.len(), 1);
        assert_eq!(record.medications[0].name, "Digoxin");
    }

    #[test]
    fn categorical_labels_are_read_leniently() {
        let record = run(json!({ "medications": [
            { "name": "Paracetamol", "regularity": "PRN - as required", "compliance": "Non-adherent" },
            { "name": "Amoxicillin", "type": "5 day course", "adherence": "partial" },
            { "name": "Ramipril", "status": "ceased", "compliance_status": 12 }
        ] }));
        let meds = &record.medications;
        assert_eq!(meds[0].regularity, Regularity::Prn);
        assert_eq!(meds[0].compliance_status, ComplianceStatus::NonAdherent);
        assert_eq!(meds[1].regularity, Regularity::LimitedDuration);
        assert_eq!(meds[1].compliance_status, ComplianceStatus::Moderate);
        assert_eq!(meds[2].regularity, Regularity::Stopped);
        assert_eq!(meds[2].compliance_status, ComplianceStatus::Good);
    }

    #[test]
    fn recommendations_are_coerced() {
        let record = run(json!({ "recommendations": [
            { "problem": "Duplicate NSAIDs", "plan": "Cease ibuprofen", "urgency": "URGENT" },
            "Review statin dose",
            {}
        ] }));
        assert_eq!(record.recommendations.len(), 2);
        assert_eq!(record.recommendations[0].priority, Priority::High);
        assert_eq!(record.recommendations[0].issue, "Duplicate NSAIDs");
        assert_eq!(record.recommendations[1].action, "Review statin dose");
        assert_eq!(record.recommendations[1].priority, Priority::Medium);
    }

    #[test]
    fn field_confidence_becomes_provenance() {
        let record = run(json!({
            "patient": { "name": "Jane Doe", "dob": "01/01/1950" },
            "field_confidence": { "patient.date_of_birth": 0.55, "patient.gender": 0.1 }
        }));
        let dob = record.provenance.get("patient.date_of_birth").unwrap();
        assert_eq!(dob.confidence, 0.55);
        assert_eq!(dob.origin, FieldOrigin::Extracted);
        assert_eq!(record.provenance.get("patient.name").unwrap().confidence, 1.0);
        // no value extracted, so no provenance either
        assert!(!record.provenance.contains_key("patient.gender"));
        assert_eq!(record.needs_review(), vec!["patient.date_of_birth"]);
    }
}
