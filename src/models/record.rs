use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::enums::{ComplianceStatus, FieldOrigin, Priority, Regularity};

/// Below this confidence an extracted value is flagged for human review.
/// Flagged values are still used as-is.
pub const REVIEW_THRESHOLD: f64 = 0.70;

/// Generates a flat all-`String` struct plus by-name accessors, so the
/// normalizer and the path catalogue share one field list.
macro_rules! text_fields {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $(pub $field: String),+
        }

        impl $name {
            pub const FIELDS: &'static [&'static str] = &[$(stringify!($field)),+];

            pub fn field(&self, name: &str) -> Option<&str> {
                match name {
                    $(stringify!($field) => Some(self.$field.as_str()),)+
                    _ => None,
                }
            }

            pub fn field_mut(&mut self, name: &str) -> Option<&mut String> {
                match name {
                    $(stringify!($field) => Some(&mut self.$field),)+
                    _ => None,
                }
            }

            pub fn is_blank(&self) -> bool {
                true $(&& self.$field.trim().is_empty())+
            }
        }
    };
}

text_fields!(
    /// Patient demographics and referral details. Only name and DOB are required.
    PatientInfo {
        name,
        date_of_birth,
        gender,
        medicare_number,
        phone,
        email,
        address,
        referring_gp,
        gp_practice,
        gp_email,
        allergies,
        conditions,
        medical_history,
    }
);

text_fields!(
    /// Home interview findings. Categorical answers are kept as free text
    /// so unusual answers survive a round trip.
    InterviewAssessment {
        interview_date,
        pharmacist_name,
        living_arrangement,
        smoking_status,
        cigarettes_per_day,
        alcohol_use,
        standard_drinks_per_week,
        fluid_intake,
        exercise_level,
        diet_notes,
        medication_management,
        uses_dose_aid,
        dose_aid_type,
        falls_in_last_year,
        falls_details,
        notes,
    }
);

fn full_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicationEntry {
    pub name: String,
    pub strength: String,
    pub form: String,
    pub dosage: String,
    pub frequency: String,
    pub route: String,
    pub regularity: Regularity,
    pub prescriber: String,
    pub compliance_status: ComplianceStatus,
    pub compliance_notes: String,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    pub origin: FieldOrigin,
}

impl Default for MedicationEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            strength: String::new(),
            form: String::new(),
            dosage: String::new(),
            frequency: String::new(),
            route: String::new(),
            regularity: Regularity::default(),
            prescriber: String::new(),
            compliance_status: ComplianceStatus::default(),
            compliance_notes: String::new(),
            confidence: full_confidence(),
            origin: FieldOrigin::UserEdited,
        }
    }
}

impl MedicationEntry {
    pub const FIELDS: &'static [&'static str] = &[
        "name",
        "strength",
        "form",
        "dosage",
        "frequency",
        "route",
        "regularity",
        "prescriber",
        "compliance_status",
        "compliance_notes",
        "confidence",
    ];

    pub fn needs_review(&self) -> bool {
        self.confidence < REVIEW_THRESHOLD
    }

    /// "Atorvastatin 20 mg tablet", skipping empty parts.
    pub fn display_name(&self) -> String {
        [&self.name, &self.strength, &self.form]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// A human edit makes the entry authoritative.
    pub fn mark_user_edited(&mut self) {
        self.origin = FieldOrigin::UserEdited;
        self.confidence = 1.0;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendation {
    pub issue: String,
    pub action: String,
    pub priority: Priority,
    /// Patient counselling text; empty when none was given.
    pub counselling: String,
}

impl Recommendation {
    pub const FIELDS: &'static [&'static str] = &["issue", "action", "priority", "counselling"];
}

/// Confidence and origin of one scalar value, keyed by its dotted path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub confidence: f64,
    pub origin: FieldOrigin,
}

/// A leaf value together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExtraction {
    pub value: String,
    pub confidence: f64,
    pub origin: FieldOrigin,
}

impl FieldExtraction {
    pub fn needs_review(&self) -> bool {
        self.confidence < REVIEW_THRESHOLD
    }
}

/// The single structured representation of a review in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalRecord {
    pub patient: PatientInfo,
    pub medications: Vec<MedicationEntry>,
    pub interview: InterviewAssessment,
    pub recommendations: Vec<Recommendation>,
    pub provenance: BTreeMap<String, Provenance>,
}

/// Top-level sections addressable by dotted paths.
pub const DATA_ROOTS: &[&str] = &["patient", "medications", "interview", "recommendations"];

impl CanonicalRecord {
    pub fn is_empty(&self) -> bool {
        self.patient.is_blank()
            && self.interview.is_blank()
            && self.medications.is_empty()
            && self.recommendations.is_empty()
    }

    /// Value and provenance of a patient or interview scalar.
    /// Values with no recorded provenance count as user-entered.
    pub fn field_extraction(&self, path: &str) -> Option<FieldExtraction> {
        let (section, field) = path.split_once('.')?;
        let value = match section {
            "patient" => self.patient.field(field)?,
            "interview" => self.interview.field(field)?,
            _ => return None,
        };
        let prov = self.provenance.get(path).copied().unwrap_or(Provenance {
            confidence: 1.0,
            origin: FieldOrigin::UserEdited,
        });
        Some(FieldExtraction {
            value: value.to_string(),
            confidence: prov.confidence,
            origin: prov.origin,
        })
    }

    /// Dotted paths of every value currently below the review threshold.
    pub fn needs_review(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .provenance
            .iter()
            .filter(|(_, p)| p.confidence < REVIEW_THRESHOLD)
            .map(|(path, _)| path.clone())
            .collect();
        paths.extend(
            self.medications
                .iter()
                .enumerate()
                .filter(|(_, m)| m.needs_review())
                .map(|(i, _)| format!("medications[{i}]")),
        );
        paths
    }

    /// Record a human edit of a scalar path.
    pub fn mark_user_edited(&mut self, path: &str) {
        if let Some(rest) = path.strip_prefix("medications[") {
            if let Some(idx) = rest.split(']').next().and_then(|n| n.parse::<usize>().ok()) {
                if let Some(med) = self.medications.get_mut(idx) {
                    med.mark_user_edited();
                }
            }
            return;
        }
        self.provenance.insert(
            path.to_string(),
            Provenance {
                confidence: 1.0,
                origin: FieldOrigin::UserEdited,
            },
        );
    }
}
