//! Conditionally required interview fields.
//!
//! One table answers "is this field required right now?" for both the
//! validator and the review form.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::CanonicalRecord;

/// A field that becomes required when a sibling field has a given value.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalRule {
    pub field_path: &'static str,
    pub depends_on: &'static str,
    pub predicate: fn(&str) -> bool,
    pub message: &'static str,
}

fn normalized(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokingStatus {
    Never,
    Former,
    Current,
}

// Checked in order: "non-smoker" and "ex-smoker" both contain "smoker".
static SMOKING_PATTERNS: LazyLock<[(SmokingStatus, Regex); 3]> = LazyLock::new(|| {
    [
        (
            SmokingStatus::Never,
            Regex::new(r"(?i)\b(non|never|nonsmoker)\b").unwrap(),
        ),
        (
            SmokingStatus::Former,
            Regex::new(r"(?i)\b(ex|former|formerly|quit|stopped|ceased)\b").unwrap(),
        ),
        (
            SmokingStatus::Current,
            Regex::new(r"(?i)\b(current|currently|smoker|smokes|yes)\b").unwrap(),
        ),
    ]
});

/// Classify a free-text smoking answer by whole words. `None` when blank
/// or unrecognised.
pub fn classify_smoking(value: &str) -> Option<SmokingStatus> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    SMOKING_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(value))
        .map(|(status, _)| *status)
}

fn is_current_smoker(value: &str) -> bool {
    classify_smoking(value) == Some(SmokingStatus::Current)
}

fn is_yes(value: &str) -> bool {
    matches!(normalized(value).as_str(), "yes" | "y" | "true")
}

fn drinks_alcohol(value: &str) -> bool {
    let v = normalized(value);
    !v.is_empty() && !matches!(v.as_str(), "no" | "none" | "never" | "non-drinker" | "nil")
}

pub const CONDITIONAL_RULES: &[ConditionalRule] = &[
    ConditionalRule {
        field_path: "interview.cigarettes_per_day",
        depends_on: "interview.smoking_status",
        predicate: is_current_smoker,
        message: "Cigarettes per day is required for a current smoker",
    },
    ConditionalRule {
        field_path: "interview.standard_drinks_per_week",
        depends_on: "interview.alcohol_use",
        predicate: drinks_alcohol,
        message: "Standard drinks per week is required when alcohol is used",
    },
    ConditionalRule {
        field_path: "interview.dose_aid_type",
        depends_on: "interview.uses_dose_aid",
        predicate: is_yes,
        message: "Dose administration aid type is required when one is used",
    },
    ConditionalRule {
        field_path: "interview.falls_details",
        depends_on: "interview.falls_in_last_year",
        predicate: is_yes,
        message: "Details are required when the patient has fallen in the last year",
    },
];

fn interview_value<'a>(record: &'a CanonicalRecord, path: &str) -> &'a str {
    path.strip_prefix("interview.")
        .and_then(|field| record.interview.field(field))
        .unwrap_or_default()
}

impl ConditionalRule {
    pub fn applies(&self, record: &CanonicalRecord) -> bool {
        (self.predicate)(interview_value(record, self.depends_on))
    }

    pub fn is_satisfied(&self, record: &CanonicalRecord) -> bool {
        !self.applies(record) || !interview_value(record, self.field_path).trim().is_empty()
    }
}

/// Whether a conditional field is currently required.
pub fn is_required(record: &CanonicalRecord, field_path: &str) -> bool {
    CONDITIONAL_RULES
        .iter()
        .any(|rule| rule.field_path == field_path && rule.applies(record))
}

/// Conditional fields required for this record, for the review form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveRequirement {
    pub field_path: &'static str,
    pub depends_on: &'static str,
    pub satisfied: bool,
}

pub fn active_requirements(record: &CanonicalRecord) -> Vec<ActiveRequirement> {
    CONDITIONAL_RULES
        .iter()
        .filter(|rule| rule.applies(record))
        .map(|rule| ActiveRequirement {
            field_path: rule.field_path,
            depends_on: rule.depends_on,
            satisfied: rule.is_satisfied(record),
        })
        .collect()
}
