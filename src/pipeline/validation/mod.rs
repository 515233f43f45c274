//! Record validation.
//!
//! `validate` is a pure function of the record and its context: the same
//! input always yields the same issues in the same order (rule order, then
//! list index). Issues are advisory. Only the caller decides what a
//! blocking issue prevents.

pub mod rules;

pub use rules::*;

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::enums::{ReviewStep, Severity};
use crate::models::CanonicalRecord;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d %B %Y", "%d %b %Y"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    /// Dotted path of the field to fix.
    pub field_path: String,
    pub severity: Severity,
    /// Wizard step that owns `field_path`.
    pub step: ReviewStep,
}

impl ValidationIssue {
    fn new(severity: Severity, field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let field_path = field_path.into();
        Self {
            step: step_for_path(&field_path),
            message: message.into(),
            field_path,
            severity,
        }
    }

    fn blocking(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Blocking, field_path, message)
    }

    fn informational(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Informational, field_path, message)
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// Values outside the record that validation may consult.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationContext {
    /// Pharmacist name from the signed-in profile, if any.
    pub profile_pharmacist: Option<String>,
}

/// The wizard step where a path is edited.
pub fn step_for_path(path: &str) -> ReviewStep {
    let root = path.split(['.', '[']).next().unwrap_or_default();
    match root {
        "patient" => ReviewStep::PatientInfo,
        "medications" => ReviewStep::MedicationsReview,
        "interview" => ReviewStep::Interview,
        "recommendations" => ReviewStep::Recommendations,
        _ => ReviewStep::FinalReview,
    }
}

/// Pick the first non-blank of explicit value, profile value, static default.
pub fn resolve_pharmacist(
    explicit: &str,
    profile: Option<&str>,
    static_default: Option<&str>,
) -> Option<String> {
    [Some(explicit), profile, static_default]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn is_email_shaped(value: &str) -> bool {
    EMAIL_SHAPE.is_match(value.trim())
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn has_blocking(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(ValidationIssue::is_blocking)
}

/// Run every rule against the record.
pub fn validate(record: &CanonicalRecord, ctx: &ValidationContext) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    check_patient(record, &mut issues);
    check_interview(record, ctx, &mut issues);
    check_medications(record, &mut issues);
    check_recommendations(record, &mut issues);

    issues
}

fn check_patient(record: &CanonicalRecord, issues: &mut Vec<ValidationIssue>) {
    let patient = &record.patient;

    if patient.name.trim().is_empty() {
        issues.push(ValidationIssue::blocking("patient.name", "Patient name is required"));
    }

    if patient.date_of_birth.trim().is_empty() {
        issues.push(ValidationIssue::blocking(
            "patient.date_of_birth",
            "Date of birth is required",
        ));
    } else if parse_date(&patient.date_of_birth).is_none() {
        issues.push(ValidationIssue::informational(
            "patient.date_of_birth",
            format!("Date of birth '{}' is not a recognised date", patient.date_of_birth.trim()),
        ));
    }

    // Empty e-mail addresses are allowed; only malformed ones are flagged.
    for (path, value, label) in [
        ("patient.email", &patient.email, "Patient e-mail"),
        ("patient.gp_email", &patient.gp_email, "GP e-mail"),
    ] {
        if !value.trim().is_empty() && !is_email_shaped(value) {
            issues.push(ValidationIssue::blocking(
                path,
                format!("{label} '{}' is not a valid e-mail address", value.trim()),
            ));
        }
    }
}

fn check_interview(record: &CanonicalRecord, ctx: &ValidationContext, issues: &mut Vec<ValidationIssue>) {
    let interview = &record.interview;

    // Interview rules start once the interview has any content.
    if interview.is_blank() {
        return;
    }

    if interview.interview_date.trim().is_empty() {
        issues.push(ValidationIssue::blocking(
            "interview.interview_date",
            "Interview date is required",
        ));
    } else if parse_date(&interview.interview_date).is_none() {
        issues.push(ValidationIssue::informational(
            "interview.interview_date",
            format!("Interview date '{}' is not a recognised date", interview.interview_date.trim()),
        ));
    }

    if resolve_pharmacist(&interview.pharmacist_name, ctx.profile_pharmacist.as_deref(), None).is_none() {
        issues.push(ValidationIssue::blocking(
            "interview.pharmacist_name",
            "Pharmacist name is required",
        ));
    }

    for rule in CONDITIONAL_RULES {
        if !rule.is_satisfied(record) {
            issues.push(ValidationIssue::blocking(rule.field_path, rule.message));
        }
    }
}

fn check_medications(record: &CanonicalRecord, issues: &mut Vec<ValidationIssue>) {
    for (i, med) in record.medications.iter().enumerate() {
        if med.name.trim().is_empty() {
            issues.push(ValidationIssue::blocking(
                format!("medications[{i}].name"),
                format!("Medication {} has no name", i + 1),
            ));
        }
        if med.needs_review() {
            issues.push(ValidationIssue::informational(
                format!("medications[{i}]"),
                format!(
                    "Medication {} ({}) was read with low confidence ({:.0}%); check it against the referral",
                    i + 1,
                    med.name.trim(),
                    med.confidence * 100.0
                ),
            ));
        }
    }
}

fn check_recommendations(record: &CanonicalRecord, issues: &mut Vec<ValidationIssue>) {
    for (i, rec) in record.recommendations.iter().enumerate() {
        if rec.issue.trim().is_empty() && rec.action.trim().is_empty() {
            issues.push(ValidationIssue::blocking(
                format!("recommendations[{i}].issue"),
                format!("Recommendation {} needs an issue or an action", i + 1),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MedicationEntry, Recommendation};
    use crate::models::enums::FieldOrigin;

    fn jane() -> CanonicalRecord {
        let mut record = CanonicalRecord::default();
        record.patient.name = "Jane Doe".into();
        record.patient.date_of_birth = "1950-01-01".into();
        record
    }

    #[test]
    fn minimal_record_is_clean() {
        let issues = validate(&jane(), &ValidationContext::default());
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn zero_medications_and_recommendations_are_never_flagged() {
        let record = jane();
        assert!(record.medications.is_empty() && record.recommendations.is_empty());
        let issues = validate(&record, &ValidationContext::default());
        assert!(!issues.iter().any(|i| i.field_path.starts_with("medications")
            || i.field_path.starts_with("recommendations")));
    }

    #[test]
    fn empty_record_requires_name_and_dob() {
        let issues = validate(&CanonicalRecord::default(), &ValidationContext::default());
        let paths: Vec<_> = issues.iter().map(|i| i.field_path.as_str()).collect();
        assert_eq!(paths, ["patient.name", "patient.date_of_birth"]);
        assert!(issues.iter().all(|i| i.is_blocking() && i.step == ReviewStep::PatientInfo));
    }

    #[test]
    fn email_checked_only_when_present() {
        let mut record = jane();
        record.patient.gp_email = "".into();
        record.patient.email = "jane@example.com".into();
        assert!(validate(&record, &ValidationContext::default()).is_empty());

        record.patient.gp_email = "dr.lee at clinic".into();
        let issues = validate(&record, &ValidationContext::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field_path, "patient.gp_email");
    }

    #[test]
    fn unparseable_dob_is_informational() {
        let mut record = jane();
        record.patient.date_of_birth = "spring 1950".into();
        let issues = validate(&record, &ValidationContext::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Informational);
        assert!(!has_blocking(&issues));
    }

    #[test]
    fn started_interview_needs_date_and_pharmacist() {
        let mut record = jane();
        record.interview.living_arrangement = "Lives alone".into();
        let issues = validate(&record, &ValidationContext::default());
        let paths: Vec<_> = issues.iter().map(|i| i.field_path.as_str()).collect();
        assert_eq!(paths, ["interview.interview_date", "interview.pharmacist_name"]);

        // A profile default satisfies the pharmacist requirement.
        record.interview.interview_date = "2026-03-02".into();
        let ctx = ValidationContext {
            profile_pharmacist: Some("Sam Patel".into()),
        };
        assert!(validate(&record, &ctx).is_empty());
    }

    #[test]
    fn conditional_interview_fields_follow_rule_table() {
        let mut record = jane();
        record.interview.interview_date = "2026-03-02".into();
        record.interview.pharmacist_name = "Sam Patel".into();
        record.interview.smoking_status = "current smoker".into();
        record.interview.uses_dose_aid = "yes".into();

        let issues = validate(&record, &ValidationContext::default());
        let paths: Vec<_> = issues.iter().map(|i| i.field_path.as_str()).collect();
        assert_eq!(paths, ["interview.cigarettes_per_day", "interview.dose_aid_type"]);
        assert!(issues.iter().all(|i| i.step == ReviewStep::Interview));
    }

    #[test]
    fn low_confidence_medication_is_informational() {
        let mut record = jane();
        record.medications.push(MedicationEntry {
            name: "Wafarin".into(),
            confidence: 0.4,
            origin: FieldOrigin::Extracted,
            ..Default::default()
        });
        let issues = validate(&record, &ValidationContext::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field_path, "medications[0]");
        assert_eq!(issues[0].severity, Severity::Informational);
        assert!(issues[0].message.contains("Wafarin"));
        assert_eq!(record.medications[0].name, "Wafarin");
    }

    #[test]
    fn blank_list_entries_are_blocking() {
        let mut record = jane();
        record.medications.push(MedicationEntry::default());
        record.recommendations.push(Recommendation::default());
        let issues = validate(&record, &ValidationContext::default());
        let paths: Vec<_> = issues.iter().map(|i| i.field_path.as_str()).collect();
        assert_eq!(paths, ["medications[0].name", "recommendations[0].issue"]);
    }

    #[test]
    fn validation_is_deterministic() {
        let mut record = CanonicalRecord::default();
        record.patient.email = "bad".into();
        record.interview.smoking_status = "current".into();
        record.medications.push(MedicationEntry { confidence: 0.1, ..Default::default() });
        let ctx = ValidationContext::default();
        assert_eq!(validate(&record, &ctx), validate(&record, &ctx));
    }

    #[test]
    fn pharmacist_resolution_order() {
        assert_eq!(resolve_pharmacist("  ", Some("Profile"), Some("Static")).as_deref(), Some("Profile"));
        assert_eq!(resolve_pharmacist("Explicit", Some("Profile"), None).as_deref(), Some("Explicit"));
        assert_eq!(resolve_pharmacist("", None, Some("Static")).as_deref(), Some("Static"));
        assert_eq!(resolve_pharmacist("", Some(""), None), None);
    }

    #[test]
    fn dates_in_common_formats_parse() {
        for d in ["1950-01-01", "01/01/1950", "01-01-1950", "01.01.1950", "01 January 1950", "01 Jan 1950"] {
            assert!(parse_date(d).is_some(), "{d}");
        }
        assert!(parse_date("31/02/1950").is_none());
    }

    #[test]
    fn steps_follow_path_roots() {
        assert_eq!(step_for_path("medications[3].dosage"), ReviewStep::MedicationsReview);
        assert_eq!(step_for_path("recommendations"), ReviewStep::Recommendations);
        assert_eq!(step_for_path("unknown"), ReviewStep::FinalReview);
    }
}
