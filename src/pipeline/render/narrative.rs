//! Report prose derived from categorical interview and medication fields.
//!
//! Each phrase comes from a small rule table; unmatched or blank input
//! always lands on a fallback sentence.

use crate::models::enums::{ComplianceStatus, Regularity};
use crate::models::InterviewAssessment;
use crate::pipeline::validation::{classify_smoking, SmokingStatus};

/// One rule: if any keyword occurs as whole words in the normalized answer,
/// use the phrase.
struct PhraseRule {
    keywords: &'static [&'static str],
    phrase: &'static str,
}

fn normalized(value: &str) -> String {
    value.trim().to_lowercase()
}

fn contains_word(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + keyword.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn first_match(rules: &[PhraseRule], value: &str) -> Option<&'static str> {
    let v = normalized(value);
    if v.is_empty() {
        return None;
    }
    rules
        .iter()
        .find(|r| r.keywords.iter().any(|k| contains_word(&v, k)))
        .map(|r| r.phrase)
}

/// Rule match, else the answer quoted back under `label`, else `missing`.
fn phrase_or_free_text(rules: &[PhraseRule], value: &str, label: &str, missing: &str) -> String {
    match first_match(rules, value) {
        Some(phrase) => phrase.to_string(),
        None if value.trim().is_empty() => missing.to_string(),
        None => format!("{label}: {}", value.trim()),
    }
}

pub fn regularity_phrase(regularity: Regularity) -> &'static str {
    match regularity {
        Regularity::Regular => "Taken regularly",
        Regularity::Prn => "Taken when required",
        Regularity::LimitedDuration => "Short course",
        Regularity::Stopped => "Currently stopped",
    }
}

pub fn compliance_phrase(status: ComplianceStatus) -> &'static str {
    match status {
        ComplianceStatus::Good => "Taken as prescribed",
        ComplianceStatus::Moderate => "Occasional missed doses reported",
        ComplianceStatus::Poor => "Frequent missed doses reported",
        ComplianceStatus::NonAdherent => "Not being taken as prescribed",
    }
}

/// Uses the same classifier as the cigarettes-per-day requirement, so the
/// prose and the validation rule never disagree.
pub fn smoking_phrase(interview: &InterviewAssessment) -> String {
    match classify_smoking(&interview.smoking_status) {
        Some(SmokingStatus::Current) => match interview.cigarettes_per_day.trim() {
            "" => "Current smoker".to_string(),
            count => format!("Current smoker ({count} cigarettes per day)"),
        },
        Some(SmokingStatus::Former) => "Ex-smoker".to_string(),
        Some(SmokingStatus::Never) => "Non-smoker".to_string(),
        None if interview.smoking_status.trim().is_empty() => {
            "Smoking status not recorded".to_string()
        }
        None => format!("Smoking status: {}", interview.smoking_status.trim()),
    }
}

const ALCOHOL_NONE: &[PhraseRule] = &[PhraseRule {
    keywords: &["none", "never", "nil", "non-drinker"],
    phrase: "Does not drink alcohol",
}];

pub fn alcohol_phrase(interview: &InterviewAssessment) -> String {
    let answer = interview.alcohol_use.trim();
    if answer.is_empty() {
        return "Alcohol intake not recorded".to_string();
    }
    if normalized(answer) == "no" || first_match(ALCOHOL_NONE, answer).is_some() {
        return "Does not drink alcohol".to_string();
    }
    match interview.standard_drinks_per_week.trim() {
        "" => format!("Drinks alcohol ({answer})"),
        drinks => format!("Drinks alcohol, about {drinks} standard drinks per week"),
    }
}

fn is_yes(value: &str) -> Option<bool> {
    match normalized(value).as_str() {
        "yes" | "y" | "true" => Some(true),
        "no" | "n" | "false" => Some(false),
        _ => None,
    }
}

pub fn dose_aid_phrase(interview: &InterviewAssessment) -> String {
    match is_yes(&interview.uses_dose_aid) {
        Some(true) => match interview.dose_aid_type.trim() {
            "" => "Uses a dose administration aid".to_string(),
            kind => format!("Uses a dose administration aid ({kind})"),
        },
        Some(false) => "Does not use a dose administration aid".to_string(),
        None => "Dose administration aid use not recorded".to_string(),
    }
}

pub fn falls_phrase(interview: &InterviewAssessment) -> String {
    match is_yes(&interview.falls_in_last_year) {
        Some(true) => match interview.falls_details.trim() {
            "" => "Has fallen in the last 12 months".to_string(),
            details => format!("Has fallen in the last 12 months: {details}"),
        },
        Some(false) => "No falls in the last 12 months".to_string(),
        None => "Falls history not recorded".to_string(),
    }
}

const LIVING_RULES: &[PhraseRule] = &[
    PhraseRule { keywords: &["alone"], phrase: "Lives alone" },
    PhraseRule { keywords: &["spouse", "partner", "husband", "wife"], phrase: "Lives with partner" },
    PhraseRule { keywords: &["family", "son", "daughter", "children"], phrase: "Lives with family" },
    PhraseRule { keywords: &["aged care", "nursing", "residential"], phrase: "Lives in residential care" },
];

pub fn living_phrase(interview: &InterviewAssessment) -> String {
    phrase_or_free_text(
        LIVING_RULES,
        &interview.living_arrangement,
        "Living arrangements",
        "Living arrangements not recorded",
    )
}

// "inadequate" is its own word, so "adequate" never shadows it.
const FLUID_RULES: &[PhraseRule] = &[
    PhraseRule { keywords: &["inadequate", "poor", "low", "minimal"], phrase: "Fluid intake is inadequate" },
    PhraseRule { keywords: &["adequate", "good", "normal", "sufficient"], phrase: "Fluid intake is adequate" },
    PhraseRule { keywords: &["restricted", "restriction"], phrase: "On a fluid restriction" },
    PhraseRule { keywords: &["high", "excessive"], phrase: "Fluid intake is high" },
];

pub fn fluid_intake_phrase(interview: &InterviewAssessment) -> String {
    phrase_or_free_text(
        FLUID_RULES,
        &interview.fluid_intake,
        "Fluid intake",
        "Fluid intake not recorded",
    )
}

const EXERCISE_RULES: &[PhraseRule] = &[
    PhraseRule { keywords: &["sedentary", "none", "nil", "inactive"], phrase: "Sedentary, with little regular exercise" },
    PhraseRule { keywords: &["light", "low", "walks", "walking"], phrase: "Does light exercise" },
    PhraseRule { keywords: &["moderate"], phrase: "Does moderate exercise" },
    PhraseRule { keywords: &["active", "high", "vigorous", "daily"], phrase: "Exercises regularly" },
];

pub fn exercise_phrase(interview: &InterviewAssessment) -> String {
    phrase_or_free_text(
        EXERCISE_RULES,
        &interview.exercise_level,
        "Exercise",
        "Exercise not recorded",
    )
}

pub fn diet_phrase(interview: &InterviewAssessment) -> String {
    match interview.diet_notes.trim() {
        "" => "Diet not recorded".to_string(),
        notes => format!("Diet: {notes}"),
    }
}

pub fn medication_management_phrase(interview: &InterviewAssessment) -> String {
    match interview.medication_management.trim() {
        "" => "Medication management not recorded".to_string(),
        how => format!("Medicines managed by: {how}"),
    }
}

/// The interview summary paragraph, one sentence per topic.
pub fn lifestyle_sentences(interview: &InterviewAssessment) -> Vec<String> {
    vec![
        living_phrase(interview),
        medication_management_phrase(interview),
        dose_aid_phrase(interview),
        smoking_phrase(interview),
        alcohol_phrase(interview),
        fluid_intake_phrase(interview),
        exercise_phrase(interview),
        diet_phrase(interview),
        falls_phrase(interview),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_interview_uses_fallbacks_everywhere() {
        let sentences = lifestyle_sentences(&InterviewAssessment::default());
        assert_eq!(sentences.len(), 9);
        for s in &sentences {
            assert!(s.contains("not recorded"), "{s}");
            assert!(!s.to_lowercase().contains("undefined"));
        }
    }

    #[test]
    fn non_smoker_is_not_read_as_smoker() {
        let mut i = InterviewAssessment::default();
        i.smoking_status = "Non-smoker".into();
        assert_eq!(smoking_phrase(&i), "Non-smoker");
        i.smoking_status = "Ex-smoker, quit 2010".into();
        assert_eq!(smoking_phrase(&i), "Ex-smoker");
    }

    #[test]
    fn current_smoker_includes_count() {
        let mut i = InterviewAssessment::default();
        i.smoking_status = "Current smoker".into();
        assert_eq!(smoking_phrase(&i), "Current smoker");
        i.cigarettes_per_day = "10".into();
        assert_eq!(smoking_phrase(&i), "Current smoker (10 cigarettes per day)");
    }

    #[test]
    fn unrecognised_answers_are_quoted_back() {
        let mut i = InterviewAssessment::default();
        i.smoking_status = "vapes".into();
        assert_eq!(smoking_phrase(&i), "Smoking status: vapes");
        i.living_arrangement = "boarding house".into();
        assert_eq!(living_phrase(&i), "Living arrangements: boarding house");
    }

    #[test]
    fn smoking_keywords_need_whole_words() {
        let mut i = InterviewAssessment::default();
        i.smoking_status = "excessive".into();
        assert_eq!(smoking_phrase(&i), "Smoking status: excessive");
        i.smoking_status = "Never".into();
        assert_eq!(smoking_phrase(&i), "Non-smoker");
    }

    #[test]
    fn fluid_exercise_and_diet_are_reported() {
        let mut i = InterviewAssessment::default();
        i.fluid_intake = "Inadequate".into();
        i.exercise_level = "Sedentary".into();
        i.diet_notes = "Low salt diet plan".into();
        let sentences = lifestyle_sentences(&i);
        assert!(sentences.contains(&"Fluid intake is inadequate".to_string()));
        assert!(sentences.contains(&"Sedentary, with little regular exercise".to_string()));
        assert!(sentences.contains(&"Diet: Low salt diet plan".to_string()));

        i.fluid_intake = "Adequate, 1.5L".into();
        assert_eq!(fluid_intake_phrase(&i), "Fluid intake is adequate");
        i.exercise_level = "Inactive".into();
        assert_eq!(exercise_phrase(&i), "Sedentary, with little regular exercise");
        i.exercise_level = "Moderate".into();
        assert_eq!(exercise_phrase(&i), "Does moderate exercise");
    }

    #[test]
    fn unmatched_lifestyle_answers_are_quoted_back() {
        let mut i = InterviewAssessment::default();
        i.fluid_intake = "2 cups tea".into();
        i.exercise_level = "Swims in summer".into();
        assert_eq!(fluid_intake_phrase(&i), "Fluid intake: 2 cups tea");
        assert_eq!(exercise_phrase(&i), "Exercise: Swims in summer");
    }

    #[test]
    fn alcohol_and_dose_aid_and_falls() {
        let mut i = InterviewAssessment::default();
        i.alcohol_use = "Nil".into();
        assert_eq!(alcohol_phrase(&i), "Does not drink alcohol");
        i.alcohol_use = "Social".into();
        i.standard_drinks_per_week = "4".into();
        assert_eq!(alcohol_phrase(&i), "Drinks alcohol, about 4 standard drinks per week");

        i.uses_dose_aid = "yes".into();
        i.dose_aid_type = "Webster-pak".into();
        assert_eq!(dose_aid_phrase(&i), "Uses a dose administration aid (Webster-pak)");

        i.falls_in_last_year = "No".into();
        assert_eq!(falls_phrase(&i), "No falls in the last 12 months");
    }

    #[test]
    fn categorical_phrases_cover_every_variant() {
        assert_eq!(regularity_phrase(Regularity::Prn), "Taken when required");
        assert_eq!(compliance_phrase(ComplianceStatus::Poor), "Frequent missed doses reported");
    }
}
