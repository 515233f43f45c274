//! The review wizard as a pure transition function.
//!
//! `apply(state, message)` never mutates `state`; every accepted message
//! yields a new `ReviewState` whose record is a fresh `Arc` snapshot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WorkflowError;
use crate::models::enums::ReviewStep;
use crate::models::{CanonicalRecord, MedicationEntry, Recommendation, StoredDraft};
use crate::pipeline::path::{resolver, PathError};
use crate::pipeline::validation::{self, step_for_path, ValidationContext, ValidationIssue};

// ═══════════════════════════════════════════════════════════
// State
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct ReviewState {
    pub session_id: String,
    pub step: ReviewStep,
    pub record: Arc<CanonicalRecord>,
    /// Bumped on every record change. Async results carry the revision
    /// they were started from.
    pub revision: u64,
    pub finalized: bool,
    /// Record as it was when the current step was entered.
    #[serde(skip)]
    step_entry: Arc<CanonicalRecord>,
}

impl ReviewState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let record = Arc::new(CanonicalRecord::default());
        Self {
            session_id: session_id.into(),
            step: ReviewStep::Upload,
            step_entry: record.clone(),
            record,
            revision: 0,
            finalized: false,
        }
    }

    pub fn from_draft(draft: StoredDraft) -> Self {
        let record = Arc::new(draft.record);
        Self {
            session_id: draft.session_id,
            step: draft.step,
            step_entry: record.clone(),
            record,
            revision: draft.revision,
            finalized: draft.finalized,
        }
    }

    pub fn to_draft(&self) -> StoredDraft {
        StoredDraft {
            session_id: self.session_id.clone(),
            record: (*self.record).clone(),
            step: self.step,
            revision: self.revision,
            finalized: self.finalized,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Work that a fresh start would throw away.
    pub fn has_unfinished_work(&self) -> bool {
        !self.finalized && !self.record.is_empty()
    }

    pub fn issues(&self, ctx: &ValidationContext) -> Vec<ValidationIssue> {
        validation::validate(&self.record, ctx)
    }

    fn with_step(&self, step: ReviewStep) -> Self {
        Self {
            step,
            step_entry: self.record.clone(),
            ..self.clone()
        }
    }

    fn with_record(&self, record: CanonicalRecord) -> Self {
        Self {
            record: Arc::new(record),
            revision: self.revision + 1,
            finalized: false,
            ..self.clone()
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Messages
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowMessage {
    Next,
    Previous,
    /// Jump back from the final review to an earlier step.
    JumpTo { step: ReviewStep },
    /// Jump back to the step that owns an issue's field.
    FixNow { field_path: String },
    SetField { path: String, value: Value },
    AddMedication {
        #[serde(default)]
        entry: Option<MedicationEntry>,
    },
    RemoveMedication { index: usize },
    MoveMedication { from: usize, to: usize },
    AddRecommendation {
        #[serde(default)]
        entry: Option<Recommendation>,
    },
    RemoveRecommendation { index: usize },
    MoveRecommendation { from: usize, to: usize },
    ReplaceRecord { record: CanonicalRecord },
    DiscardStepChanges,
    Finalize,
}

impl WorkflowMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::JumpTo { .. } => "jump_to",
            Self::FixNow { .. } => "fix_now",
            Self::SetField { .. } => "set_field",
            Self::AddMedication { .. } => "add_medication",
            Self::RemoveMedication { .. } => "remove_medication",
            Self::MoveMedication { .. } => "move_medication",
            Self::AddRecommendation { .. } => "add_recommendation",
            Self::RemoveRecommendation { .. } => "remove_recommendation",
            Self::MoveRecommendation { .. } => "move_recommendation",
            Self::ReplaceRecord { .. } => "replace_record",
            Self::DiscardStepChanges => "discard_step_changes",
            Self::Finalize => "finalize",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Transitions
// ═══════════════════════════════════════════════════════════

pub fn apply(
    state: &ReviewState,
    message: WorkflowMessage,
    ctx: &ValidationContext,
) -> Result<ReviewState, WorkflowError> {
    match message {
        WorkflowMessage::Next => next(state, ctx),
        WorkflowMessage::Previous => {
            let to = state.step.previous().ok_or(WorkflowError::InvalidTransition {
                from: state.step,
                to: state.step,
            })?;
            Ok(state.with_step(to))
        }
        WorkflowMessage::JumpTo { step } => jump_back(state, step),
        WorkflowMessage::FixNow { field_path } => jump_back(state, step_for_path(&field_path)),
        WorkflowMessage::SetField { path, value } => {
            let mut record = resolver::set(&state.record, &path, value)?;
            record.mark_user_edited(&path);
            Ok(state.with_record(record))
        }
        WorkflowMessage::AddMedication { entry } => {
            let mut record = (*state.record).clone();
            record.medications.push(entry.unwrap_or_default());
            Ok(state.with_record(record))
        }
        WorkflowMessage::RemoveMedication { index } => {
            let mut record = (*state.record).clone();
            check_index("medications", index, record.medications.len())?;
            record.medications.remove(index);
            Ok(state.with_record(record))
        }
        WorkflowMessage::MoveMedication { from, to } => {
            let mut record = (*state.record).clone();
            move_item(&mut record.medications, "medications", from, to)?;
            Ok(state.with_record(record))
        }
        WorkflowMessage::AddRecommendation { entry } => {
            let mut record = (*state.record).clone();
            record.recommendations.push(entry.unwrap_or_default());
            Ok(state.with_record(record))
        }
        WorkflowMessage::RemoveRecommendation { index } => {
            let mut record = (*state.record).clone();
            check_index("recommendations", index, record.recommendations.len())?;
            record.recommendations.remove(index);
            Ok(state.with_record(record))
        }
        WorkflowMessage::MoveRecommendation { from, to } => {
            let mut record = (*state.record).clone();
            move_item(&mut record.recommendations, "recommendations", from, to)?;
            Ok(state.with_record(record))
        }
        WorkflowMessage::ReplaceRecord { record } => Ok(state.with_record(record)),
        WorkflowMessage::DiscardStepChanges => {
            if state.record == state.step_entry {
                return Ok(state.clone());
            }
            Ok(state.with_record((*state.step_entry).clone()))
        }
        WorkflowMessage::Finalize => {
            if state.step != ReviewStep::FinalReview {
                return Err(WorkflowError::NotAtFinalReview(state.step));
            }
            let blocking: Vec<_> = state
                .issues(ctx)
                .into_iter()
                .filter(ValidationIssue::is_blocking)
                .collect();
            if !blocking.is_empty() {
                return Err(WorkflowError::Blocked(blocking));
            }
            Ok(ReviewState {
                finalized: true,
                ..state.clone()
            })
        }
    }
}

/// Linear forward move. Leaving patient details requires them to be
/// free of blocking issues; later steps never block.
fn next(state: &ReviewState, ctx: &ValidationContext) -> Result<ReviewState, WorkflowError> {
    let to = state.step.next().ok_or(WorkflowError::InvalidTransition {
        from: state.step,
        to: state.step,
    })?;

    if state.step == ReviewStep::PatientInfo {
        let blocking: Vec<_> = state
            .issues(ctx)
            .into_iter()
            .filter(|i| i.is_blocking() && i.step == ReviewStep::PatientInfo)
            .collect();
        if !blocking.is_empty() {
            return Err(WorkflowError::Blocked(blocking));
        }
    }

    Ok(state.with_step(to))
}

fn jump_back(state: &ReviewState, to: ReviewStep) -> Result<ReviewState, WorkflowError> {
    if state.step != ReviewStep::FinalReview || to.position() >= state.step.position() {
        return Err(WorkflowError::InvalidTransition {
            from: state.step,
            to,
        });
    }
    Ok(state.with_step(to))
}

fn check_index(list: &str, index: usize, len: usize) -> Result<(), PathError> {
    if index < len {
        return Ok(());
    }
    Err(PathError::IndexOutOfRange {
        path: format!("{list}[{index}]"),
        index,
        len,
    })
}

fn move_item<T>(items: &mut Vec<T>, list: &str, from: usize, to: usize) -> Result<(), PathError> {
    check_index(list, from, items.len())?;
    check_index(list, to, items.len())?;
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{FieldOrigin, Priority};
    use serde_json::json;

    fn ctx() -> ValidationContext {
        ValidationContext::default()
    }

    fn send(state: &ReviewState, message: WorkflowMessage) -> ReviewState {
        apply(state, message, &ctx()).unwrap()
    }

    fn at(step: ReviewStep) -> ReviewState {
        let mut state = ReviewState::new("s1");
        let mut record = CanonicalRecord::default();
        record.patient.name = "Jane Doe".into();
        record.patient.date_of_birth = "1950-01-01".into();
        state.record = Arc::new(record);
        state.step_entry = state.record.clone();
        state.step = step;
        state
    }

    #[test]
    fn next_and_previous_walk_the_wizard_in_order() {
        let mut state = at(ReviewStep::Upload);
        for expected in &ReviewStep::ORDER[1..] {
            state = send(&state, WorkflowMessage::Next);
            assert_eq!(state.step, *expected);
        }
        assert!(matches!(
            apply(&state, WorkflowMessage::Next, &ctx()),
            Err(WorkflowError::InvalidTransition { .. })
        ));

        state = send(&state, WorkflowMessage::Previous);
        assert_eq!(state.step, ReviewStep::Recommendations);
    }

    #[test]
    fn previous_from_upload_is_rejected() {
        let state = ReviewState::new("s1");
        assert!(apply(&state, WorkflowMessage::Previous, &ctx()).is_err());
    }

    #[test]
    fn patient_step_blocks_on_missing_name() {
        let mut state = ReviewState::new("s1");
        state.step = ReviewStep::PatientInfo;
        match apply(&state, WorkflowMessage::Next, &ctx()) {
            Err(WorkflowError::Blocked(issues)) => {
                let paths: Vec<_> = issues.iter().map(|i| i.field_path.as_str()).collect();
                assert_eq!(paths, ["patient.name", "patient.date_of_birth"]);
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[test]
    fn later_steps_never_block() {
        let mut state = at(ReviewStep::MedicationsReview);
        state = send(&state, WorkflowMessage::AddMedication { entry: None });
        // Unnamed medication is a blocking issue, but only for finalizing.
        state = send(&state, WorkflowMessage::Next);
        state = send(&state, WorkflowMessage::Next);
        state = send(&state, WorkflowMessage::Next);
        assert_eq!(state.step, ReviewStep::FinalReview);
    }

    #[test]
    fn jumps_back_only_from_final_review() {
        let state = at(ReviewStep::FinalReview);
        let jumped = send(&state, WorkflowMessage::JumpTo { step: ReviewStep::PatientInfo });
        assert_eq!(jumped.step, ReviewStep::PatientInfo);

        let mid = at(ReviewStep::Interview);
        assert!(apply(&mid, WorkflowMessage::JumpTo { step: ReviewStep::PatientInfo }, &ctx()).is_err());
        assert!(apply(&state, WorkflowMessage::JumpTo { step: ReviewStep::FinalReview }, &ctx()).is_err());
    }

    #[test]
    fn fix_now_lands_on_the_owning_step() {
        let state = at(ReviewStep::FinalReview);
        let fixed = send(
            &state,
            WorkflowMessage::FixNow { field_path: "interview.interview_date".into() },
        );
        assert_eq!(fixed.step, ReviewStep::Interview);
        let fixed = send(
            &state,
            WorkflowMessage::FixNow { field_path: "medications[0].name".into() },
        );
        assert_eq!(fixed.step, ReviewStep::MedicationsReview);
    }

    #[test]
    fn set_field_produces_a_new_snapshot() {
        let state = at(ReviewStep::PatientInfo);
        let edited = send(
            &state,
            WorkflowMessage::SetField { path: "patient.phone".into(), value: json!("0400 000 000") },
        );
        assert_eq!(state.record.patient.phone, "");
        assert_eq!(edited.record.patient.phone, "0400 000 000");
        assert_eq!(edited.revision, state.revision + 1);
        assert_eq!(
            edited.record.provenance["patient.phone"].origin,
            FieldOrigin::UserEdited
        );
    }

    #[test]
    fn editing_a_flagged_medication_clears_the_flag() {
        let mut state = at(ReviewStep::MedicationsReview);
        state = send(
            &state,
            WorkflowMessage::AddMedication {
                entry: Some(MedicationEntry {
                    name: "Wafarin".into(),
                    confidence: 0.4,
                    origin: FieldOrigin::Extracted,
                    ..Default::default()
                }),
            },
        );
        assert_eq!(state.record.needs_review(), ["medications[0]"]);

        state = send(
            &state,
            WorkflowMessage::SetField { path: "medications[0].name".into(), value: json!("Warfarin") },
        );
        assert!(state.record.needs_review().is_empty());
        assert_eq!(state.record.medications[0].name, "Warfarin");
    }

    #[test]
    fn bad_writes_are_path_errors() {
        let state = at(ReviewStep::MedicationsReview);
        assert!(matches!(
            apply(
                &state,
                WorkflowMessage::SetField { path: "medications[0].name".into(), value: json!("X") },
                &ctx()
            ),
            Err(WorkflowError::Path(PathError::IndexOutOfRange { .. }))
        ));
        assert!(matches!(
            apply(&state, WorkflowMessage::RemoveMedication { index: 0 }, &ctx()),
            Err(WorkflowError::Path(_))
        ));
    }

    #[test]
    fn list_order_is_kept_and_movable() {
        let mut state = at(ReviewStep::Recommendations);
        for issue in ["first", "second", "third"] {
            state = send(
                &state,
                WorkflowMessage::AddRecommendation {
                    entry: Some(Recommendation {
                        issue: issue.into(),
                        priority: Priority::Low,
                        ..Default::default()
                    }),
                },
            );
        }
        state = send(&state, WorkflowMessage::MoveRecommendation { from: 2, to: 0 });
        let order: Vec<_> = state.record.recommendations.iter().map(|r| r.issue.as_str()).collect();
        assert_eq!(order, ["third", "first", "second"]);

        state = send(&state, WorkflowMessage::RemoveRecommendation { index: 1 });
        let order: Vec<_> = state.record.recommendations.iter().map(|r| r.issue.as_str()).collect();
        assert_eq!(order, ["third", "second"]);
    }

    #[test]
    fn discard_restores_record_from_step_entry() {
        let state = at(ReviewStep::PatientInfo);
        let entered = send(&state, WorkflowMessage::Next);
        let edited = send(&entered, WorkflowMessage::AddMedication { entry: None });
        let edited = send(&edited, WorkflowMessage::AddMedication { entry: None });
        assert_eq!(edited.record.medications.len(), 2);

        let discarded = send(&edited, WorkflowMessage::DiscardStepChanges);
        assert!(discarded.record.medications.is_empty());
        assert_eq!(discarded.step, ReviewStep::MedicationsReview);
        assert!(discarded.revision > edited.revision);
    }

    #[test]
    fn finalize_requires_final_step_and_no_blocking_issues() {
        let state = at(ReviewStep::Recommendations);
        assert!(matches!(
            apply(&state, WorkflowMessage::Finalize, &ctx()),
            Err(WorkflowError::NotAtFinalReview(ReviewStep::Recommendations))
        ));

        let state = at(ReviewStep::FinalReview);
        let done = send(&state, WorkflowMessage::Finalize);
        assert!(done.finalized);
        assert!(!done.has_unfinished_work());

        // Any later edit reopens the review.
        let reopened = send(
            &done,
            WorkflowMessage::SetField { path: "patient.gender".into(), value: json!("F") },
        );
        assert!(!reopened.finalized);

        let empty = {
            let mut s = ReviewState::new("s2");
            s.step = ReviewStep::FinalReview;
            s
        };
        assert!(matches!(
            apply(&empty, WorkflowMessage::Finalize, &ctx()),
            Err(WorkflowError::Blocked(_))
        ));
    }

    #[test]
    fn messages_deserialize_from_tagged_json() {
        let msg: WorkflowMessage = serde_json::from_value(json!({
            "type": "set_field",
            "path": "patient.name",
            "value": "Jane"
        }))
        .unwrap();
        assert_eq!(msg.name(), "set_field");

        let msg: WorkflowMessage =
            serde_json::from_value(json!({ "type": "jump_to", "step": "patient_info" })).unwrap();
        assert!(matches!(msg, WorkflowMessage::JumpTo { step: ReviewStep::PatientInfo }));

        let msg: WorkflowMessage =
            serde_json::from_value(json!({ "type": "add_medication" })).unwrap();
        assert!(matches!(msg, WorkflowMessage::AddMedication { entry: None }));
    }

    #[test]
    fn draft_round_trip_resumes_at_saved_step() {
        let state = send(&at(ReviewStep::PatientInfo), WorkflowMessage::Next);
        let resumed = ReviewState::from_draft(state.to_draft());
        assert_eq!(resumed.step, ReviewStep::MedicationsReview);
        assert_eq!(resumed.record, state.record);
        assert_eq!(resumed.revision, state.revision);
    }
}
