//! Review wizard: state machine, sessions, draft autosave.

pub mod autosave;
pub mod machine;
pub mod session;

pub use autosave::*;
pub use machine::*;
pub use session::*;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::enums::ReviewStep;
use crate::pipeline::path::PathError;
use crate::pipeline::validation::ValidationIssue;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: ReviewStep, to: ReviewStep },

    #[error("Step has {} blocking issue(s)", .0.len())]
    Blocked(Vec<ValidationIssue>),

    #[error("Only the final review can be finalized (current step: {0})")]
    NotAtFinalReview(ReviewStep),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Unfinished review would be discarded; confirm to start a new one")]
    ConfirmationRequired,

    #[error("Result computed from revision {started_at}, record is now at {current}")]
    StaleResult { started_at: u64, current: u64 },

    #[error("Draft storage failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Session lock poisoned")]
    LockPoisoned,
}
