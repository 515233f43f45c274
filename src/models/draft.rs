use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ReviewStep;
use super::CanonicalRecord;

/// A saved review: the record, where the reviewer was, and whether the
/// review has been finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDraft {
    pub session_id: String,
    pub record: CanonicalRecord,
    pub step: ReviewStep,
    pub revision: u64,
    pub finalized: bool,
    pub updated_at: DateTime<Utc>,
}
