//! Live review sessions.
//!
//! A `ReviewSession` holds the current snapshot and writes a draft after
//! every accepted message. A failed write leaves the session dirty so the
//! autosave timer retries it. The registry drops finalized and idle
//! sessions once their draft is safely written; they resume from it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::machine::{self, ReviewState, WorkflowMessage};
use super::WorkflowError;
use crate::db::DraftStore;
use crate::models::enums::ReviewStep;
use crate::pipeline::extraction::NormalizedExtraction;
use crate::pipeline::validation::{ValidationContext, ValidationIssue};

pub struct ReviewSession {
    session_id: String,
    state: RwLock<Arc<ReviewState>>,
    store: Arc<dyn DraftStore>,
    ctx: ValidationContext,
    dirty: AtomicBool,
    last_used: Mutex<Instant>,
}

impl ReviewSession {
    /// Resume from the stored draft, or start at Upload when there is none.
    pub fn open(
        session_id: &str,
        store: Arc<dyn DraftStore>,
        ctx: ValidationContext,
    ) -> Result<Self, WorkflowError> {
        let state = match store.get_draft(session_id)? {
            Some(draft) => {
                tracing::info!(
                    session_id,
                    step = %draft.step,
                    revision = draft.revision,
                    "Resuming review from draft"
                );
                ReviewState::from_draft(draft)
            }
            None => {
                tracing::info!(session_id, "Starting new review");
                ReviewState::new(session_id)
            }
        };

        Ok(Self {
            session_id: session_id.to_string(),
            state: RwLock::new(Arc::new(state)),
            store,
            ctx,
            dirty: AtomicBool::new(false),
            last_used: Mutex::new(Instant::now()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn validation_context(&self) -> &ValidationContext {
        &self.ctx
    }

    pub fn snapshot(&self) -> Result<Arc<ReviewState>, WorkflowError> {
        let guard = self.state.read().map_err(|_| WorkflowError::LockPoisoned)?;
        Ok(guard.clone())
    }

    /// Issues are recomputed from the record on every read.
    pub fn issues(&self) -> Result<Vec<ValidationIssue>, WorkflowError> {
        Ok(self.snapshot()?.issues(&self.ctx))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_used.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    pub fn dispatch(&self, message: WorkflowMessage) -> Result<Arc<ReviewState>, WorkflowError> {
        let name = message.name();
        let mut guard = self.state.write().map_err(|_| WorkflowError::LockPoisoned)?;
        let next = match machine::apply(&guard, message, &self.ctx) {
            Ok(next) => Arc::new(next),
            Err(e) => {
                tracing::debug!(session_id = %self.session_id, message = name, error = %e, "Message rejected");
                return Err(e);
            }
        };
        *guard = next.clone();
        self.persist(&next);
        drop(guard);

        tracing::debug!(
            session_id = %self.session_id,
            message = name,
            step = %next.step,
            revision = next.revision,
            "Message applied"
        );
        Ok(next)
    }

    /// Start over at Upload. Unfinished work is only dropped when `confirmed`.
    pub fn start_new(&self, confirmed: bool) -> Result<Arc<ReviewState>, WorkflowError> {
        let mut guard = self.state.write().map_err(|_| WorkflowError::LockPoisoned)?;
        if guard.has_unfinished_work() && !confirmed {
            return Err(WorkflowError::ConfirmationRequired);
        }

        let mut fresh = ReviewState::new(&self.session_id);
        // Keep revisions increasing so results from the old review read as stale.
        fresh.revision = guard.revision + 1;
        let fresh = Arc::new(fresh);
        *guard = fresh.clone();
        self.persist(&fresh);

        tracing::info!(session_id = %self.session_id, "Review restarted");
        Ok(fresh)
    }

    /// Adopt an extraction result computed from revision `started_at`.
    /// Results that arrive after the record changed are refused.
    pub fn apply_extraction(
        &self,
        started_at: u64,
        extraction: NormalizedExtraction,
    ) -> Result<Arc<ReviewState>, WorkflowError> {
        let mut guard = self.state.write().map_err(|_| WorkflowError::LockPoisoned)?;
        if guard.revision != started_at {
            tracing::warn!(
                session_id = %self.session_id,
                started_at,
                current = guard.revision,
                "Discarding stale extraction result"
            );
            return Err(WorkflowError::StaleResult {
                started_at,
                current: guard.revision,
            });
        }

        let mut next = machine::apply(
            &guard,
            WorkflowMessage::ReplaceRecord {
                record: extraction.record,
            },
            &self.ctx,
        )?;
        if next.step == ReviewStep::Upload {
            next = machine::apply(&next, WorkflowMessage::Next, &self.ctx)?;
        }
        let next = Arc::new(next);
        *guard = next.clone();
        self.persist(&next);

        tracing::info!(
            session_id = %self.session_id,
            revision = next.revision,
            medications = next.record.medications.len(),
            "Extraction applied"
        );
        Ok(next)
    }

    /// Write the draft if an earlier write failed. Returns whether it wrote.
    ///
    /// Holds the state lock across the write so a concurrent `dispatch`
    /// cannot persist a newer draft that this one then overwrites.
    pub fn flush(&self) -> Result<bool, WorkflowError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        let guard = self.state.read().map_err(|_| WorkflowError::LockPoisoned)?;
        if !self.is_dirty() {
            return Ok(false);
        }
        self.store.put_draft(&guard.to_draft())?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(true)
    }

    fn persist(&self, state: &ReviewState) {
        match self.store.put_draft(&state.to_draft()) {
            Ok(()) => self.dirty.store(false, Ordering::SeqCst),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Autosave failed, will retry");
                self.dirty.store(true, Ordering::SeqCst);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// SessionRegistry
// ═══════════════════════════════════════════════════════════

/// Default time a clean session may sit unused before it is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Open sessions keyed by session id.
pub struct SessionRegistry {
    store: Arc<dyn DraftStore>,
    ctx: ValidationContext,
    sessions: RwLock<HashMap<String, Arc<ReviewSession>>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DraftStore>, ctx: ValidationContext) -> Self {
        Self {
            store,
            ctx,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// The live session, resuming it from its draft on first use.
    pub fn open(&self, session_id: &str) -> Result<Arc<ReviewSession>, WorkflowError> {
        if let Some(session) = self.get(session_id)? {
            session.touch();
            return Ok(session);
        }

        let mut sessions = self.sessions.write().map_err(|_| WorkflowError::LockPoisoned)?;
        if let Some(session) = sessions.get(session_id) {
            session.touch();
            return Ok(session.clone());
        }
        let session = Arc::new(ReviewSession::open(
            session_id,
            self.store.clone(),
            self.ctx.clone(),
        )?);
        sessions.insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Arc<ReviewSession>>, WorkflowError> {
        let sessions = self.sessions.read().map_err(|_| WorkflowError::LockPoisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    /// Retry pending draft writes. Returns how many were written.
    pub fn flush_all(&self) -> usize {
        let sessions: Vec<Arc<ReviewSession>> = match self.sessions.read() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(_) => return 0,
        };

        let mut written = 0;
        for session in sessions {
            match session.flush() {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    session_id = %session.session_id(),
                    error = %e,
                    "Autosave retry failed"
                ),
            }
        }
        written
    }

    /// Drop sessions that are finalized or idle, provided their draft is
    /// written and no request still holds them. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        let Ok(mut sessions) = self.sessions.write() else {
            return 0;
        };
        let before = sessions.len();
        let idle_timeout = self.idle_timeout;
        sessions.retain(|session_id, session| {
            if Arc::strong_count(session) > 1 || session.is_dirty() {
                return true;
            }
            let finalized = session.snapshot().map(|s| s.finalized).unwrap_or(false);
            let idle = session.idle_for() >= idle_timeout;
            if finalized || idle {
                tracing::debug!(session_id = %session_id, finalized, "Session dropped from memory");
                return false;
            }
            true
        });
        before - sessions.len()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FlakyStore;
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::CanonicalRecord;
    use serde_json::json;

    fn sqlite() -> Arc<dyn DraftStore> {
        Arc::new(SqliteStore::in_memory().unwrap())
    }

    fn extraction(name: &str) -> NormalizedExtraction {
        let mut record = CanonicalRecord::default();
        record.patient.name = name.into();
        record.patient.date_of_birth = "1950-01-01".into();
        NormalizedExtraction {
            record,
            raw_text: "referral".into(),
        }
    }

    #[test]
    fn every_message_is_saved_and_resumable() {
        let store = sqlite();
        let session = ReviewSession::open("s1", store.clone(), ValidationContext::default()).unwrap();
        session.dispatch(WorkflowMessage::Next).unwrap();
        session
            .dispatch(WorkflowMessage::SetField {
                path: "patient.name".into(),
                value: json!("Jane Doe"),
            })
            .unwrap();

        let draft = store.get_draft("s1").unwrap().unwrap();
        assert_eq!(draft.step, ReviewStep::PatientInfo);
        assert_eq!(draft.record.patient.name, "Jane Doe");

        let resumed = ReviewSession::open("s1", store, ValidationContext::default()).unwrap();
        let state = resumed.snapshot().unwrap();
        assert_eq!(state.step, ReviewStep::PatientInfo);
        assert_eq!(state.record.patient.name, "Jane Doe");
        assert_eq!(state.revision, 1);
    }

    #[test]
    fn rejected_message_leaves_state_alone() {
        let session = ReviewSession::open("s1", sqlite(), ValidationContext::default()).unwrap();
        session.dispatch(WorkflowMessage::Next).unwrap();
        let before = session.snapshot().unwrap();
        assert!(matches!(
            session.dispatch(WorkflowMessage::Next),
            Err(WorkflowError::Blocked(_))
        ));
        assert!(Arc::ptr_eq(&before, &session.snapshot().unwrap()));
    }

    #[test]
    fn start_new_needs_confirmation_for_unfinished_work() {
        let store = sqlite();
        let session = ReviewSession::open("s1", store.clone(), ValidationContext::default()).unwrap();
        // Nothing entered yet: no confirmation needed.
        session.start_new(false).unwrap();

        session.apply_extraction(1, extraction("Jane Doe")).unwrap();
        assert!(matches!(
            session.start_new(false),
            Err(WorkflowError::ConfirmationRequired)
        ));
        assert_eq!(session.snapshot().unwrap().record.patient.name, "Jane Doe");

        let fresh = session.start_new(true).unwrap();
        assert_eq!(fresh.step, ReviewStep::Upload);
        assert!(fresh.record.is_empty());
        assert!(store.get_draft("s1").unwrap().unwrap().record.is_empty());
    }

    #[test]
    fn extraction_moves_to_patient_step() {
        let session = ReviewSession::open("s1", sqlite(), ValidationContext::default()).unwrap();
        let state = session.apply_extraction(0, extraction("Jane Doe")).unwrap();
        assert_eq!(state.step, ReviewStep::PatientInfo);
        assert_eq!(state.record.patient.name, "Jane Doe");
        assert_eq!(state.revision, 1);
    }

    #[test]
    fn extraction_after_an_edit_is_stale() {
        let session = ReviewSession::open("s1", sqlite(), ValidationContext::default()).unwrap();
        session
            .dispatch(WorkflowMessage::SetField {
                path: "patient.name".into(),
                value: json!("Typed by hand"),
            })
            .unwrap();

        assert!(matches!(
            session.apply_extraction(0, extraction("From OCR")),
            Err(WorkflowError::StaleResult { started_at: 0, current: 1 })
        ));
        assert_eq!(session.snapshot().unwrap().record.patient.name, "Typed by hand");
    }

    #[test]
    fn failed_autosave_is_retried_by_flush() {
        let store = Arc::new(FlakyStore::new());
        let session =
            ReviewSession::open("s1", store.clone(), ValidationContext::default()).unwrap();

        store.set_failing(true);
        session.dispatch(WorkflowMessage::Next).unwrap();
        assert!(session.is_dirty());
        assert!(store.get_draft("s1").unwrap().is_none());
        assert!(session.flush().is_err());

        store.set_failing(false);
        assert!(session.flush().unwrap());
        assert!(!session.is_dirty());
        assert!(!session.flush().unwrap());
        assert_eq!(store.get_draft("s1").unwrap().unwrap().step, ReviewStep::PatientInfo);
    }

    #[test]
    fn registry_reuses_live_sessions() {
        let registry = SessionRegistry::new(sqlite(), ValidationContext::default());
        let a = registry.open("s1").unwrap();
        let b = registry.open("s1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.get("s2").unwrap().is_none());
    }

    #[test]
    fn registry_flush_counts_written_drafts() {
        let store = Arc::new(FlakyStore::new());
        let registry = SessionRegistry::new(store.clone(), ValidationContext::default());
        let session = registry.open("s1").unwrap();
        registry.open("s2").unwrap();

        store.set_failing(true);
        session.dispatch(WorkflowMessage::Next).unwrap();
        assert_eq!(registry.flush_all(), 0);

        store.set_failing(false);
        assert_eq!(registry.flush_all(), 1);
        assert_eq!(registry.flush_all(), 0);
    }

    #[test]
    fn flush_never_writes_over_a_newer_draft() {
        let store = Arc::new(FlakyStore::new());
        let session =
            ReviewSession::open("s1", store.clone(), ValidationContext::default()).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200 {
                    store.set_failing(i % 2 == 0);
                    session
                        .dispatch(WorkflowMessage::SetField {
                            path: "patient.name".into(),
                            value: json!(format!("Name {i}")),
                        })
                        .unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..400 {
                    let _ = session.flush();
                }
            });
        });

        store.set_failing(false);
        session.flush().unwrap();
        let latest = session.snapshot().unwrap();
        let draft = store.get_draft("s1").unwrap().unwrap();
        assert_eq!(draft.revision, latest.revision);
        assert_eq!(draft.record.patient.name, "Name 199");
        assert!(!session.is_dirty());
    }

    #[test]
    fn finalized_sessions_are_dropped_and_resume_from_draft() {
        let store = sqlite();
        let registry = SessionRegistry::new(store.clone(), ValidationContext::default());
        let session = registry.open("s1").unwrap();
        session.apply_extraction(0, extraction("Jane Doe")).unwrap();
        for _ in 0..4 {
            session.dispatch(WorkflowMessage::Next).unwrap();
        }
        session.dispatch(WorkflowMessage::Finalize).unwrap();

        // Still held by a caller.
        assert_eq!(registry.evict_idle(), 0);
        drop(session);
        assert_eq!(registry.evict_idle(), 1);
        assert!(registry.get("s1").unwrap().is_none());

        let resumed = registry.open("s1").unwrap().snapshot().unwrap();
        assert!(resumed.finalized);
        assert_eq!(resumed.step, ReviewStep::FinalReview);
        assert_eq!(resumed.record.patient.name, "Jane Doe");
    }

    #[test]
    fn idle_sessions_are_dropped_unless_dirty_or_in_use() {
        let store = Arc::new(FlakyStore::new());
        let registry = SessionRegistry::new(store.clone(), ValidationContext::default())
            .with_idle_timeout(Duration::ZERO);

        registry.open("idle").unwrap();
        let in_use = registry.open("in-use").unwrap();
        let dirty = registry.open("dirty").unwrap();
        store.set_failing(true);
        dirty.dispatch(WorkflowMessage::Next).unwrap();
        store.set_failing(false);
        drop(dirty);

        assert_eq!(registry.evict_idle(), 1);
        assert!(registry.get("idle").unwrap().is_none());
        assert!(registry.get("in-use").unwrap().is_some());
        assert!(registry.get("dirty").unwrap().is_some());

        assert_eq!(registry.flush_all(), 1);
        drop(in_use);
        assert_eq!(registry.evict_idle(), 2);
    }

    #[test]
    fn recently_used_sessions_are_kept() {
        let registry = SessionRegistry::new(sqlite(), ValidationContext::default());
        registry.open("s1").unwrap();
        assert_eq!(registry.evict_idle(), 0);
        assert!(registry.get("s1").unwrap().is_some());
    }
}
