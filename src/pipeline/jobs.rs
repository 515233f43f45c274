//! Long-running extraction and rendering jobs.
//!
//! Work runs on the blocking pool; status is published on a `watch`
//! channel. Waiting with a timeout returns the status as it stands, so a
//! timed-out wait means "still running". A cancelled job keeps running to
//! completion but its result is dropped. Once a job has ended it is kept
//! for a retention window so clients can read the outcome, then dropped.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use super::extraction::ExtractionError;
use super::render::RenderError;

/// How long an ended job stays readable when nobody collects it.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running { progress: f32 },
    Succeeded,
    Failed { message: String, retryable: bool },
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running { .. })
    }
}

/// Errors a job can end with.
pub trait JobError: Display {
    fn retryable(&self) -> bool;
}

impl JobError for RenderError {
    fn retryable(&self) -> bool {
        self.is_retryable()
    }
}

/// Extraction failures surface immediately and are never retried.
impl JobError for ExtractionError {
    fn retryable(&self) -> bool {
        false
    }
}

/// Handed to the work closure for progress reports.
pub struct JobProgress {
    status: Arc<watch::Sender<JobStatus>>,
    cancelled: Arc<AtomicBool>,
}

impl JobProgress {
    pub fn report(&self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.status.send_if_modified(|status| match status {
            JobStatus::Running { progress } => {
                *progress = fraction;
                true
            }
            _ => false,
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct JobEntry<T> {
    status: Arc<watch::Sender<JobStatus>>,
    result: Arc<Mutex<Option<T>>>,
    cancelled: Arc<AtomicBool>,
    ended_at: Arc<OnceLock<Instant>>,
    /// Session that started the job.
    owner: String,
    /// Record revision the job was started from.
    revision: u64,
}

pub struct JobRegistry<T> {
    jobs: Mutex<HashMap<Uuid, JobEntry<T>>>,
    time_limit: Option<Duration>,
    retention: Duration,
}

/// Publish a terminal status unless the job already has one. The result
/// is stored under the channel's write lock, so a job cancelled first
/// never exposes it.
fn finish<T>(
    status: &watch::Sender<JobStatus>,
    slot: &Mutex<Option<T>>,
    ended_at: &OnceLock<Instant>,
    outcome: JobStatus,
    value: Option<T>,
) -> bool {
    status.send_if_modified(|current| {
        if current.is_terminal() {
            return false;
        }
        if let (Some(value), Ok(mut slot)) = (value, slot.lock()) {
            *slot = Some(value);
        }
        *current = outcome;
        let _ = ended_at.set(Instant::now());
        true
    })
}

impl<T: Send + 'static> JobRegistry<T> {
    pub fn new(time_limit: Option<Duration>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            time_limit,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Start `work` on the blocking pool. Must be called from a runtime.
    pub fn spawn<F, E>(&self, owner: &str, revision: u64, work: F) -> Uuid
    where
        F: FnOnce(&JobProgress) -> Result<T, E> + Send + 'static,
        E: JobError + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (tx, _rx) = watch::channel(JobStatus::Running { progress: 0.0 });
        let status = Arc::new(tx);
        let result = Arc::new(Mutex::new(None));
        let cancelled = Arc::new(AtomicBool::new(false));
        let ended_at = Arc::new(OnceLock::new());

        let progress = JobProgress {
            status: status.clone(),
            cancelled: cancelled.clone(),
        };
        let handle = tokio::task::spawn_blocking(move || work(&progress));

        let (sup_status, sup_result, sup_cancelled, sup_ended_at) =
            (status.clone(), result.clone(), cancelled.clone(), ended_at.clone());
        let time_limit = self.time_limit;
        tokio::spawn(async move {
            let outcome = match time_limit {
                Some(limit) => tokio::time::timeout(limit, handle).await.ok(),
                None => Some(handle.await),
            };
            if sup_cancelled.load(Ordering::SeqCst) {
                tracing::debug!(job_id = %id, "Discarding result of cancelled job");
                return;
            }
            let (final_status, value) = match outcome {
                None => {
                    sup_cancelled.store(true, Ordering::SeqCst);
                    tracing::warn!(job_id = %id, "Job exceeded its time limit");
                    let message = format!(
                        "timed out after {} seconds",
                        time_limit.map(|d| d.as_secs()).unwrap_or_default()
                    );
                    (JobStatus::Failed { message, retryable: true }, None)
                }
                Some(Err(join_error)) => {
                    tracing::error!(job_id = %id, error = %join_error, "Job task failed");
                    let message = join_error.to_string();
                    (JobStatus::Failed { message, retryable: true }, None)
                }
                Some(Ok(Err(e))) => {
                    tracing::warn!(job_id = %id, error = %e, "Job failed");
                    let failed = JobStatus::Failed {
                        message: e.to_string(),
                        retryable: e.retryable(),
                    };
                    (failed, None)
                }
                Some(Ok(Ok(value))) => (JobStatus::Succeeded, Some(value)),
            };
            if !finish(&sup_status, &sup_result, &sup_ended_at, final_status, value) {
                tracing::debug!(job_id = %id, "Job ended after cancellation, result dropped");
            }
        });

        if let Ok(mut jobs) = self.jobs.lock() {
            let retention = self.retention;
            let before = jobs.len();
            jobs.retain(|_, entry| {
                entry
                    .ended_at
                    .get()
                    .map_or(true, |ended| ended.elapsed() < retention)
            });
            let expired = before - jobs.len();
            if expired > 0 {
                tracing::debug!(expired, "Dropped ended jobs past retention");
            }
            jobs.insert(
                id,
                JobEntry {
                    status,
                    result,
                    cancelled,
                    ended_at,
                    owner: owner.to_string(),
                    revision,
                },
            );
        }
        tracing::info!(job_id = %id, session_id = owner, revision, "Job started");
        id
    }

    /// Whether `id` exists and was started by `owner`.
    pub fn is_owned_by(&self, id: &Uuid, owner: &str) -> bool {
        let Ok(jobs) = self.jobs.lock() else {
            return false;
        };
        jobs.get(id).is_some_and(|entry| entry.owner == owner)
    }

    fn receiver(&self, id: &Uuid) -> Option<watch::Receiver<JobStatus>> {
        let jobs = self.jobs.lock().ok()?;
        jobs.get(id).map(|entry| entry.status.subscribe())
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.receiver(id).map(|rx| rx.borrow().clone())
    }

    pub fn revision(&self, id: &Uuid) -> Option<u64> {
        let jobs = self.jobs.lock().ok()?;
        jobs.get(id).map(|entry| entry.revision)
    }

    /// Wait until the job ends or `timeout` elapses, then report its status.
    pub async fn wait(&self, id: &Uuid, timeout: Duration) -> Option<JobStatus> {
        let mut rx = self.receiver(id)?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if rx.borrow().is_terminal() {
                break;
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                _ => break,
            }
        }
        let status = rx.borrow().clone();
        Some(status)
    }

    /// Mark the job cancelled. Returns false when it had already ended.
    pub fn cancel(&self, id: &Uuid) -> bool {
        let Ok(jobs) = self.jobs.lock() else {
            return false;
        };
        let Some(entry) = jobs.get(id) else {
            return false;
        };
        if entry.status.borrow().is_terminal() {
            return false;
        }
        entry.cancelled.store(true, Ordering::SeqCst);
        let cancelled = finish(
            &entry.status,
            &entry.result,
            &entry.ended_at,
            JobStatus::Cancelled,
            None,
        );
        if cancelled {
            tracing::info!(job_id = %id, "Job cancelled");
        }
        cancelled
    }

    /// Remove a finished job and hand over its result, if it succeeded.
    pub fn take_result(&self, id: &Uuid) -> Option<T> {
        let mut jobs = self.jobs.lock().ok()?;
        if !matches!(*jobs.get(id)?.status.borrow(), JobStatus::Succeeded) {
            return None;
        }
        let entry = jobs.remove(id)?;
        let mut slot = entry.result.lock().ok()?;
        slot.take()
    }
}
