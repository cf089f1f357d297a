//! Job lifecycle state machine.
//!
//! The [`LifecycleManager`] is the only writer of job status. Every change
//! is checked against the transition table under a per-job lock, then
//! committed by the store with a compare-and-set on the status it read, so
//! two racing writers (say, a late engine result and a user cancel) cannot
//! both win.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::error::{JobError, StoreError};
use crate::job::{
    is_legal, queued_message, Job, JobSnapshot, JobStatus, LogEntry, LogLevel, StatusCounts,
    Submission, Transition, GUEST_OWNER_ID,
};
use crate::sanitize;
use crate::store::{JobStore, StatusChange};

/// Reason recorded for jobs found PROCESSING at startup.
pub const INTERRUPTED_REASON: &str = "interrupted before completion";

/// Content type of the downloadable result.
pub const RESULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Extracted text of a completed job, ready for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub text: String,
}

pub struct LifecycleManager {
    store: Arc<dyn JobStore>,
    events: JobEventBroadcaster,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    max_file_size_bytes: u64,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        events: JobEventBroadcaster,
        max_file_size_bytes: u64,
    ) -> Self {
        Self {
            store,
            events,
            locks: Mutex::new(HashMap::new()),
            max_file_size_bytes,
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// Validates a submission and stores it as a QUEUED job.
    ///
    /// An absent or blank `owner_id` records the guest owner.
    pub fn create(&self, submission: &Submission, owner_id: Option<&str>) -> Result<Job, JobError> {
        let file_name = submission.file_name.trim();
        if file_name.is_empty() {
            return Err(JobError::validation("file name must not be empty"));
        }
        if submission.file_bytes.is_empty() {
            return Err(JobError::validation(format!("file '{}' is empty", file_name)));
        }
        let size = submission.file_bytes.len() as u64;
        if size > self.max_file_size_bytes {
            return Err(JobError::validation(format!(
                "file '{}' is {} bytes, limit is {} bytes",
                file_name, size, self.max_file_size_bytes
            )));
        }
        let mime_type = submission.effective_mime_type();
        if mime_type.is_empty() {
            return Err(JobError::validation(format!(
                "MIME type of '{}' is missing and could not be inferred",
                file_name
            )));
        }

        let owner = owner_id
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(GUEST_OWNER_ID);

        let job = Job::queued(owner, file_name, size, &mime_type, submission.engine);
        let log = LogEntry::new(&job.id, LogLevel::Info, queued_message(job.engine));
        let log = self.store.insert(&job, &log)?;

        log::info!(
            "Job {} queued ({} bytes, {}, engine {})",
            job.id,
            size,
            mime_type,
            job.engine
        );
        self.events.send(JobEvent {
            job: job.clone(),
            log,
        });
        Ok(job)
    }

    /// Applies a transition if the table allows it from the job's current status.
    ///
    /// Illegal requests fail with [`JobError::IllegalTransition`] and change
    /// nothing, including the log.
    pub fn transition(&self, job_id: &str, transition: Transition) -> Result<Job, JobError> {
        let lock = self.job_lock(job_id);
        let outcome = {
            let _guard = lock_ignoring_poison(lock.as_ref());
            self.transition_locked(job_id, &transition)
        };

        // Settled jobs accept no further transitions, so their lock can go.
        let settled = match &outcome {
            Ok(job) => job.status.is_terminal(),
            Err(JobError::NotFound { .. }) => true,
            Err(JobError::IllegalTransition { from, .. }) => from.is_terminal(),
            Err(_) => false,
        };
        if settled {
            self.forget_lock(job_id);
        }
        outcome
    }

    fn transition_locked(&self, job_id: &str, transition: &Transition) -> Result<Job, JobError> {
        let to = transition.target();
        let current = self
            .store
            .get(job_id)?
            .ok_or_else(|| JobError::not_found(job_id))?;

        if !is_legal(current.status, to) {
            log::debug!(
                "Rejected transition {} -> {} for job {}",
                current.status,
                to,
                job_id
            );
            return Err(JobError::IllegalTransition {
                job_id: job_id.to_string(),
                from: current.status,
                to,
            });
        }
        if let Transition::Complete { text } = transition {
            if text.trim().is_empty() {
                return Err(JobError::validation("completion requires non-empty text"));
            }
        }

        let change = StatusChange {
            job_id: job_id.to_string(),
            from: current.status,
            to,
            result: transition.result().map(str::to_string),
            error: transition.error().map(str::to_string),
            at: Utc::now(),
        };
        let log = LogEntry::new(job_id, transition.log_level(), transition.log_message());

        let (job, log) = match self.store.apply_change(&change, &log) {
            Ok(committed) => committed,
            Err(StoreError::StatusConflict { actual, .. }) => {
                return Err(JobError::IllegalTransition {
                    job_id: job_id.to_string(),
                    from: actual,
                    to,
                });
            }
            Err(e) => return Err(e.into()),
        };

        log::info!("Job {} {} -> {}", job_id, current.status, job.status);
        self.events.send(JobEvent {
            job: job.clone(),
            log,
        });
        Ok(job)
    }

    /// Cancels a QUEUED or PROCESSING job.
    pub fn cancel(&self, job_id: &str) -> Result<Job, JobError> {
        self.transition(job_id, Transition::Cancel)
    }

    pub fn get(&self, job_id: &str) -> Result<Job, JobError> {
        self.store
            .get(job_id)?
            .ok_or_else(|| JobError::not_found(job_id))
    }

    /// Jobs newest first, optionally for one owner.
    pub fn list(&self, owner_id: Option<&str>) -> Result<Vec<Job>, JobError> {
        Ok(self.store.list(owner_id)?)
    }

    pub fn logs(&self, job_id: &str) -> Result<Vec<LogEntry>, JobError> {
        Ok(self.store.logs(job_id)?)
    }

    /// Appends a free-form log entry without changing status.
    pub fn append_log(
        &self,
        job_id: &str,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Result<LogEntry, JobError> {
        let log = self
            .store
            .append_log(&LogEntry::new(job_id, level, message))?;
        if let Some(job) = self.store.get(job_id)? {
            self.events.send(JobEvent {
                job,
                log: log.clone(),
            });
        }
        Ok(log)
    }

    /// Job and logs read together.
    pub fn snapshot(&self, job_id: &str) -> Result<JobSnapshot, JobError> {
        self.store
            .snapshot(job_id)?
            .ok_or_else(|| JobError::not_found(job_id))
    }

    /// The text artifact of a COMPLETED job, or `None` while it is not available.
    pub fn result(&self, job_id: &str) -> Result<Option<ResultArtifact>, JobError> {
        let job = self.get(job_id)?;
        if job.status != JobStatus::Completed {
            return Ok(None);
        }
        Ok(job.result.map(|text| ResultArtifact {
            file_name: sanitize::result_file_name(&job.file_name),
            content_type: RESULT_CONTENT_TYPE,
            text,
        }))
    }

    pub fn counts(&self) -> Result<StatusCounts, JobError> {
        Ok(self.store.count_by_status()?)
    }

    /// Removes a terminal job and its logs.
    pub fn delete(&self, job_id: &str) -> Result<(), JobError> {
        let lock = self.job_lock(job_id);
        let outcome = {
            let _guard = lock_ignoring_poison(lock.as_ref());
            self.delete_locked(job_id)
        };
        if matches!(outcome, Ok(()) | Err(JobError::NotFound { .. })) {
            self.forget_lock(job_id);
        }
        outcome
    }

    fn delete_locked(&self, job_id: &str) -> Result<(), JobError> {
        let job = self.get(job_id)?;
        if !job.status.is_terminal() {
            return Err(JobError::StillActive {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        if !self.store.delete(job_id)? {
            return Err(JobError::not_found(job_id));
        }
        log::info!("Job {} deleted", job_id);
        Ok(())
    }

    /// Fails jobs that a previous process left in PROCESSING.
    ///
    /// Nothing is running for them any more, so they would otherwise stay
    /// PROCESSING forever. Returns the jobs that were failed.
    pub fn recover_interrupted(&self) -> Result<Vec<Job>, JobError> {
        let stuck = self.store.find_by_status(JobStatus::Processing)?;
        let mut recovered = Vec::with_capacity(stuck.len());
        for job in stuck {
            match self.transition(&job.id, Transition::fail(INTERRUPTED_REASON)) {
                Ok(job) => recovered.push(job),
                Err(JobError::IllegalTransition { .. }) | Err(JobError::NotFound { .. }) => {
                    log::debug!("Job {} changed during recovery, skipping", job.id);
                }
                Err(e) => return Err(e),
            }
        }
        if !recovered.is_empty() {
            log::warn!(
                "Marked {} interrupted job(s) as failed",
                recovered.len()
            );
        }
        Ok(recovered)
    }

    /// Receives every job event committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        lock_ignoring_poison(&self.locks)
    }

    fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks().entry(job_id.to_string()).or_default())
    }

    fn forget_lock(&self, job_id: &str) {
        self.locks().remove(job_id);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks().len()
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("Lifecycle lock was poisoned, recovering");
        poisoned.into_inner()
    })
}
