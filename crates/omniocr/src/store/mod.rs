//! Job persistence.
//!
//! A [`JobStore`] owns job records and their logs. Every status change is
//! written together with its log entry, and only if the job still has the
//! status the caller read; callers never observe one without the other.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::job::{Job, JobSnapshot, JobStatus, LogEntry, StatusCounts};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

/// A status change to apply with compare-and-set semantics.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub job_id: String,
    /// Status the job must still have for the change to apply.
    pub from: JobStatus,
    pub to: JobStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub(crate) fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.to.is_terminal().then_some(self.at)
    }
}

/// Storage for jobs and their append-only logs.
pub trait JobStore: Send + Sync {
    /// Stores a new job together with its first log entry.
    fn insert(&self, job: &Job, log: &LogEntry) -> Result<LogEntry, StoreError>;

    fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Jobs newest first, optionally restricted to one owner.
    fn list(&self, owner_id: Option<&str>) -> Result<Vec<Job>, StoreError>;

    /// Jobs in the given status, oldest first.
    fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

    /// Applies `change` and appends `log` atomically.
    ///
    /// Fails with [`StoreError::StatusConflict`] when the job is no longer
    /// in `change.from`; nothing is written in that case.
    fn apply_change(
        &self,
        change: &StatusChange,
        log: &LogEntry,
    ) -> Result<(Job, LogEntry), StoreError>;

    /// Appends a log entry, returning it as stored.
    fn append_log(&self, log: &LogEntry) -> Result<LogEntry, StoreError>;

    /// Logs of a job in append order.
    fn logs(&self, job_id: &str) -> Result<Vec<LogEntry>, StoreError>;

    /// Reads a job and its logs as of the same instant.
    fn snapshot(&self, job_id: &str) -> Result<Option<JobSnapshot>, StoreError>;

    fn count_by_status(&self) -> Result<StatusCounts, StoreError>;

    /// Removes a job and its logs. Returns false if there was no such job.
    fn delete(&self, job_id: &str) -> Result<bool, StoreError>;
}

/// Returns `log` with its timestamp moved forward so it is not earlier
/// than the latest entry already stored for the job.
pub(crate) fn clamp_log(log: &LogEntry, latest: Option<DateTime<Utc>>) -> LogEntry {
    let mut stored = log.clone();
    if let Some(latest) = latest {
        if stored.created_at < latest {
            stored.created_at = latest;
        }
    }
    stored
}
