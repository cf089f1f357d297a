//! In-memory job store.
//!
//! All state sits behind one `RwLock`, so a status change and its log entry
//! become visible to readers at the same time.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::job::{Job, JobSnapshot, JobStatus, LogEntry, StatusCounts};

use super::{clamp_log, JobStore, StatusChange};

#[derive(Default)]
struct State {
    jobs: HashMap<String, Job>,
    /// Job ids in insertion order.
    order: Vec<String>,
    logs: HashMap<String, Vec<LogEntry>>,
}

impl State {
    fn latest_log_at(&self, job_id: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.logs
            .get(job_id)
            .and_then(|logs| logs.last())
            .map(|l| l.created_at)
    }

    fn push_log(&mut self, log: &LogEntry) -> LogEntry {
        let stored = clamp_log(log, self.latest_log_at(&log.job_id));
        self.logs
            .entry(log.job_id.clone())
            .or_default()
            .push(stored.clone());
        stored
    }
}

/// Job store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryJobStore {
    state: RwLock<State>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| {
            log::warn!("Job store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| {
            log::warn!("Job store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: &Job, log: &LogEntry) -> Result<LogEntry, StoreError> {
        let mut state = self.write();
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::DuplicateJob {
                job_id: job.id.clone(),
            });
        }
        state.jobs.insert(job.id.clone(), job.clone());
        state.order.push(job.id.clone());
        Ok(state.push_log(log))
    }

    fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.read().jobs.get(job_id).cloned())
    }

    fn list(&self, owner_id: Option<&str>) -> Result<Vec<Job>, StoreError> {
        let state = self.read();
        let jobs = state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| owner_id.map_or(true, |owner| job.owner_id == owner))
            .cloned()
            .collect();
        Ok(jobs)
    }

    fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let state = self.read();
        let jobs = state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        Ok(jobs)
    }

    fn apply_change(
        &self,
        change: &StatusChange,
        log: &LogEntry,
    ) -> Result<(Job, LogEntry), StoreError> {
        let mut state = self.write();
        let job = state
            .jobs
            .get_mut(&change.job_id)
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: change.job_id.clone(),
            })?;

        if job.status != change.from {
            return Err(StoreError::StatusConflict {
                job_id: change.job_id.clone(),
                expected: change.from,
                actual: job.status,
            });
        }

        job.status = change.to;
        job.result = change.result.clone();
        job.error = change.error.clone();
        job.updated_at = change.at;
        job.finished_at = change.finished_at();
        let updated = job.clone();

        let stored = state.push_log(log);
        Ok((updated, stored))
    }

    fn append_log(&self, log: &LogEntry) -> Result<LogEntry, StoreError> {
        let mut state = self.write();
        if !state.jobs.contains_key(&log.job_id) {
            return Err(StoreError::JobNotFound {
                job_id: log.job_id.clone(),
            });
        }
        Ok(state.push_log(log))
    }

    fn logs(&self, job_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let state = self.read();
        if !state.jobs.contains_key(job_id) {
            return Err(StoreError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }
        Ok(state.logs.get(job_id).cloned().unwrap_or_default())
    }

    fn snapshot(&self, job_id: &str) -> Result<Option<JobSnapshot>, StoreError> {
        let state = self.read();
        Ok(state.jobs.get(job_id).map(|job| JobSnapshot {
            job: job.clone(),
            logs: state.logs.get(job_id).cloned().unwrap_or_default(),
        }))
    }

    fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let state = self.read();
        let mut counts = StatusCounts::default();
        for job in state.jobs.values() {
            counts.add(job.status, 1);
        }
        Ok(counts)
    }

    fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        let mut state = self.write();
        if state.jobs.remove(job_id).is_none() {
            return Ok(false);
        }
        state.order.retain(|id| id != job_id);
        state.logs.remove(job_id);
        Ok(true)
    }
}
