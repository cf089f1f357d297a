//! SQLite-backed job store.

use rusqlite::Connection;

use crate::db::job_repo::{self, JobRow, StatusUpdate};
use crate::db::log_repo::{self, LogRow};
use crate::db::{format_timestamp, parse_timestamp, Database};
use crate::error::StoreError;
use crate::job::{Job, JobSnapshot, JobStatus, LogEntry, LogLevel, OcrEngine, StatusCounts};

use super::{clamp_log, JobStore, StatusChange};

/// Job store persisted in the application database.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

// ─── Row conversion ─────────────────────────────────────────────────────────

fn corrupt(job_id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        job_id: job_id.to_string(),
        reason: reason.into(),
    }
}

fn job_to_row(job: &Job) -> Result<JobRow, StoreError> {
    let file_size_bytes = i64::try_from(job.file_size_bytes)
        .map_err(|_| corrupt(&job.id, "file size does not fit in the database"))?;
    Ok(JobRow {
        id: job.id.clone(),
        owner_id: job.owner_id.clone(),
        file_name: job.file_name.clone(),
        file_size_bytes,
        file_mime_type: job.file_mime_type.clone(),
        engine: job.engine.as_str().to_string(),
        status: job.status.as_str().to_string(),
        result: job.result.clone(),
        error: job.error.clone(),
        created_at: format_timestamp(job.created_at),
        updated_at: format_timestamp(job.updated_at),
        finished_at: job.finished_at.map(format_timestamp),
    })
}

fn row_to_job(row: JobRow) -> Result<Job, StoreError> {
    let id = row.id;
    let ts = |s: &str| {
        parse_timestamp(s).map_err(|e| corrupt(&id, format!("bad timestamp '{}': {}", s, e)))
    };

    let engine = row
        .engine
        .parse::<OcrEngine>()
        .map_err(|e| corrupt(&id, e.to_string()))?;
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|e| corrupt(&id, e))?;
    let file_size_bytes =
        u64::try_from(row.file_size_bytes).map_err(|_| corrupt(&id, "negative file size"))?;
    let created_at = ts(&row.created_at)?;
    let updated_at = ts(&row.updated_at)?;
    let finished_at = row.finished_at.as_deref().map(ts).transpose()?;

    Ok(Job {
        id: id.clone(),
        owner_id: row.owner_id,
        file_name: row.file_name,
        file_size_bytes,
        file_mime_type: row.file_mime_type,
        engine,
        status,
        result: row.result,
        error: row.error,
        created_at,
        updated_at,
        finished_at,
    })
}

fn row_to_log(row: LogRow) -> Result<LogEntry, StoreError> {
    let level = row
        .level
        .parse::<LogLevel>()
        .map_err(|e| corrupt(&row.job_id, e))?;
    let created_at = parse_timestamp(&row.created_at)
        .map_err(|e| corrupt(&row.job_id, format!("bad log timestamp: {}", e)))?;
    Ok(LogEntry {
        id: row.id,
        job_id: row.job_id,
        level,
        message: row.message,
        created_at,
    })
}

fn insert_log(conn: &Connection, log: &LogEntry) -> Result<LogEntry, StoreError> {
    let latest = log_repo::latest_created_at(conn, &log.job_id)?
        .map(|s| parse_timestamp(&s))
        .transpose()
        .map_err(|e| corrupt(&log.job_id, format!("bad log timestamp: {}", e)))?;
    let stored = clamp_log(log, latest);
    log_repo::insert(
        conn,
        &LogRow {
            id: stored.id.clone(),
            job_id: stored.job_id.clone(),
            level: stored.level.as_str().to_string(),
            message: stored.message.clone(),
            created_at: format_timestamp(stored.created_at),
        },
    )?;
    Ok(stored)
}

fn load_job(conn: &Connection, job_id: &str) -> Result<Job, StoreError> {
    let row = job_repo::find_by_id(conn, job_id)?.ok_or_else(|| StoreError::JobNotFound {
        job_id: job_id.to_string(),
    })?;
    row_to_job(row)
}

fn load_logs(conn: &Connection, job_id: &str) -> Result<Vec<LogEntry>, StoreError> {
    log_repo::list_for_job(conn, job_id)?
        .into_iter()
        .map(row_to_log)
        .collect()
}

// ─── JobStore ───────────────────────────────────────────────────────────────

impl JobStore for SqliteJobStore {
    fn insert(&self, job: &Job, log: &LogEntry) -> Result<LogEntry, StoreError> {
        let row = job_to_row(job)?;
        self.db.with_transaction(|tx| {
            if job_repo::find_by_id(tx, &job.id)?.is_some() {
                return Err(StoreError::DuplicateJob {
                    job_id: job.id.clone(),
                });
            }
            job_repo::insert(tx, &row)?;
            insert_log(tx, log)
        })
    }

    fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let row = self.db.with_conn(|conn| job_repo::find_by_id(conn, job_id))?;
        row.map(row_to_job).transpose()
    }

    fn list(&self, owner_id: Option<&str>) -> Result<Vec<Job>, StoreError> {
        let rows = self.db.with_conn(|conn| job_repo::list(conn, owner_id))?;
        rows.into_iter().map(row_to_job).collect()
    }

    fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let rows = self
            .db
            .with_conn(|conn| job_repo::find_by_status(conn, status.as_str()))?;
        rows.into_iter().map(row_to_job).collect()
    }

    fn apply_change(
        &self,
        change: &StatusChange,
        log: &LogEntry,
    ) -> Result<(Job, LogEntry), StoreError> {
        let updated_at = format_timestamp(change.at);
        let finished_at = change.finished_at().map(format_timestamp);

        self.db.with_transaction(|tx| {
            let current = load_job(tx, &change.job_id)?;
            if current.status != change.from {
                return Err(StoreError::StatusConflict {
                    job_id: change.job_id.clone(),
                    expected: change.from,
                    actual: current.status,
                });
            }

            let update = StatusUpdate {
                status: change.to.as_str(),
                result: change.result.as_deref(),
                error: change.error.as_deref(),
                updated_at: &updated_at,
                finished_at: finished_at.as_deref(),
            };
            let changed =
                job_repo::update_status_if(tx, &change.job_id, change.from.as_str(), &update)?;
            if changed == 0 {
                return Err(StoreError::StatusConflict {
                    job_id: change.job_id.clone(),
                    expected: change.from,
                    actual: load_job(tx, &change.job_id)?.status,
                });
            }

            let stored = insert_log(tx, log)?;
            let job = load_job(tx, &change.job_id)?;
            Ok((job, stored))
        })
    }

    fn append_log(&self, log: &LogEntry) -> Result<LogEntry, StoreError> {
        self.db.with_transaction(|tx| {
            if job_repo::find_by_id(tx, &log.job_id)?.is_none() {
                return Err(StoreError::JobNotFound {
                    job_id: log.job_id.clone(),
                });
            }
            insert_log(tx, log)
        })
    }

    fn logs(&self, job_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        self.db.with_read_transaction(|tx| {
            if job_repo::find_by_id(tx, job_id)?.is_none() {
                return Err(StoreError::JobNotFound {
                    job_id: job_id.to_string(),
                });
            }
            load_logs(tx, job_id)
        })
    }

    fn snapshot(&self, job_id: &str) -> Result<Option<JobSnapshot>, StoreError> {
        self.db.with_read_transaction(|tx| {
            let Some(row) = job_repo::find_by_id(tx, job_id)? else {
                return Ok(None);
            };
            let job = row_to_job(row)?;
            let logs = load_logs(tx, job_id)?;
            Ok(Some(JobSnapshot { job, logs }))
        })
    }

    fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows = self.db.with_conn(job_repo::count_by_status)?;
        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match status.parse::<JobStatus>() {
                Ok(status) => counts.add(status, u64::try_from(n).unwrap_or(0)),
                Err(e) => log::warn!("Skipping jobs with {}", e),
            }
        }
        Ok(counts)
    }

    fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.db.with_conn(|conn| job_repo::delete(conn, job_id))?)
    }
}
