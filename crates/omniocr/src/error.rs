use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum OmniOcrError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// Errors returned synchronously by lifecycle operations.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid submission: {message}")]
    Validation { message: String },

    #[error("Job '{job_id}' not found")]
    NotFound { job_id: String },

    #[error("Illegal transition for job '{job_id}': {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job '{job_id}' is still {status}")]
    StillActive { job_id: String, status: JobStatus },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl JobError {
    pub fn validation(message: impl Into<String>) -> Self {
        JobError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(job_id: &str) -> Self {
        JobError::NotFound {
            job_id: job_id.to_string(),
        }
    }
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::JobNotFound { job_id } => JobError::NotFound { job_id },
            other => JobError::Store(other),
        }
    }
}

/// Errors raised by job store backings.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    #[error("Job '{job_id}' already exists")]
    DuplicateJob { job_id: String },

    #[error("Job '{job_id}' is {actual}, expected {expected}")]
    StatusConflict {
        job_id: String,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("Corrupt record for job '{job_id}': {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(crate::db::DatabaseError::Sqlite(err))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

pub type Result<T> = std::result::Result<T, OmniOcrError>;
