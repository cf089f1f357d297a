//! Legal status transitions and the log message each one produces.

use super::model::{JobStatus, LogLevel, OcrEngine};

/// Returns true if `from -> to` is in the transition table.
pub fn is_legal(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Queued, JobStatus::Processing)
            | (JobStatus::Queued, JobStatus::Cancelled)
            | (JobStatus::Processing, JobStatus::Completed)
            | (JobStatus::Processing, JobStatus::Failed)
            | (JobStatus::Processing, JobStatus::Cancelled)
    )
}

/// Message of the log entry written when a job is created.
pub fn queued_message(engine: OcrEngine) -> String {
    format!("Job queued for processing with engine: {}", engine)
}

/// A requested status change and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Engine dispatch started.
    Start,
    /// Engine returned text.
    Complete { text: String },
    /// Engine reported an error.
    Fail { reason: String },
    /// User asked to stop the job.
    Cancel,
}

impl Transition {
    pub fn complete(text: impl Into<String>) -> Self {
        Transition::Complete { text: text.into() }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Transition::Fail {
            reason: reason.into(),
        }
    }

    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Start => JobStatus::Processing,
            Transition::Complete { .. } => JobStatus::Completed,
            Transition::Fail { .. } => JobStatus::Failed,
            Transition::Cancel => JobStatus::Cancelled,
        }
    }

    pub fn result(&self) -> Option<&str> {
        match self {
            Transition::Complete { text } => Some(text),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Transition::Fail { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            Transition::Start | Transition::Complete { .. } => LogLevel::Info,
            Transition::Fail { .. } | Transition::Cancel => LogLevel::Error,
        }
    }

    pub fn log_message(&self) -> String {
        match self {
            Transition::Start => format!("Status updated to {}", JobStatus::Processing),
            Transition::Complete { .. } => {
                "Status updated to completed (Text extracted)".to_string()
            }
            Transition::Fail { reason } => format!("Status updated to failed: {}", reason),
            Transition::Cancel => "Status updated to cancelled by user".to_string(),
        }
    }
}
