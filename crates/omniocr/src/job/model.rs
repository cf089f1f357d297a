//! Job and log entry records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Owner id recorded for submissions made without a signed-in user.
pub const GUEST_OWNER_ID: &str = "public-guest-id";

/// OCR engine selected for a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    Gemini,
    Mistral,
    Doctr,
    Tesseract,
}

impl OcrEngine {
    pub const ALL: [OcrEngine; 4] = [
        OcrEngine::Gemini,
        OcrEngine::Mistral,
        OcrEngine::Doctr,
        OcrEngine::Tesseract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OcrEngine::Gemini => "gemini",
            OcrEngine::Mistral => "mistral",
            OcrEngine::Doctr => "doctr",
            OcrEngine::Tesseract => "tesseract",
        }
    }

    /// Name of the credential provider this engine needs, if any.
    pub fn credential_provider(&self) -> Option<&'static str> {
        match self {
            OcrEngine::Gemini => Some("gemini"),
            OcrEngine::Mistral => Some("mistral"),
            OcrEngine::Doctr | OcrEngine::Tesseract => None,
        }
    }
}

impl fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for OcrEngine {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(OcrEngine::Gemini),
            "mistral" => Ok(OcrEngine::Mistral),
            "doctr" => Ok(OcrEngine::Doctr),
            "tesseract" => Ok(OcrEngine::Tesseract),
            "" => Err(JobError::validation("engine must not be empty")),
            other => Err(JobError::validation(format!("unknown OCR engine '{}'", other))),
        }
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true for COMPLETED, FAILED and CANCELLED.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Severity of a job log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// A document handed in for OCR.
#[derive(Clone)]
pub struct Submission {
    pub file_bytes: Vec<u8>,
    pub file_name: String,
    /// MIME type reported by the client. Inferred from the file name when empty.
    pub mime_type: String,
    pub engine: OcrEngine,
}

impl Submission {
    pub fn new(
        file_bytes: Vec<u8>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        engine: OcrEngine,
    ) -> Self {
        Self {
            file_bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            engine,
        }
    }

    /// Returns the reported MIME type, or one guessed from the file name.
    pub fn effective_mime_type(&self) -> String {
        let reported = self.mime_type.trim();
        if !reported.is_empty() {
            return reported.to_string();
        }
        mime_guess::from_path(&self.file_name)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("file_bytes.len", &self.file_bytes.len())
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("engine", &self.engine)
            .finish()
    }
}

/// One OCR request and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub file_mime_type: String,
    pub engine: OcrEngine,
    pub status: JobStatus,
    /// Extracted text. Present exactly when the job is completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure reason. Present exactly when the job has failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a QUEUED job with a fresh id.
    pub fn queued(
        owner_id: &str,
        file_name: &str,
        file_size_bytes: u64,
        file_mime_type: &str,
        engine: OcrEngine,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            file_name: file_name.to_string(),
            file_size_bytes,
            file_mime_type: file_mime_type.to_string(),
            engine,
            status: JobStatus::Queued,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::Processing)
    }
}

/// Append-only event record tied to one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub job_id: String,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(job_id: &str, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// A job read together with its logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job: Job,
    pub logs: Vec<LogEntry>,
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: JobStatus, n: u64) {
        match status {
            JobStatus::Queued => self.queued += n,
            JobStatus::Processing => self.processing += n,
            JobStatus::Completed => self.completed += n,
            JobStatus::Failed => self.failed += n,
            JobStatus::Cancelled => self.cancelled += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.queued + self.processing + self.completed + self.failed + self.cancelled
    }
}
