//! Job records, log entries and the status transition table.

pub mod model;
pub mod transition;

pub use model::{
    Job, JobSnapshot, JobStatus, LogEntry, LogLevel, OcrEngine, StatusCounts, Submission,
    GUEST_OWNER_ID,
};
pub use transition::{is_legal, queued_message, Transition};
