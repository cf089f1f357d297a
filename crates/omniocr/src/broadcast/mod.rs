//! Real-time job event streaming.
//!
//! Subscribers (the CLI `logs --follow` view, tests, embedding services)
//! receive every committed job change without polling.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster};
