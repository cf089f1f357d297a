//! Job event broadcaster for real-time lifecycle streaming.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{Job, LogEntry};

/// Emitted whenever a job is created, changes status, or gets a new log entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    /// Job state after the change.
    pub job: Job,
    /// Log entry written with the change.
    pub log: LogEntry,
}

/// Broadcasts job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber. Only events sent afterwards are received.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{LogLevel, OcrEngine};

    fn event() -> JobEvent {
        let job = Job::queued("u1", "a.png", 1, "image/png", OcrEngine::Doctr);
        let log = LogEntry::new(&job.id, LogLevel::Info, "queued");
        JobEvent { job, log }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = JobEventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let sent = event();
        broadcaster.send(sent.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.job.id, sent.job.id);
        assert_eq!(received.log.message, "queued");
    }

    #[test]
    fn test_send_without_subscribers_is_ok() {
        let broadcaster = JobEventBroadcaster::default();
        assert_eq!(broadcaster.receiver_count(), 0);
        broadcaster.send(event());
    }
}
