use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::error::DownloadFailureReason;
use crate::task::TaskStatus;

/// Observations emitted while a batch runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Emitted after a chunk carries the task past the furthest point any
    /// of its attempts reached, so `downloaded_bytes` never decreases. A
    /// retried task is silent until it catches up with the failed attempt.
    Progress {
        task_id: String,
        downloaded_bytes: u64,
        total_bytes: u64,
        rate_bytes_per_sec: u64,
    },
    StatusChanged {
        task_id: String,
        previous: TaskStatus,
        new: TaskStatus,
        error: Option<DownloadFailureReason>,
    },
}

/// Optional event channel; a closed or absent receiver silently drops events
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<UnboundedSender<DownloadEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<UnboundedSender<DownloadEvent>>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                trace!("Event receiver dropped");
            }
        }
    }

    pub(crate) fn status(
        &self,
        task_id: &str,
        previous: TaskStatus,
        new: TaskStatus,
        error: Option<DownloadFailureReason>,
    ) {
        self.emit(DownloadEvent::StatusChanged {
            task_id: task_id.to_string(),
            previous,
            new,
            error,
        });
    }
}

/// Instantaneous rate of a chunk of `bytes` that took `elapsed` to arrive
pub(crate) fn rate_bytes_per_sec(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate() {
        assert_eq!(rate_bytes_per_sec(1024, Duration::from_millis(500)), 2048);
        assert_eq!(rate_bytes_per_sec(1024, Duration::ZERO), 0);
    }

    #[test]
    fn test_emit_without_receiver_is_noop() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(Some(tx));
        sink.status("a", TaskStatus::Queued, TaskStatus::Downloading, None);
        EventSink::default().status("a", TaskStatus::Queued, TaskStatus::Downloading, None);
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = DownloadEvent::StatusChanged {
            task_id: "client".to_string(),
            previous: TaskStatus::Verifying,
            new: TaskStatus::Failed,
            error: Some(DownloadFailureReason::HttpStatus(404)),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["new"], "Failed");
    }
}
