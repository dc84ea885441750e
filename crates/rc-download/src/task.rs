use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::DownloadFailureReason;

/// Scheduling priority, higher first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskStatus {
    Queued,
    Downloading,
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One file to fetch: what was asked for plus where its execution stands.
///
/// Only the orchestrator moves a task through its statuses. Callers can ask
/// for cancellation through [`DownloadTask::cancel_handle`]; workers observe
/// it between chunks.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub id: String,
    pub name: String,
    pub origin_url: String,
    /// Where the bytes are actually fetched from, a mirror of `origin_url`
    /// or the same URL
    pub effective_url: String,
    pub save_path: PathBuf,
    pub declared_size: u64,
    /// Lowercase hex. Empty when the manifest declares no digest, in which
    /// case only the size is verified.
    pub declared_digest: String,
    pub priority: Priority,
    pub max_retries: u32,
    retry_count: u32,
    status: TaskStatus,
    last_updated_at: DateTime<Utc>,
    written_bytes: u64,
    reported_bytes: u64,
    failure: Option<DownloadFailureReason>,
    cancel: CancellationToken,
}

impl DownloadTask {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        save_path: impl Into<PathBuf>,
    ) -> Self {
        let url = url.into();
        Self {
            id: id.into(),
            name: name.into(),
            effective_url: url.clone(),
            origin_url: url,
            save_path: save_path.into(),
            declared_size: 0,
            declared_digest: String::new(),
            priority: Priority::Normal,
            max_retries: 3,
            retry_count: 0,
            status: TaskStatus::Queued,
            last_updated_at: Utc::now(),
            written_bytes: 0,
            reported_bytes: 0,
            failure: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_declared(mut self, size: u64, digest: impl Into<String>) -> Self {
        self.declared_size = size;
        self.declared_digest = digest.into().to_ascii_lowercase();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fetch from `url` instead of the origin
    pub fn with_effective_url(mut self, url: impl Into<String>) -> Self {
        self.effective_url = url.into();
        self
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    /// Bytes written by the attempt that completed the task, zero otherwise
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    pub fn failure(&self) -> Option<&DownloadFailureReason> {
        self.failure.as_ref()
    }

    /// Token that cancels this task alone when triggered
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `status`, returning the previous one
    pub(crate) fn transition(&mut self, status: TaskStatus) -> TaskStatus {
        let previous = self.status;
        self.status = status;
        self.last_updated_at = Utc::now();
        previous
    }

    /// Raise the progress high-water mark, returning whether `received`
    /// is new ground across all attempts so far
    pub(crate) fn advance_reported(&mut self, received: u64) -> bool {
        if received <= self.reported_bytes {
            return false;
        }
        self.reported_bytes = received;
        true
    }

    pub(crate) fn record_retry(&mut self) {
        debug_assert!(self.retry_count < self.max_retries);
        self.retry_count += 1;
    }

    pub(crate) fn complete(&mut self, written: u64) -> TaskStatus {
        self.written_bytes = written;
        self.failure = None;
        self.transition(TaskStatus::Completed)
    }

    pub(crate) fn fail(&mut self, reason: DownloadFailureReason) -> TaskStatus {
        let status = if reason == DownloadFailureReason::Cancelled {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Failed
        };
        self.written_bytes = 0;
        self.failure = Some(reason);
        self.transition(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let task = DownloadTask::new("id", "client.jar", "https://origin/client.jar", "/tmp/c.jar")
            .with_declared(1024, "ABCDEF")
            .with_effective_url("https://mirror/client.jar");

        assert_eq!(task.origin_url, "https://origin/client.jar");
        assert_eq!(task.effective_url, "https://mirror/client.jar");
        assert_eq!(task.declared_digest, "abcdef");
        assert_eq!(task.status(), TaskStatus::Queued);
        assert_eq!(task.retry_count(), 0);
        assert_eq!(task.priority, Priority::Normal);
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_fail_with_cancelled_reason_is_cancelled_status() {
        let mut task = DownloadTask::new("id", "n", "u", "p");
        let previous = task.fail(DownloadFailureReason::Cancelled);
        assert_eq!(previous, TaskStatus::Queued);
        assert_eq!(task.status(), TaskStatus::Cancelled);

        let mut task = DownloadTask::new("id", "n", "u", "p");
        task.fail(DownloadFailureReason::HttpStatus(404));
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.status().is_terminal());
    }
}
