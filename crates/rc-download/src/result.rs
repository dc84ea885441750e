use crate::error::DownloadFailureReason;
use crate::task::{DownloadTask, TaskStatus};

/// Full accounting of a batch: every input task ends up in exactly one list
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Sum of `declared_size` over all tasks
    pub total_bytes: u64,
    /// Bytes actually written by completed tasks
    pub downloaded_bytes: u64,
    /// Completed tasks, in completion order
    pub success_tasks: Vec<DownloadTask>,
    /// Failed and cancelled tasks with their reason, in completion order
    pub error_tasks: Vec<(DownloadTask, DownloadFailureReason)>,
}

impl BatchResult {
    pub fn task_count(&self) -> usize {
        self.success_tasks.len() + self.error_tasks.len()
    }

    pub fn is_success(&self) -> bool {
        self.error_tasks.is_empty()
    }

    /// Retries spent across the whole batch
    pub fn total_retries(&self) -> u32 {
        self.success_tasks
            .iter()
            .chain(self.error_tasks.iter().map(|(task, _)| task))
            .map(|task| task.retry_count())
            .sum()
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &DownloadTask> {
        self.error_tasks
            .iter()
            .filter(|(task, _)| task.status() == TaskStatus::Cancelled)
            .map(|(task, _)| task)
    }
}

/// Folds terminal tasks into a [`BatchResult`]
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: BatchResult,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one terminal task. A task that somehow lacks a failure
    /// reason while not completed is recorded as cancelled.
    pub fn record(&mut self, task: DownloadTask) {
        self.result.total_bytes += task.declared_size;
        match task.status() {
            TaskStatus::Completed => {
                self.result.downloaded_bytes += task.written_bytes();
                self.result.success_tasks.push(task);
            }
            _ => {
                debug_assert!(task.status().is_terminal());
                let reason = task
                    .failure()
                    .cloned()
                    .unwrap_or(DownloadFailureReason::Cancelled);
                self.result.error_tasks.push((task, reason));
            }
        }
    }

    pub fn finish(self) -> BatchResult {
        self.result
    }
}

impl FromIterator<DownloadTask> for BatchResult {
    fn from_iter<I: IntoIterator<Item = DownloadTask>>(iter: I) -> Self {
        let mut aggregator = ResultAggregator::new();
        for task in iter {
            aggregator.record(task);
        }
        aggregator.finish()
    }
}
