//! Shared priority queue the download workers drain.
//!
//! Tasks come out by priority (higher first), then in enqueue order within
//! a priority level. Besides the queued tasks it tracks how many tasks are
//! still *outstanding*: queued, being worked on, or waiting out a retry
//! backoff. [`DownloadQueue::next`] only reports the queue as drained once
//! nothing is outstanding, so an idle worker keeps waiting while a sibling
//! may still hand a task back.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::task::{DownloadTask, Priority};

struct QueuedTask {
    priority: Priority,
    sequence: u64,
    task: DownloadTask,
}

// Ordering for BinaryHeap: higher priority first, then lower sequence (older) first
impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    next_sequence: u64,
    outstanding: usize,
}

impl QueueState {
    fn push(&mut self, task: DownloadTask) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedTask {
            priority: task.priority,
            sequence,
            task,
        });
    }
}

#[derive(Default)]
pub struct DownloadQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

impl std::fmt::Debug for DownloadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("DownloadQueue")
            .field("queued", &state.heap.len())
            .field("outstanding", &state.outstanding)
            .finish()
    }
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // The lock is never held across an await, and no code path panics while
    // holding it, so a poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a new task; it counts as outstanding until [`finish`](Self::finish)
    pub fn push(&self, task: DownloadTask) {
        {
            let mut state = self.lock();
            state.outstanding += 1;
            state.push(task);
        }
        self.changed.notify_waiters();
    }

    /// Hand a task taken with [`next`](Self::next) back to the queue. It goes
    /// behind the tasks already waiting at its priority.
    pub fn requeue(&self, task: DownloadTask) {
        self.lock().push(task);
        self.changed.notify_waiters();
    }

    /// Mark a task taken with [`next`](Self::next) as done for good
    pub fn finish(&self) {
        {
            let mut state = self.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// Highest-priority queued task, if any, without waiting
    pub fn try_pop(&self) -> Option<DownloadTask> {
        self.lock().heap.pop().map(|q| q.task)
    }

    /// Next task to work on. Waits while the queue is empty but tasks are
    /// still outstanding; `None` once everything is finished.
    pub async fn next(&self) -> Option<DownloadTask> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(queued) = state.heap.pop() {
                    return Some(queued.task);
                }
                if state.outstanding == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Tasks waiting to be picked up
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks pushed and not yet finished
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(id: &str, priority: Priority) -> DownloadTask {
        DownloadTask::new(id, id, format!("http://x/{id}"), format!("/tmp/{id}")).with_priority(priority)
    }

    #[test]
    fn test_priority_then_fifo() {
        let queue = DownloadQueue::new();
        queue.push(task("low-1", Priority::Low));
        queue.push(task("normal-1", Priority::Normal));
        queue.push(task("high-1", Priority::High));
        queue.push(task("normal-2", Priority::Normal));
        queue.push(task("high-2", Priority::High));

        let order: Vec<String> = std::iter::from_fn(|| queue.try_pop()).map(|t| t.id).collect();
        assert_eq!(order, ["high-1", "high-2", "normal-1", "normal-2", "low-1"]);
    }

    #[test]
    fn test_requeue_goes_behind_same_priority() {
        let queue = DownloadQueue::new();
        queue.push(task("a", Priority::Normal));
        queue.push(task("b", Priority::Normal));

        let a = queue.try_pop().unwrap();
        queue.requeue(a);

        assert_eq!(queue.try_pop().unwrap().id, "b");
        assert_eq!(queue.try_pop().unwrap().id, "a");
        assert_eq!(queue.outstanding(), 2);
    }

    #[tokio::test]
    async fn test_next_returns_none_when_nothing_outstanding() {
        let queue = DownloadQueue::new();
        assert!(queue.next().await.is_none());

        queue.push(task("a", Priority::Normal));
        assert!(queue.next().await.is_some());
        queue.finish();
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn test_next_waits_for_requeue() {
        let queue = Arc::new(DownloadQueue::new());
        queue.push(task("a", Priority::Normal));
        let taken = queue.next().await.unwrap();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await.map(|t| t.id) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.requeue(taken);
        assert_eq!(waiter.await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_next_wakes_on_last_finish() {
        let queue = Arc::new(DownloadQueue::new());
        queue.push(task("a", Priority::Normal));
        let _taken = queue.next().await.unwrap();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.finish();
        assert!(waiter.await.unwrap());
    }
}
