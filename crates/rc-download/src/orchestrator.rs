//! Worker pool that drains a [`DownloadQueue`] into a [`BatchResult`].
//!
//! Each worker loops: take the highest-priority task, stream its
//! `effective_url` into the sink chunk by chunk, verify the written file,
//! and record the task once it is terminal. Transport failures are retried
//! with exponential backoff by handing the task back to the queue after the
//! delay, so a backing-off task never occupies a worker.
//!
//! Priority is a preference, not a guarantee: a worker already streaming a
//! low-priority file is not preempted when a high-priority task becomes
//! available.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use rc_core::{HttpRequest, HttpSender};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, instrument, warn};

use crate::config::DownloadConfig;
use crate::error::DownloadFailureReason;
use crate::events::{DownloadEvent, EventSink, rate_bytes_per_sec};
use crate::queue::DownloadQueue;
use crate::result::{BatchResult, ResultAggregator};
use crate::sink::{ByteSink, SinkWriter};
use crate::task::{DownloadTask, TaskStatus};
use crate::verify::{Verification, Verifier};

pub struct DownloadOrchestrator {
    http: Arc<dyn HttpSender>,
    sink: Arc<dyn ByteSink>,
    config: DownloadConfig,
    verifier: Verifier,
    events: EventSink,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DownloadOrchestrator {
    pub fn new(http: Arc<dyn HttpSender>, sink: Arc<dyn ByteSink>, config: DownloadConfig) -> Self {
        let verifier = Verifier::new(sink.clone(), config.digest);
        Self {
            http,
            sink,
            config,
            verifier,
            events: EventSink::default(),
        }
    }

    /// Send progress and status events to `tx`
    pub fn with_events(mut self, tx: UnboundedSender<DownloadEvent>) -> Self {
        self.events = EventSink::new(Some(tx));
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Verifier over the same sink and digest algorithm the batches use
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// [`run_batch`](Self::run_batch) with the configured concurrency
    pub async fn run(&self, tasks: Vec<DownloadTask>, cancel: &CancellationToken) -> BatchResult {
        self.run_batch(tasks, self.config.max_concurrency, cancel).await
    }

    /// Download every task with at most `max_concurrency` transfers in
    /// flight, returning once all of them are terminal.
    ///
    /// Never fails as a whole: each task lands in either `success_tasks` or
    /// `error_tasks`. Cancelling `cancel` stops every task at its next chunk
    /// boundary; a task's own [`cancel_handle`](DownloadTask::cancel_handle)
    /// stops that task alone.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn run_batch(
        &self,
        tasks: Vec<DownloadTask>,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> BatchResult {
        if tasks.is_empty() {
            return BatchResult::default();
        }

        let workers = DownloadConfig::clamp_concurrency(max_concurrency).min(tasks.len());
        info!(workers, "Starting download batch");

        let ctx = Arc::new(BatchContext {
            http: self.http.clone(),
            sink: self.sink.clone(),
            config: self.config.clone(),
            verifier: self.verifier.clone(),
            events: self.events.clone(),
            queue: DownloadQueue::new(),
            results: Mutex::new(ResultAggregator::new()),
            cancel: cancel.clone(),
        });
        for task in tasks {
            ctx.queue.push(task);
        }

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let ctx = ctx.clone();
            pool.spawn(
                async move { ctx.work().await }.instrument(debug_span!("download_worker", worker)),
            );
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                warn!(error = %e, "Download worker aborted");
            }
        }

        let result = std::mem::take(&mut *ctx.results()).finish();
        info!(
            completed = result.success_tasks.len(),
            failed = result.error_tasks.len(),
            downloaded_bytes = result.downloaded_bytes,
            retries = result.total_retries(),
            "Download batch finished"
        );
        result
    }
}

/// State shared by the workers of one batch
struct BatchContext {
    http: Arc<dyn HttpSender>,
    sink: Arc<dyn ByteSink>,
    config: DownloadConfig,
    verifier: Verifier,
    events: EventSink,
    queue: DownloadQueue,
    results: Mutex<ResultAggregator>,
    cancel: CancellationToken,
}

/// What a worker does with a task after one attempt
enum Outcome {
    Finished,
    Retry,
}

impl BatchContext {
    fn results(&self) -> MutexGuard<'_, ResultAggregator> {
        self.results.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_cancelled(&self, task: &DownloadTask) -> bool {
        self.cancel.is_cancelled() || task.is_cancel_requested()
    }

    async fn work(self: Arc<Self>) {
        while let Some(mut task) = self.queue.next().await {
            match self.attempt(&mut task).await {
                Outcome::Finished => self.finish(task),
                Outcome::Retry => self.clone().schedule_retry(task),
            }
        }
    }

    fn set_status(&self, task: &mut DownloadTask, status: TaskStatus, error: Option<DownloadFailureReason>) {
        let previous = task.transition(status);
        self.events.status(&task.id, previous, status, error);
    }

    fn fail(&self, task: &mut DownloadTask, reason: DownloadFailureReason) {
        let previous = task.fail(reason.clone());
        self.events
            .status(&task.id, previous, task.status(), Some(reason));
    }

    fn finish(&self, task: DownloadTask) {
        debug!(task = %task.id, status = %task.status(), "Task finished");
        self.results().record(task);
        self.queue.finish();
    }

    #[instrument(skip_all, fields(task = %task.id, attempt = task.retry_count() + 1))]
    async fn attempt(&self, task: &mut DownloadTask) -> Outcome {
        if self.is_cancelled(task) {
            self.fail(task, DownloadFailureReason::Cancelled);
            return Outcome::Finished;
        }

        self.set_status(task, TaskStatus::Downloading, None);
        let task_cancel = task.cancel_handle();

        let written = match self.transfer(task, &task_cancel).await {
            Ok(written) => written,
            Err(reason) => {
                if reason.is_retryable() && task.retry_count() < task.max_retries {
                    task.record_retry();
                    warn!(
                        error = %reason,
                        retry = task.retry_count(),
                        max_retries = task.max_retries,
                        "Transfer failed, will retry"
                    );
                    self.set_status(task, TaskStatus::Queued, Some(reason));
                    return Outcome::Retry;
                }

                // Partial bytes never reach verification
                if let Err(e) = self.sink.discard(&task.save_path).await {
                    warn!(error = %e, path = %task.save_path.display(), "Failed to discard partial file");
                }
                if reason != DownloadFailureReason::Cancelled {
                    warn!(error = %reason, "Download failed");
                }
                self.fail(task, reason);
                return Outcome::Finished;
            }
        };

        self.set_status(task, TaskStatus::Verifying, None);
        match self.verifier.verify_task(task).await {
            Ok(Verification::Valid) => {
                let previous = task.complete(written);
                self.events
                    .status(&task.id, previous, TaskStatus::Completed, None);
            }
            Ok(Verification::Invalid(reason)) => {
                self.fail(task, DownloadFailureReason::VerificationFailed(reason));
            }
            Err(e) => self.fail(task, e.into()),
        }
        Outcome::Finished
    }

    /// Stream the task's body into the sink, returning the bytes written
    async fn transfer(
        &self,
        task: &mut DownloadTask,
        task_cancel: &CancellationToken,
    ) -> Result<u64, DownloadFailureReason> {
        debug!(url = %task.effective_url, "Requesting");
        let request = HttpRequest::get(&task.effective_url);
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DownloadFailureReason::Cancelled),
            _ = task_cancel.cancelled() => return Err(DownloadFailureReason::Cancelled),
            sent = self.http.send(request) => sent?,
        };
        if !response.is_success() {
            return Err(DownloadFailureReason::HttpStatus(response.status()));
        }

        let announced = response.content_length();
        let total_bytes = announced.unwrap_or(task.declared_size);
        let mut body = response.into_stream();
        let mut writer = self.sink.open_for_write(&task.save_path).await?;
        let chunk_size = self.config.chunk_size.max(1);
        let mut received = 0u64;
        let mut last_chunk_at = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DownloadFailureReason::Cancelled),
                _ = task_cancel.cancelled() => return Err(DownloadFailureReason::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            for piece in chunk.chunks(chunk_size) {
                if self.is_cancelled(task) {
                    return Err(DownloadFailureReason::Cancelled);
                }
                writer.write_all(piece).await?;
                received += piece.len() as u64;

                let now = Instant::now();
                // A retry re-fetches from zero; stay quiet until it passes
                // what earlier attempts already reported.
                if task.advance_reported(received) {
                    self.events.emit(DownloadEvent::Progress {
                        task_id: task.id.clone(),
                        downloaded_bytes: received,
                        total_bytes,
                        rate_bytes_per_sec: rate_bytes_per_sec(
                            piece.len() as u64,
                            now - last_chunk_at,
                        ),
                    });
                }
                last_chunk_at = now;
            }
        }

        close(writer).await?;

        // Without a Content-Length the manifest's size is the only bound
        // telling a clean end of stream from a cut one.
        let expected = announced.unwrap_or(task.declared_size);
        if received < expected {
            return Err(DownloadFailureReason::PartialTransfer { expected, received });
        }
        debug!(received, "Transfer complete");
        Ok(received)
    }

    /// Hand `task` back to the queue once its backoff has elapsed, or
    /// finish it as cancelled if cancellation arrives first.
    fn schedule_retry(self: Arc<Self>, mut task: DownloadTask) {
        let delay = self.config.backoff(task.retry_count());
        debug!(task = %task.id, delay_ms = delay.as_millis() as u64, "Backing off");

        tokio::spawn(async move {
            let task_cancel = task.cancel_handle();
            let cancelled = tokio::select! {
                _ = self.cancel.cancelled() => true,
                _ = task_cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                if let Err(e) = self.sink.discard(&task.save_path).await {
                    warn!(error = %e, path = %task.save_path.display(), "Failed to discard partial file");
                }
                self.fail(&mut task, DownloadFailureReason::Cancelled);
                self.finish(task);
            } else {
                self.queue.requeue(task);
            }
        });
    }
}

async fn close(mut writer: SinkWriter) -> std::io::Result<()> {
    writer.flush().await?;
    writer.shutdown().await
}
