//! Concurrent, verified file provisioning.
//!
//! A batch of [`DownloadTask`]s goes into [`DownloadOrchestrator::run_batch`]
//! and comes back as a [`BatchResult`] once every task is terminal. Transport
//! failures are retried with exponential backoff; files are verified against
//! their declared size and digest as read back from the [`ByteSink`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use rc_core::{HttpConfig, ReqwestSender};
//! use rc_download::{DownloadConfig, DownloadOrchestrator, DownloadTask, FsSink, Priority};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let http = Arc::new(ReqwestSender::new(&HttpConfig::default())?);
//! let orchestrator = DownloadOrchestrator::new(http, Arc::new(FsSink), DownloadConfig::default());
//!
//! let client = DownloadTask::new(
//!     "1.21.4-client",
//!     "client.jar",
//!     "https://piston-data.mojang.com/v1/objects/<sha1>/client.jar",
//!     "versions/1.21.4/1.21.4.jar",
//! )
//! .with_priority(Priority::High);
//!
//! let result = orchestrator.run(vec![client], &CancellationToken::new()).await;
//! for (task, reason) in &result.error_tasks {
//!     eprintln!("{}: {}", task.name, reason);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod digest;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod queue;
pub mod result;
pub mod sink;
pub mod task;
pub mod verify;

pub use config::{DownloadConfig, MAX_CONCURRENCY_CEILING};
pub use digest::{ComputedDigest, DigestAlgorithm};
pub use error::DownloadFailureReason;
pub use events::DownloadEvent;
pub use orchestrator::DownloadOrchestrator;
pub use queue::DownloadQueue;
pub use result::{BatchResult, ResultAggregator};
pub use sink::{ByteSink, FsSink, SinkReader, SinkWriter};
pub use task::{DownloadTask, Priority, TaskStatus};
pub use verify::{InvalidReason, Verification, Verifier};
