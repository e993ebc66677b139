//! # studio-jobs
//!
//! Orchestration for long-running generative AI jobs: run a batch of video
//! generations with a bounded number of requests in flight, poll each job to
//! completion, and report every item's outcome individually.
//!
//! ## Features
//!
//! - **Concurrency limiting**: a moving window of at most N in-flight tasks,
//!   with per-task progress reporting
//! - **Fire-and-poll jobs**: fixed-interval polling with an attempt ceiling,
//!   retrying flaky status checks and stopping at once on definitive failures
//! - **Per-item events**: every task gets exactly one `Succeeded` or `Failed`
//!   event; one bad item never aborts its siblings
//! - **Structured failures**: [`ItemFailure`] carries the item key, the
//!   reason, and a content-safety classification
//! - **Cancellation**: a shared `CancellationToken` stops waits and network
//!   calls at the next suspension point
//! - **Batch tracking**: [`BatchTracker`] keeps the per-item status list and
//!   retries only the failed subset
//!
//! ## Quick Start
//!
//! ```no_run
//! use studio_jobs::*;
//!
//! # async fn example() -> Result<()> {
//! let runner = VideoTaskRunner::new(HttpVideoBackend::new("http://localhost:3000/api/video"))
//!     .with_config(RunnerConfig::builder().with_concurrency(VIDEO_CONCURRENCY).build()?);
//!
//! let tasks = vec![
//!     VideoTask::from_image("look-1.png", "https://img.example.com/1.png", "turn head slowly"),
//!     VideoTask::from_frames(
//!         "transition-1",
//!         "https://img.example.com/1.png",
//!         "https://img.example.com/2.png",
//!         "morph between styles",
//!     ),
//! ];
//!
//! let mut tracker = BatchTracker::from_tasks(&tasks)?;
//! runner
//!     .run_batch(tasks.clone(), |event| {
//!         if let BatchEvent::Failed(failure) = &event {
//!             eprintln!("{}", failure.user_message());
//!         }
//!         tracker.apply(&event);
//!     })
//!     .await?;
//!
//! // Re-run only what failed; finished items keep their results.
//! if let Ok(retry) = tracker.retry_tasks(&tasks) {
//!     runner.run_batch(retry, |event| { tracker.apply(&event); }).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod hosting;
pub mod limiter;
pub mod poller;
pub mod runner;
pub mod tracker;
pub mod types;

pub use backend::VideoBackend;
pub use client::HttpVideoBackend;
pub use config::{
    PollConfig, RunnerConfig, RunnerConfigBuilder, ANALYSIS_CONCURRENCY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL, IMAGE_CONCURRENCY, IMAGE_EDIT_CONCURRENCY, VIDEO_CONCURRENCY,
};
pub use error::{FailureKind, GenerationError, ItemFailure, Result};
pub use hosting::{ImageHost, UploadCache};
pub use limiter::{ConcurrencyLimiter, Settled};
pub use poller::JobPoller;
pub use runner::VideoTaskRunner;
pub use tokio_util::sync::CancellationToken;
pub use tracker::{BatchTracker, ItemStatus, TrackedItem};
pub use types::{
    AspectRatio, BatchEvent, BatchSummary, GenerationParams, JobHandle, JobStatus, Resolution,
    SubmitRequest, VideoSource, VideoTask,
};
