use std::pin::pin;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backend::VideoBackend;
use crate::config::RunnerConfig;
use crate::error::{FailureKind, GenerationError, ItemFailure, Result};
use crate::limiter::ConcurrencyLimiter;
use crate::poller::JobPoller;
use crate::types::{validate_keys, BatchEvent, BatchSummary, VideoTask};

/// Submits video jobs and polls them to completion, one batch at a time.
///
/// Every task in a batch gets exactly one terminal event (`Succeeded` or
/// `Failed`), no matter how its siblings fare. The runner keeps no state
/// between calls; feed its events into a [`BatchTracker`](crate::BatchTracker)
/// or your own item list.
///
/// # Example
/// ```no_run
/// use studio_jobs::*;
///
/// # async fn example() -> Result<()> {
/// let runner = VideoTaskRunner::new(HttpVideoBackend::new("http://localhost:3000/api/video"));
/// let tasks = vec![
///     VideoTask::from_image("a.png", "https://img.example.com/a.png", "slow zoom"),
///     VideoTask::from_image("b.png", "https://img.example.com/b.png", "hair blowing in wind"),
/// ];
/// let mut tracker = BatchTracker::from_tasks(&tasks)?;
/// let summary = runner.run_batch(tasks, |event| { tracker.apply(&event); }).await?;
/// println!("{} of {} succeeded", summary.succeeded, summary.total);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct VideoTaskRunner<B> {
    backend: B,
    config: RunnerConfig,
    cancel: CancellationToken,
}

impl<B: VideoBackend> VideoTaskRunner<B> {
    /// Runner with the default video configuration (8 concurrent jobs).
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: RunnerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a cancellation token with the caller.
    ///
    /// Once cancelled, tasks that have not started fail with
    /// [`GenerationError::Cancelled`] and running ones stop at their next
    /// network call or poll wait.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Generate a single video: validate, submit, poll. No batching.
    ///
    /// Used for "regenerate this item" actions; errors are classified exactly
    /// as in [`run_batch`](Self::run_batch).
    pub async fn generate_one(&self, task: &VideoTask) -> Result<String> {
        self.config.validate()?;
        self.execute(task, |_| {}).await
    }

    /// Run every task with at most `config.concurrency` in flight, streaming
    /// lifecycle events to `on_event` as they happen.
    ///
    /// Only a malformed batch (empty or duplicate keys) or an invalid
    /// configuration makes this return `Err`; item failures are reported
    /// as [`BatchEvent::Failed`].
    pub async fn run_batch<F>(&self, tasks: Vec<VideoTask>, mut on_event: F) -> Result<BatchSummary>
    where
        F: FnMut(BatchEvent),
    {
        self.config.validate()?;
        validate_keys(tasks.iter().map(|t| t.key.as_str()))?;
        let limiter = ConcurrencyLimiter::new(self.config.concurrency)?;

        let started = Instant::now();
        let total = tasks.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        info!(total, concurrency = limiter.limit(), "starting video batch");

        // Stage events are produced inside the task futures; terminal events
        // are produced here as tasks settle, so they can never repeat.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let jobs = tasks.iter().map(|task| {
            let tx = tx.clone();
            move || async move {
                self.execute(task, |event| {
                    let _ = tx.send(event);
                })
                .await
            }
        });
        let mut settled = pin!(limiter.stream(jobs));
        let mut completed = 0;

        loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => on_event(event),
                next = settled.next() => {
                    let Some((index, outcome)) = next else { break };
                    while let Ok(event) = rx.try_recv() {
                        on_event(event);
                    }

                    completed += 1;
                    let key = &tasks[index].key;
                    match outcome {
                        Ok(result_url) => {
                            summary.succeeded += 1;
                            on_event(BatchEvent::Succeeded {
                                key: key.clone(),
                                result_url,
                            });
                        }
                        Err(e) => {
                            let failure = ItemFailure::new(key.as_str(), &e);
                            if failure.kind == FailureKind::Cancelled {
                                summary.cancelled += 1;
                            } else {
                                summary.failed += 1;
                            }
                            warn!(key = %key, error = %e, "video task failed");
                            on_event(BatchEvent::Failed(failure));
                        }
                    }
                    on_event(BatchEvent::Progress { completed, total });
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "video batch finished"
        );
        Ok(summary)
    }

    #[instrument(skip_all, fields(key = %task.key))]
    async fn execute<N>(&self, task: &VideoTask, notify: N) -> Result<String>
    where
        N: Fn(BatchEvent),
    {
        task.validate()?;
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        notify(BatchEvent::Submitted {
            key: task.key.clone(),
        });
        let handle = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
            handle = self.backend.submit(task) => handle?,
        };
        info!(%handle, "video job submitted");

        notify(BatchEvent::Polling {
            key: task.key.clone(),
            handle: handle.clone(),
        });
        JobPoller::new(self.config.poll)
            .with_cancellation(self.cancel.clone())
            .poll(&self.backend, &handle)
            .await
    }
}
