use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::VideoBackend;
use crate::config::PollConfig;
use crate::error::{GenerationError, Result};
use crate::types::{JobHandle, JobStatus};

/// Turns a submitted job into a single awaited outcome.
///
/// Each attempt waits [`PollConfig::interval`] and then queries the job once.
/// Transient query failures use up an attempt but keep polling; an explicit
/// error or a terminal status stops immediately.
#[derive(Debug, Clone)]
pub struct JobPoller {
    config: PollConfig,
    cancel: CancellationToken,
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::new(PollConfig::default())
    }
}

impl JobPoller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop polling at the next wait or status call once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `handle` until it yields a result URL, fails, or runs out of
    /// attempts.
    pub async fn poll<B>(&self, backend: &B, handle: &JobHandle) -> Result<String>
    where
        B: VideoBackend,
    {
        self.config.validate()?;
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            self.wait().await?;

            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
                reply = backend.status(handle) => reply,
            };

            match reply {
                Ok(JobStatus::Completed(urls)) => {
                    let Some(url) = urls.into_iter().next() else {
                        return Err(GenerationError::Rejected(
                            "Job completed without producing a video".into(),
                        ));
                    };
                    info!(%handle, attempt, "video job completed");
                    return Ok(url);
                }
                Ok(JobStatus::Processing) => {
                    debug!(%handle, attempt, max_attempts, "video job still generating");
                }
                Ok(JobStatus::Failed(reason)) => {
                    warn!(%handle, attempt, %reason, "video job failed");
                    return Err(GenerationError::Rejected(reason));
                }
                Ok(JobStatus::Ended(status)) => {
                    warn!(%handle, attempt, %status, "video job ended without output");
                    return Err(GenerationError::Rejected(format!(
                        "Job ended with status '{}' and no video",
                        status
                    )));
                }
                Err(e) if e.is_transient() => {
                    if attempt == max_attempts {
                        return Err(e);
                    }
                    warn!(%handle, attempt, error = %e, "status check failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(GenerationError::Timeout {
            budget: self.config.budget(),
        })
    }

    async fn wait(&self) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            _ = tokio::time::sleep(self.config.interval) => Ok(()),
        }
    }
}
