use std::time::Duration;

use crate::error::{GenerationError, Result};

/// Wait between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Status queries per job before giving up (5 minutes at the default interval).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// In-flight video jobs per batch.
pub const VIDEO_CONCURRENCY: usize = 8;

/// In-flight image generations per batch.
pub const IMAGE_CONCURRENCY: usize = 5;

/// In-flight image edits (restyle, try-on) per batch.
pub const IMAGE_EDIT_CONCURRENCY: usize = 3;

/// In-flight analysis requests per batch.
pub const ANALYSIS_CONCURRENCY: usize = 6;

/// Polling behaviour for a single long-running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before every status query.
    pub interval: Duration,
    /// Maximum number of status queries.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollConfig {
    /// Total wall-clock budget before a job is declared timed out.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`VideoTaskRunner`](crate::VideoTaskRunner).
///
/// Use [`RunnerConfig::builder()`] or [`RunnerConfig::default()`]
/// (8 concurrent jobs, 5 s interval, 60 attempts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum number of simultaneously unsettled tasks in one batch.
    pub concurrency: usize,
    pub poll: PollConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: VIDEO_CONCURRENCY,
            poll: PollConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(GenerationError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        self.poll.validate()
    }
}

/// Builder for [`RunnerConfig`].
#[derive(Default)]
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl RunnerConfigBuilder {
    /// Set the per-batch concurrency bound.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.config.concurrency = limit;
        self
    }

    /// Set the wait between status queries.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval = interval;
        self
    }

    /// Set the maximum number of status queries per job.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.poll.max_attempts = attempts;
        self
    }

    /// Build and validate the final [`RunnerConfig`].
    pub fn build(self) -> Result<RunnerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
