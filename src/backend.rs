use std::future::Future;

use crate::error::Result;
use crate::types::{JobHandle, JobStatus, VideoTask};

/// The two remote endpoints a video job goes through.
///
/// [`HttpVideoBackend`](crate::HttpVideoBackend) talks to the studio proxy;
/// tests and alternative providers implement this directly.
///
/// # Example
///
/// ```ignore
/// use studio_jobs::*;
///
/// struct Instant;
///
/// impl VideoBackend for Instant {
///     async fn submit(&self, task: &VideoTask) -> Result<JobHandle> {
///         Ok(JobHandle::new(task.key.clone()))
///     }
///
///     async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
///         Ok(JobStatus::Completed(vec![format!("https://cdn/{handle}.mp4")]))
///     }
/// }
/// ```
pub trait VideoBackend: Send + Sync {
    /// Submit one job. Failures here are never retried.
    fn submit(&self, task: &VideoTask) -> impl Future<Output = Result<JobHandle>> + Send;

    /// Query a job once.
    ///
    /// Return `Err` with a transient error (see
    /// [`GenerationError::is_transient`](crate::GenerationError::is_transient))
    /// when the query itself failed; the poller will try again.
    fn status(&self, handle: &JobHandle) -> impl Future<Output = Result<JobStatus>> + Send;
}

impl<B: VideoBackend> VideoBackend for std::sync::Arc<B> {
    fn submit(&self, task: &VideoTask) -> impl Future<Output = Result<JobHandle>> + Send {
        (**self).submit(task)
    }

    fn status(&self, handle: &JobHandle) -> impl Future<Output = Result<JobStatus>> + Send {
        (**self).status(handle)
    }
}
