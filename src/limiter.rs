use std::future::Future;
use std::pin::pin;

use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::error::{GenerationError, Result};

/// A task that has just settled, with batch progress at that moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T> {
    /// Position of the task in the submitted list.
    pub index: usize,
    pub output: T,
    /// Number of settled tasks including this one.
    pub completed: usize,
    pub total: usize,
}

/// Runs independent async tasks with a fixed ceiling on how many are in
/// flight at once.
///
/// Tasks are admitted in list order; as soon as any admitted task settles
/// the next one starts. Tasks are polled inside the caller's future rather
/// than spawned, so a run is a single cooperative unit of work.
///
/// A task's failure is part of its output (typically a `Result`); the
/// limiter itself never stops early.
///
/// # Example
/// ```
/// use studio_jobs::ConcurrencyLimiter;
///
/// # async fn example() -> studio_jobs::Result<()> {
/// let limiter = ConcurrencyLimiter::new(2)?;
/// let tasks = (0..5).map(|i| move || async move { i * 10 });
/// let outputs = limiter
///     .run(tasks, |done, total| println!("{done}/{total}"))
///     .await;
/// assert_eq!(outputs, vec![0, 10, 20, 30, 40]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimiter {
    limit: usize,
}

impl ConcurrencyLimiter {
    /// `limit` must be at least 1.
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(GenerationError::InvalidConfig(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Stream of `(index, output)` pairs in settlement order.
    ///
    /// A task function is only called once the task is admitted.
    pub fn stream<I, F, Fut>(&self, tasks: I) -> impl Stream<Item = (usize, Fut::Output)>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        stream::iter(tasks.into_iter().enumerate())
            .map(|(index, task)| async move { (index, task().await) })
            .buffer_unordered(self.limit)
    }

    /// Drive every task to completion, handing each one to `on_settled` as
    /// it settles.
    pub async fn run_with<I, F, Fut, S>(&self, tasks: I, mut on_settled: S)
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future,
        S: FnMut(Settled<Fut::Output>),
    {
        let tasks: Vec<F> = tasks.into_iter().collect();
        let total = tasks.len();
        let mut completed = 0;

        debug!(total, limit = self.limit, "starting limited run");
        let mut settled = pin!(self.stream(tasks));
        while let Some((index, output)) = settled.next().await {
            completed += 1;
            debug!(index, completed, total, "task settled");
            on_settled(Settled {
                index,
                output,
                completed,
                total,
            });
        }
    }

    /// Drive every task to completion and return the outputs in submission
    /// order. `on_progress(completed, total)` fires once per settled task.
    pub async fn run<I, F, Fut, P>(&self, tasks: I, mut on_progress: P) -> Vec<Fut::Output>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future,
        P: FnMut(usize, usize),
    {
        let tasks: Vec<F> = tasks.into_iter().collect();
        let mut slots: Vec<Option<Fut::Output>> = tasks.iter().map(|_| None).collect();

        self.run_with(tasks, |settled| {
            on_progress(settled.completed, settled.total);
            slots[settled.index] = Some(settled.output);
        })
        .await;

        slots.into_iter().flatten().collect()
    }
}
