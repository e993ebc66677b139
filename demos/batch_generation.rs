//! Runs a small video batch against an in-memory backend.
//!
//! ```bash
//! RUST_LOG=studio_jobs=debug cargo run --example batch_generation
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use studio_jobs::*;
use tracing_subscriber::EnvFilter;

/// Pretends to render: each job needs a few status checks, and prompts that
/// mention "gore" are refused by the safety filter.
#[derive(Default)]
struct SimulatedStudio {
    remaining: Mutex<HashMap<String, u32>>,
    refused: Mutex<HashMap<String, String>>,
}

impl VideoBackend for SimulatedStudio {
    async fn submit(&self, task: &VideoTask) -> Result<JobHandle> {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let id = format!("job-{}", task.key);
        if task.prompt.contains("gore") {
            if let Ok(mut refused) = self.refused.lock() {
                refused.insert(id.clone(), "Prompt rejected by safety system".into());
            }
        }
        if let Ok(mut remaining) = self.remaining.lock() {
            remaining.insert(id.clone(), 1 + (task.key.len() as u32 % 3));
        }
        Ok(JobHandle::new(id))
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let refused = self
            .refused
            .lock()
            .ok()
            .and_then(|r| r.get(handle.as_str()).cloned());
        if let Some(reason) = refused {
            return Ok(JobStatus::Failed(reason));
        }
        let mut remaining = self
            .remaining
            .lock()
            .map_err(|_| GenerationError::Other("job table poisoned".into()))?;
        let left = remaining
            .get_mut(handle.as_str())
            .ok_or_else(|| GenerationError::Rejected(format!("Unknown job {handle}")))?;
        if *left == 0 {
            return Ok(JobStatus::Completed(vec![format!(
                "https://cdn.example.com/{handle}.mp4"
            )]));
        }
        *left -= 1;
        Ok(JobStatus::Processing)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("studio_jobs=info")),
        )
        .init();

    let config = RunnerConfig::builder()
        .with_concurrency(2)
        .with_poll_interval(Duration::from_millis(200))
        .with_max_attempts(10)
        .build()?;
    let runner = VideoTaskRunner::new(SimulatedStudio::default()).with_config(config);

    let tasks = vec![
        VideoTask::from_image("look-1", "https://img.example.com/1.png", "model turns slowly"),
        VideoTask::from_image("look-2", "https://img.example.com/2.png", "")
            .aspect_ratio(AspectRatio::Portrait),
        VideoTask::from_image("look-3", "https://img.example.com/3.png", "gore close-up"),
        VideoTask::from_frames(
            "transition-1",
            "https://img.example.com/1.png",
            "https://img.example.com/2.png",
            "morph between outfits",
        )
        .duration_secs(8),
    ];

    let mut tracker = BatchTracker::from_tasks(&tasks)?;
    let summary = runner
        .run_batch(tasks.clone(), |event| {
            match &event {
                BatchEvent::Succeeded { key, result_url } => println!("✓ {key}: {result_url}"),
                BatchEvent::Failed(failure) => println!("✗ {}", failure.user_message()),
                BatchEvent::Progress { completed, total } => println!("  {completed}/{total}"),
                _ => {}
            }
            tracker.apply(&event);
        })
        .await?;

    println!(
        "\n{} succeeded, {} failed, {} cancelled in {}ms",
        summary.succeeded, summary.failed, summary.cancelled, summary.duration_ms
    );
    println!("Failed items: {:?}", tracker.keys_with_status(ItemStatus::Failed));
    println!("{}", serde_json::to_string_pretty(&tracker)?);

    Ok(())
}
