
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use studio_jobs::*;
use test_helpers::*;

async fn collect(
    runner: &VideoTaskRunner<Arc<FakeBackend>>,
    tasks: Vec<VideoTask>,
) -> (BatchSummary, Vec<BatchEvent>) {
    let mut events = Vec::new();
    let summary = runner
        .run_batch(tasks, |event| events.push(event))
        .await
        .unwrap();
    (summary, events)
}

fn runner(
    backend: &Arc<FakeBackend>,
    concurrency: usize,
    max_attempts: u32,
) -> VideoTaskRunner<Arc<FakeBackend>> {
    VideoTaskRunner::new(Arc::clone(backend)).with_config(config(concurrency, max_attempts))
}

#[tokio::test(start_paused = true)]
async fn test_batch_all_succeed() {
    init_tracing();
    let backend = Arc::new(
        FakeBackend::new()
            .script("a", vec![Reply::Generating, Reply::Done(video_url("a"))])
            .script(
                "c",
                vec![Reply::Generating, Reply::Generating, Reply::Done(video_url("c"))],
            ),
    );
    let runner = runner(&backend, 2, 10);
    let tasks: Vec<_> = ["a", "b", "c", "d"].iter().map(|k| task(k)).collect();

    let (summary, events) = collect(&runner, tasks).await;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 0);
    for key in ["a", "b", "c", "d"] {
        assert!(events.iter().any(|e| matches!(
            e,
            BatchEvent::Succeeded { key: k, result_url }
                if k == key && *result_url == video_url(key)
        )));
    }
    assert_eq!(backend.submits(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_never_exceeds_limit() {
    let mut backend = FakeBackend::new();
    let keys: Vec<String> = (0..7).map(|i| format!("item-{i}")).collect();
    for key in &keys {
        backend = backend.script(
            key,
            vec![Reply::Generating, Reply::Generating, Reply::Done(video_url(key))],
        );
    }
    let backend = Arc::new(backend);
    let runner = runner(&backend, 3, 10);

    let (summary, _) = collect(&runner, keys.iter().map(|k| task(k)).collect()).await;

    assert_eq!(summary.succeeded, 7);
    assert_eq!(backend.peak_in_flight(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_every_task_settles_exactly_once() {
    let backend = Arc::new(
        FakeBackend::new()
            .script("fails", vec![Reply::Error("Generation failed upstream".into())])
            .script("stalls", vec![Reply::Generating])
            .script(
                "flaky",
                vec![
                    Reply::Malformed,
                    Reply::Unavailable(503),
                    Reply::Done(video_url("flaky")),
                ],
            )
            .reject_submit("rejected", "Quota exceeded"),
    );
    let runner = runner(&backend, 2, 4);
    let mut tasks: Vec<_> = ["ok", "fails", "stalls", "flaky", "rejected"]
        .iter()
        .map(|k| task(k))
        .collect();
    tasks.push(VideoTask::from_image("no-prompt", "https://img.test/x.png", ""));

    let (summary, events) = collect(&runner, tasks).await;

    let mut terminal_per_key: HashMap<&str, usize> = HashMap::new();
    for event in terminal(&events) {
        *terminal_per_key.entry(event.key().unwrap()).or_default() += 1;
    }
    assert_eq!(terminal_per_key.len(), 6);
    assert!(terminal_per_key.values().all(|&n| n == 1));

    assert_eq!(summary.total, 6);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 4);
    assert_eq!(summary.succeeded + summary.failed + summary.cancelled, summary.total);
}

#[tokio::test(start_paused = true)]
async fn test_progress_reported_once_per_task_in_order() {
    let backend = Arc::new(FakeBackend::new().script("b", vec![Reply::Error("boom".into())]));
    let runner = runner(&backend, 2, 3);
    let tasks: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|k| task(k)).collect();

    let (_, events) = collect(&runner, tasks).await;

    let progress: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { completed, total } => Some((*completed, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, (1..=5).map(|n| (n, 5)).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_one_failure_does_not_affect_siblings() {
    let backend = Arc::new(FakeBackend::new().script("c", vec![Reply::Error("boom".into())]));
    let runner = runner(&backend, 2, 3);
    let tasks: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|k| task(k)).collect();

    let (summary, events) = collect(&runner, tasks).await;

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    let failures: Vec<&ItemFailure> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Failed(f) => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].key, "c");
    assert_eq!(failures[0].reason, "boom");
    assert_eq!(failures[0].to_string(), "Failed on c: boom");
}

#[tokio::test(start_paused = true)]
async fn test_three_item_scenario() {
    let backend = Arc::new(
        FakeBackend::new()
            .submit_delay("a.png", Duration::from_millis(10))
            .submit_delay("c.png", Duration::from_millis(5)),
    );
    let runner = runner(&backend, 2, 5);
    let tasks = vec![
        task("a.png"),
        VideoTask::from_image("b.png", "https://img.test/b.png", ""),
        task("c.png"),
    ];

    let (summary, events) = collect(&runner, tasks).await;
    let settled = terminal(&events);

    assert_eq!(settled.len(), 3);
    match settled[0] {
        BatchEvent::Failed(failure) => {
            assert_eq!(failure.key, "b.png");
            assert_eq!(failure.reason, "Prompt is required for video generation");
            assert_eq!(failure.kind, FailureKind::Generic);
        }
        other => panic!("Expected the missing-prompt failure first, got {other:?}"),
    }
    assert!(settled[1..]
        .iter()
        .all(|e| matches!(e, BatchEvent::Succeeded { .. })));
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    // The invalid item never reaches the backend.
    assert_eq!(backend.submits(), 2);
    assert!(!events
        .iter()
        .any(|e| matches!(e, BatchEvent::Submitted { key } if key == "b.png")));
}

#[tokio::test(start_paused = true)]
async fn test_stage_events_precede_terminal_event() {
    let backend = Arc::new(
        FakeBackend::new().script("a", vec![Reply::Generating, Reply::Done(video_url("a"))]),
    );
    let runner = runner(&backend, 1, 5);

    let (_, events) = collect(&runner, vec![task("a")]).await;

    assert!(matches!(&events[0], BatchEvent::Submitted { key } if key == "a"));
    assert!(matches!(
        &events[1],
        BatchEvent::Polling { key, handle } if key == "a" && handle.as_str() == "job-a"
    ));
    assert!(matches!(&events[2], BatchEvent::Succeeded { key, .. } if key == "a"));
    assert!(matches!(&events[3], BatchEvent::Progress { completed: 1, total: 1 }));
    assert_eq!(events.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_is_not_retried() {
    let backend = Arc::new(FakeBackend::new().reject_submit("a", "Invalid image URL"));
    let runner = runner(&backend, 2, 5);

    let (summary, events) = collect(&runner, vec![task("a")]).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(backend.submits(), 1);
    assert_eq!(backend.status_calls("a"), 0);
    assert!(matches!(
        terminal(&events)[0],
        BatchEvent::Failed(f) if f.reason == "Invalid image URL"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_content_safety_failure_is_classified() {
    let backend = Arc::new(
        FakeBackend::new().script(
            "a",
            vec![Reply::Error("Input image flagged by NSFW filter".into())],
        ),
    );
    let runner = runner(&backend, 1, 5);

    let (_, events) = collect(&runner, vec![task("a")]).await;

    match terminal(&events)[0] {
        BatchEvent::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::ContentSafety);
            assert!(failure.user_message().contains("Try another image or prompt."));
        }
        other => panic!("Expected failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reported_per_item() {
    let backend = Arc::new(FakeBackend::new().script("slow", vec![Reply::Generating]));
    let runner = runner(&backend, 2, 5);

    let (summary, events) = collect(&runner, vec![task("slow"), task("fast")]).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(backend.status_calls("slow"), 5);
    match terminal(&events)
        .into_iter()
        .find(|e| e.key() == Some("slow"))
        .unwrap()
    {
        BatchEvent::Failed(failure) => {
            assert_eq!(failure.reason, "Video generation timed out after 50ms");
        }
        other => panic!("Expected timeout failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_and_batch_classify_identically() {
    let cases = vec![
        vec![Reply::Done(video_url("x"))],
        vec![Reply::Error("X".into())],
        vec![Reply::Status("cancelled".into())],
        vec![Reply::Generating],
        vec![Reply::Malformed],
        vec![Reply::Error("Blocked by content policy".into())],
    ];

    for script in cases {
        let single = runner(&Arc::new(FakeBackend::new().script("x", script.clone())), 1, 3);
        let single_outcome = single.generate_one(&task("x")).await;

        let batch = runner(&Arc::new(FakeBackend::new().script("x", script.clone())), 1, 3);
        let (_, events) = collect(&batch, vec![task("x")]).await;

        match (single_outcome, terminal(&events)[0]) {
            (Ok(url), BatchEvent::Succeeded { result_url, .. }) => assert_eq!(&url, result_url),
            (Err(e), BatchEvent::Failed(failure)) => {
                assert_eq!(&ItemFailure::new("x", &e), failure, "script {script:?}")
            }
            (single, batch) => panic!("Outcomes diverged for {script:?}: {single:?} vs {batch:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_generate_one_validates_before_submitting() {
    let backend = Arc::new(FakeBackend::new());
    let runner = runner(&backend, 1, 3);

    let err = runner
        .generate_one(&VideoTask::from_frames("t", "https://img.test/a.png", "", "morph"))
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Validation(_)));
    assert_eq!(backend.submits(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_settles_remaining_tasks() {
    let backend = Arc::new(
        FakeBackend::new()
            .script("a", vec![Reply::Generating])
            .script("b", vec![Reply::Generating]),
    );
    let token = CancellationToken::new();
    let runner = runner(&backend, 1, 100).with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        token.cancel();
    });

    let tasks: Vec<_> = ["a", "b", "c"].iter().map(|k| task(k)).collect();
    let (summary, events) = collect(&runner, tasks).await;
    canceller.await.unwrap();

    assert_eq!(summary.cancelled, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(backend.submits(), 1);
    assert!(backend.status_calls("a") <= 3);
    let settled = terminal(&events);
    assert_eq!(settled.len(), 3);
    for event in settled {
        match event {
            BatchEvent::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Cancelled);
                assert_eq!(
                    failure.user_message(),
                    format!("Generation for {} was cancelled.", failure.key)
                );
            }
            other => panic!("Expected cancellation, got {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_keys_rejected_before_any_work() {
    let backend = Arc::new(FakeBackend::new());
    let runner = runner(&backend, 2, 3);
    let mut calls = 0;

    let err = runner
        .run_batch(vec![task("a"), task("b"), task("a")], |_| calls += 1)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::InvalidBatch(_)));
    assert_eq!(calls, 0);
    assert_eq!(backend.submits(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_batch() {
    let backend = Arc::new(FakeBackend::new());
    let runner = runner(&backend, 2, 3);

    let (summary, events) = collect(&runner, Vec::new()).await;

    assert_eq!(summary.total, 0);
    assert!(events.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tracker_follows_batch_and_retries_failed_subset() {
    let backend = Arc::new(
        FakeBackend::new()
            .script("b", vec![Reply::Error("busy".into()), Reply::Done(video_url("b"))]),
    );
    let runner = runner(&backend, 2, 3);
    let tasks: Vec<_> = ["a", "b", "c"].iter().map(|k| task(k)).collect();
    let mut tracker = BatchTracker::from_tasks(&tasks).unwrap();

    runner
        .run_batch(tasks.clone(), |event| {
            tracker.apply(&event);
        })
        .await
        .unwrap();

    assert!(tracker.is_settled());
    assert_eq!(tracker.keys_with_status(ItemStatus::Failed), vec!["b".to_string()]);
    assert_eq!(tracker.get("a").unwrap().result_url.as_deref(), Some(video_url("a").as_str()));

    let retry = tracker.retry_tasks(&tasks).unwrap();
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].key, "b");

    runner
        .run_batch(retry, |event| {
            tracker.apply(&event);
        })
        .await
        .unwrap();

    let summary = tracker.summary();
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(backend.submits(), 4);
    assert!(tracker.retry_failed().is_err());
}
