//! Log inspection through the bounded pool.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tally_core::config::ReconcileConfig;
use tally_core::error::Error;
use tally_core::id::JobId;
use tally_core::jobs::JobStatus;
use tally_core::retry::RetryPolicy;
use tally_recon::{LogInspector, Reconciler};
use tally_test_utils::{
    CollaboratorOp, TestContext, TracingLogService, count_ops, describe_calls, log_reads,
};

const MARKER: &str = "finished downloading";

fn inspector(ctx: &TestContext, pool_size: usize, max_attempts: u32) -> LogInspector {
    let config = ReconcileConfig {
        pool_size,
        retry: RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(100)),
        ..ReconcileConfig::default()
    };
    Reconciler::new(ctx.store.clone(), ctx.queue.clone(), config)
        .unwrap()
        .log_inspector(ctx.logs.clone())
        .unwrap()
}

fn parent(ctx: &TestContext, size: u32) -> JobId {
    let url = ctx.put_manifest("run.txt", &["a"]);
    ctx.submit_array_job("parent", "run-2", size, JobStatus::Running, &url)
}

/// Seeds 20 children: 15 with streams in three shapes, 5 not yet started.
fn seed_twenty(ctx: &TestContext) -> JobId {
    let parent = parent(ctx, 20);
    for index in 0..20u32 {
        if index >= 15 {
            ctx.add_child(&parent, index, JobStatus::Runnable, None);
            continue;
        }
        let stream = format!("s{index}");
        ctx.add_child(&parent, index, JobStatus::Running, Some(&stream));
        match index % 3 {
            0 => ctx.set_log(&stream, &[&["finished downloading SRR1"], &["starting"]]),
            1 => ctx.set_log(&stream, &[&["aligning"], &["finished downloading SRR2"]]),
            _ => ctx.set_log(&stream, &[&["aligning"], &["starting"]]),
        }
    }
    parent
}

#[tokio::test]
async fn pool_answers_every_index_with_exact_call_counts() {
    let ctx = TestContext::new();
    let parent = seed_twenty(&ctx);
    ctx.queue.clear_operations();

    let results = inspector(&ctx, 12, 8)
        .inspect_indices(&parent, 0..20, MARKER)
        .await
        .unwrap();

    assert_eq!(results.len(), 20);
    for index in 0..20u32 {
        let expected = index < 15 && index % 3 != 2;
        assert_eq!(results[&index], expected, "index {index}");
    }

    // One describe per index.
    assert_eq!(describe_calls(&ctx.queue.operations()), 20);

    // Page reads: marker on page 1, marker on page 2, or two pages then the empty tail.
    let ops = ctx.logs.operations();
    for index in 0..15u32 {
        let expected = match index % 3 {
            0 => 1,
            1 => 2,
            _ => 3,
        };
        assert_eq!(log_reads(&ops, &format!("s{index}")), expected, "index {index}");
    }
    let total = count_ops(&ops, |op| matches!(op, CollaboratorOp::GetLogEvents { .. }));
    assert_eq!(total, 5 * (1 + 2 + 3));
}

#[tokio::test]
async fn search_job_returns_sorted_matches() {
    let ctx = TestContext::new();
    let parent = seed_twenty(&ctx);

    let found = inspector(&ctx, 4, 8).search_job(&parent, MARKER).await.unwrap();
    assert_eq!(found, vec![0, 1, 3, 4, 6, 7, 9, 10, 12, 13]);
}

#[tokio::test]
async fn search_job_requires_array_job() {
    let ctx = TestContext::new();
    let err = inspector(&ctx, 4, 8)
        .search_job(&JobId::new("nope").unwrap(), MARKER)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn throttled_pages_are_retried_with_same_token() {
    let ctx = TestContext::new();
    let parent = parent(&ctx, 1);
    ctx.add_child(&parent, 0, JobStatus::Running, Some("s0"));
    ctx.set_log("s0", &[&["aligning"], &["finished downloading"]]);
    ctx.logs.throttle_stream("s0", 2);

    let found = inspector(&ctx, 2, 8)
        .contains_marker(&parent, 0, MARKER)
        .await
        .unwrap();
    assert!(found);

    let tokens: Vec<Option<String>> = ctx
        .logs
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            CollaboratorOp::GetLogEvents { token, .. } => Some(token),
            _ => None,
        })
        .collect();
    // Two throttled first-page reads, the successful one, then page two.
    assert_eq!(tokens.len(), 4);
    assert!(tokens[..3].iter().all(Option::is_none));
    assert!(tokens[3].is_some());
}

#[tokio::test(start_paused = true)]
async fn persistent_throttling_exhausts_retries() {
    let ctx = TestContext::new();
    let parent = parent(&ctx, 2);
    ctx.add_child(&parent, 0, JobStatus::Running, Some("s0"));
    ctx.add_child(&parent, 1, JobStatus::Running, Some("s1"));
    ctx.set_log("s0", &[&["finished downloading"]]);
    ctx.set_log("s1", &[&["finished downloading"]]);
    ctx.logs.throttle_stream("s1", 1000);

    let err = inspector(&ctx, 2, 3)
        .search_indices(&parent, 0..2, MARKER)
        .await
        .unwrap_err();

    match err {
        Error::IndexFailed { index, source } => {
            assert_eq!(index, 1);
            assert!(matches!(
                *source,
                Error::RetriesExhausted { attempts: 3, .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log_reads(&ctx.logs.operations(), "s1"), 3);
}

#[tokio::test]
async fn non_throttling_failure_aborts_search() {
    let ctx = TestContext::new();
    let parent = parent(&ctx, 3);
    for index in 0..3 {
        let stream = format!("s{index}");
        ctx.add_child(&parent, index, JobStatus::Running, Some(&stream));
        ctx.set_log(&stream, &[&["ok"]]);
    }
    ctx.logs.inject_failure("s2");

    let err = inspector(&ctx, 3, 8)
        .search_indices(&parent, 0..3, MARKER)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IndexFailed { index: 2, .. }));
    assert_eq!(log_reads(&ctx.logs.operations(), "s2"), 1);
}

#[tokio::test(start_paused = true)]
async fn pool_bounds_concurrent_log_calls() {
    let ctx = TestContext {
        logs: Arc::new(TracingLogService::with_latency(Duration::from_millis(50))),
        ..TestContext::new()
    };
    let parent = parent(&ctx, 20);
    for index in 0..20 {
        let stream = format!("s{index}");
        ctx.add_child(&parent, index, JobStatus::Running, Some(&stream));
        ctx.set_log(&stream, &[&["finished downloading"]]);
    }

    let found = inspector(&ctx, 4, 8)
        .search_indices(&parent, 0..20, MARKER)
        .await
        .unwrap();

    assert_eq!(found.len(), 20);
    let peak = ctx.logs.max_in_flight();
    assert!(peak <= 4, "peak concurrency {peak} exceeded pool size");
    assert!(peak > 1, "inspections did not overlap");
}
