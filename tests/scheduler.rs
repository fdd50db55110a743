//! Tests for the task scheduler's ordering, concurrency bound, and
//! best-effort cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use marginalia::tasks::{TaskFailure, TaskScheduler, TaskSpec, TaskStatus};

#[tokio::test]
async fn results_keep_input_order_despite_completion_order() {
    let scheduler = TaskScheduler::new(4);

    let results = scheduler
        .run_concurrently(vec![
            TaskSpec::new("slow-a", async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(json!("A"))
            }),
            TaskSpec::new("fast-b", async { Ok(json!("B")) }),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].name, "slow-a");
    assert_eq!(results[0].result, Some(json!("A")));
    assert_eq!(results[1].name, "fast-b");
    assert_eq!(results[1].result, Some(json!("B")));
    // The fast task finished first even though it is reported second.
    assert!(results[1].completed_at.unwrap() <= results[0].completed_at.unwrap());
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limit() {
    let scheduler = TaskScheduler::new(10);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let specs: Vec<TaskSpec> = (0..20)
        .map(|i| {
            let current = current.clone();
            let peak = peak.clone();
            TaskSpec::new(format!("load-{i}"), async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(i))
            })
        })
        .collect();

    let results = scheduler.run_concurrently(specs).await;

    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|r| r.status == TaskStatus::Completed));
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 10, "peak concurrency was {peak}");
    assert!(peak > 1, "tasks never overlapped");
}

#[tokio::test]
async fn one_failing_spec_does_not_abort_the_batch() {
    let scheduler = TaskScheduler::new(4);

    let results = scheduler
        .run_concurrently(vec![
            TaskSpec::new("ok", async { Ok(json!(1)) }),
            TaskSpec::new("broken", async {
                Err::<serde_json::Value, TaskFailure>("index rebuild failed".into())
            }),
            TaskSpec::new("also-ok", async { Ok(json!(3)) }),
        ])
        .await;

    assert_eq!(results[0].status, TaskStatus::Completed);
    assert_eq!(results[1].status, TaskStatus::Failed);
    assert_eq!(results[1].error.as_deref(), Some("index rebuild failed"));
    assert_eq!(results[2].status, TaskStatus::Completed);
}

#[tokio::test]
async fn cancel_aborts_a_running_task() {
    let scheduler = Arc::new(TaskScheduler::new(2));

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .run("sleepy", async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(json!("never"))
                })
                .await
        })
    };

    // Wait until the task shows up as running, then cancel it.
    let task_id = loop {
        let running = scheduler
            .snapshot()
            .into_iter()
            .find(|record| record.status == TaskStatus::Running);
        if let Some(record) = running {
            break record.task_id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert!(scheduler.cancel(task_id));
    let result = runner.await.unwrap();
    assert_eq!(result.status, TaskStatus::Cancelled);
    assert_eq!(
        scheduler.status(task_id).unwrap(),
        TaskStatus::Cancelled
    );
}

#[tokio::test]
async fn cancel_of_finished_task_returns_false() {
    let scheduler = TaskScheduler::new(2);
    let result = scheduler.run("quick", async { Ok(json!(1)) }).await;
    assert!(!scheduler.cancel(result.task_id));
    // The record keeps its terminal state.
    assert_eq!(
        scheduler.status(result.task_id).unwrap(),
        TaskStatus::Completed
    );
}
