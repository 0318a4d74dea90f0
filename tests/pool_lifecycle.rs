#![cfg(unix)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use common::{emit, init_tracing, sh};
use forq::{EventKind, HandlerFn, Pool, PoolConfig, PoolStatus, WorkerSpec};

fn fast(cfg: PoolConfig) -> PoolConfig {
    cfg.with_poll_frequency(Duration::from_millis(20))
}

#[tokio::test]
async fn ten_workers_run_to_completion() {
    init_tracing();
    let cfg = fast(PoolConfig::new().with_concurrency(4))
        .with_workers((0..10).map(|_| sh("exit 0")));
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;
    assert_eq!(pool.finished().await, PoolStatus::Completed);

    let forks = pool.forks().await;
    assert_eq!(forks.len(), 10);
    assert!(forks.iter().all(|h| h.is_terminated()));
    assert_eq!(pool.active_forks().await, 0);
    assert!(pool.errors().await.values().all(|errs| errs.is_empty()));
}

#[tokio::test]
async fn finished_message_terminates_cleanly() {
    init_tracing();
    // The worker reports "finished" and then lingers; the pool must not wait
    // for the process to exit on its own.
    let script = format!("{}; sleep 5", emit("finished", "null"));
    let cfg = fast(PoolConfig::new()).worker(sh(&script).with_id("lingerer"));
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;
    let status = tokio::time::timeout(Duration::from_secs(3), pool.finished())
        .await
        .expect("pool should finish well before the worker's sleep");
    assert_eq!(status, PoolStatus::Completed);
    assert!(pool.errors().await["lingerer"].is_empty());
}

#[tokio::test]
async fn rerun_starts_from_a_clean_registry() {
    init_tracing();
    let cfg = fast(PoolConfig::new().with_concurrency(4))
        .with_workers((0..10).map(|_| sh("exit 0")));
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;
    assert_eq!(pool.finished().await, PoolStatus::Completed);

    pool.run().await;
    assert_eq!(pool.finished().await, PoolStatus::Completed);

    // Handles from the first run do not leak into the second.
    assert_eq!(pool.forks().await.len(), 10);
}

#[tokio::test]
async fn caller_ids_are_reusable_after_kill_all() {
    init_tracing();
    let cfg = fast(PoolConfig::new().with_concurrency(1))
        .worker(sh("sleep 10").with_id("alpha"));
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.active_forks().await, 1);

    // Queue a replacement under the same id, then clear the way for it.
    pool.add_task(sh("exit 0").with_id("alpha")).await;
    pool.kill_all().await;

    assert_eq!(pool.finished().await, PoolStatus::Completed);
    let ids: Vec<String> = pool
        .forks()
        .await
        .iter()
        .map(|h| h.id().to_string())
        .collect();
    // kill_all freed the id, so the replacement kept it instead of falling
    // back to a generated one.
    assert_eq!(ids, vec!["alpha".to_string(), "alpha".to_string()]);
    assert!(pool.errors().await["alpha"].is_empty());
}

#[tokio::test]
async fn rerun_supersedes_an_in_flight_run() {
    init_tracing();
    let cfg = fast(PoolConfig::new().with_concurrency(1))
        .with_workers((0..3).map(|_| sh("sleep 0.2")));
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;
    // First worker admitted, two still queued behind the limit.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.active_forks().await, 1);

    pool.run().await;
    assert_eq!(pool.finished().await, PoolStatus::Completed);
    // Only the new run's workers registered; the superseded run's queued
    // jobs resolved without spawning.
    assert_eq!(pool.forks().await.len(), 3);
}

#[tokio::test]
async fn custom_handlers_mutate_the_shared_bucket() {
    init_tracing();
    let script = format!("{}; {}", emit("tally", "1"), emit("finished", "null"));
    let cfg = fast(PoolConfig::new().with_concurrency(2))
        .with_workers((0..4).map(|_| sh(&script)))
        .on(
            "tally",
            HandlerFn::arc(|ctx: forq::HandlerCtx, data: Value| async move {
                let n = data.as_i64().unwrap_or(0);
                ctx.update(|d| {
                    let total = d.get("total").and_then(Value::as_i64).unwrap_or(0);
                    d.insert("total".to_string(), Value::from(total + n));
                })
                .await;
            }),
        );
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;
    assert_eq!(pool.finished().await, PoolStatus::Completed);
    assert_eq!(pool.data().await.get("total"), Some(&Value::from(4)));
}

#[tokio::test]
async fn tasks_added_mid_run_join_the_same_run() {
    init_tracing();
    let cfg = fast(PoolConfig::new().with_concurrency(2))
        .with_workers((0..2).map(|_| sh("sleep 0.3")));
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;

    let outcome = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&outcome);
    pool.add_task_with(sh("exit 0").with_id("late"), move |err| {
        seen.store(if err.is_none() { 1 } else { 2 }, Ordering::SeqCst);
    })
    .await;

    assert_eq!(pool.finished().await, PoolStatus::Completed);
    assert_eq!(pool.forks().await.len(), 3);
    assert_eq!(outcome.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limit() {
    init_tracing();
    let cfg = fast(PoolConfig::new().with_concurrency(2))
        .with_workers((0..6).map(|_| sh("sleep 0.2")));
    let pool = Pool::new(cfg).unwrap();
    assert!(pool.concurrency_limit() <= 2);

    let mut events = pool.subscribe();
    pool.run().await;
    assert_eq!(pool.finished().await, PoolStatus::Completed);

    // Replay the run from the event stream: spawns and terminations are
    // globally ordered by seq, so the running count is exact.
    let mut running = 0usize;
    let mut peak = 0usize;
    let mut finished = false;
    while !finished {
        let ev = events.recv().await.unwrap();
        match ev.kind {
            EventKind::WorkerSpawned => {
                running += 1;
                peak = peak.max(running);
            }
            EventKind::WorkerTerminated => running -= 1,
            EventKind::PoolFinished => finished = true,
            EventKind::WorkerErrored => {}
        }
    }
    assert!(peak <= pool.concurrency_limit(), "peak was {peak}");
}

#[tokio::test]
async fn requested_worker_ids_are_honored() {
    init_tracing();
    let cfg = fast(PoolConfig::new())
        .worker(sh("exit 0").with_id("alpha"))
        .worker(sh("exit 0").with_id("alpha"))
        .worker(WorkerSpec::new("/bin/sh").arg("-c").arg("exit 0"));
    let pool = Pool::new(cfg).unwrap();

    pool.run().await;
    assert_eq!(pool.finished().await, PoolStatus::Completed);

    let ids: Vec<String> = pool
        .forks()
        .await
        .iter()
        .map(|h| h.id().to_string())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&"alpha".to_string()));
    // The duplicate and the anonymous spec got generated ids.
    assert_eq!(ids.iter().filter(|id| *id == "alpha").count(), 1);
}
