// Start/stop behaviour of the real background loop.
// Simulated time comes from a ManualClock; the loop itself ticks every 10ms.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::config::SchedulerConfig;
use cadence_scheduler::{HandlerResult, ManualClock, Scheduler, TaskHandler, TaskInvocation};
use chrono::{TimeZone, Utc};
use serde_json::Map;

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval_ms: 10,
        utc_offset_minutes: Some(0),
        ..SchedulerConfig::default()
    }
}

fn counting_handler() -> (Arc<dyn TaskHandler>, Arc<AtomicUsize>) {
    let fires = Arc::new(AtomicUsize::new(0));
    let counter = fires.clone();
    let handler: Arc<dyn TaskHandler> = Arc::new(move |_: &TaskInvocation| -> HandlerResult {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (handler, fires)
}

/// Poll until `fires` reaches `expected`, failing after two seconds.
async fn wait_for(fires: &AtomicUsize, expected: usize) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while fires.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "expected {expected} fires, saw {}",
        fires.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn loop_fires_due_task() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()));
    let scheduler = Scheduler::with_clock(&fast_config(), clock.clone());
    let (handler, fires) = counting_handler();
    assert!(scheduler.add_task("heartbeat", handler, "every 1 minute", "ping", Map::new()));

    scheduler.start().await;
    assert!(scheduler.is_running());

    clock.advance(chrono::Duration::minutes(1));
    wait_for(&fires, 1).await;

    // The clock is frozen, so the task is not due again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1);

    scheduler.stop().await;
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn no_fires_while_stopped_and_resume_after_start() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()));
    let scheduler = Scheduler::with_clock(&fast_config(), clock.clone());
    let (handler, fires) = counting_handler();
    scheduler.add_task("sync", handler, "every 1 minute", "sync", Map::new());

    scheduler.start().await;
    clock.advance(chrono::Duration::minutes(1));
    wait_for(&fires, 1).await;

    scheduler.stop().await;
    clock.advance(chrono::Duration::minutes(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 1, "fired while stopped");

    // One catch-up fire, then the next run is a minute past the simulated now.
    scheduler.start().await;
    wait_for(&fires, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fires.load(Ordering::SeqCst), 2);

    scheduler.stop().await;
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let scheduler = Scheduler::new(&fast_config());

    // stopping a stopped scheduler is a no-op
    scheduler.stop().await;
    assert!(!scheduler.is_running());

    scheduler.start().await;
    scheduler.start().await;
    assert!(scheduler.is_running());

    scheduler.stop().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn tasks_can_be_managed_while_running() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()));
    let scheduler = Arc::new(Scheduler::with_clock(&fast_config(), clock.clone()));
    scheduler.start().await;

    let mut workers = Vec::new();
    for n in 0..8 {
        let scheduler = scheduler.clone();
        workers.push(tokio::spawn(async move {
            let (handler, _) = counting_handler();
            let id = format!("task-{n}");
            assert!(scheduler.add_task(&id, handler, "every 5 minutes", "t", Map::new()));
            if n % 2 == 0 {
                assert!(scheduler.remove_task(&id));
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let tasks = scheduler.get_tasks();
    assert_eq!(tasks.len(), 4);
    assert!(tasks.values().all(|d| d == "every 5 minutes"));

    scheduler.stop().await;
}

#[tokio::test]
async fn slow_handler_does_not_block_control_surface() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()));
    let scheduler = Scheduler::with_clock(&fast_config(), clock.clone());
    let started = Arc::new(AtomicUsize::new(0));
    let flag = started.clone();
    let slow: Arc<dyn TaskHandler> = Arc::new(move |_: &TaskInvocation| -> HandlerResult {
        flag.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
    });
    scheduler.add_task("slow", slow, "every 1 minute", "t", Map::new());
    scheduler.start().await;
    clock.advance(chrono::Duration::minutes(1));
    wait_for(&started, 1).await;

    // The handler is still sleeping; the table stays responsive.
    let (handler, _) = counting_handler();
    assert!(scheduler.add_task("fast", handler, "every 1 hour", "t", Map::new()));
    assert_eq!(scheduler.get_tasks().len(), 2);

    // stop waits for the in-flight handler, then no further fires happen.
    scheduler.stop().await;
    clock.advance(chrono::Duration::hours(2));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abandoned_stop_does_not_report_running() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()));
    let scheduler = Scheduler::with_clock(&fast_config(), clock.clone());
    let started = Arc::new(AtomicUsize::new(0));
    let flag = started.clone();
    let slow: Arc<dyn TaskHandler> = Arc::new(move |_: &TaskInvocation| -> HandlerResult {
        flag.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
    });
    scheduler.add_task("slow", slow, "every 1 minute", "t", Map::new());
    scheduler.start().await;
    clock.advance(chrono::Duration::minutes(1));
    wait_for(&started, 1).await;

    // The join is still waiting on the handler when the caller gives up.
    let gave_up = tokio::time::timeout(Duration::from_millis(20), scheduler.stop()).await;
    assert!(gave_up.is_err());
    assert!(!scheduler.is_running());

    // A fresh start still works afterwards.
    scheduler.start().await;
    assert!(scheduler.is_running());
    scheduler.stop().await;
    assert!(!scheduler.is_running());
}
