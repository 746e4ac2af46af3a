//! Tests for gateway admission control.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use huginn::{GatewayConfig, GatewayStatus, HuginnError, RequestGateway, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_test::task;
use tokio_test::{assert_pending, assert_ready};

/// Let spawned tasks run until they block.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Submit an operation that blocks until `gate` has a permit.
fn spawn_blocked(
    gateway: &RequestGateway,
    gate: &Arc<Semaphore>,
    log: &Arc<Mutex<Vec<&'static str>>>,
    name: &'static str,
) -> JoinHandle<Result<&'static str>> {
    let gateway = gateway.clone();
    let gate = Arc::clone(gate);
    let log = Arc::clone(log);
    tokio::spawn(async move {
        gateway
            .submit(|| async move {
                log.lock().unwrap().push(name);
                let _permit = gate.acquire().await.map_err(|_| HuginnError::Cancelled)?;
                Ok(name)
            })
            .await
    })
}

fn setup() -> (Arc<Semaphore>, Arc<Mutex<Vec<&'static str>>>) {
    (Arc::new(Semaphore::new(0)), Arc::new(Mutex::new(Vec::new())))
}

#[tokio::test]
async fn admits_up_to_max_concurrent_and_queues_the_rest() {
    let gateway = RequestGateway::new(GatewayConfig::new().max_concurrent(2));
    let (gate, log) = setup();

    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| spawn_blocked(&gateway, &gate, &log, name))
        .collect();
    settle().await;

    assert_eq!(
        gateway.status(),
        GatewayStatus {
            queue_length: 1,
            active_requests: 2,
            requests_in_last_minute: 2,
        }
    );
    assert_eq!(log.lock().unwrap().len(), 2);

    gate.add_permits(10);
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    let status = gateway.status();
    assert_eq!(status.active_requests, 0);
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.requests_in_last_minute, 3);
}

#[tokio::test]
async fn queued_requests_run_in_fifo_order() {
    let gateway = RequestGateway::new(GatewayConfig::new().max_concurrent(1));
    let (gate, log) = setup();

    let mut handles = Vec::new();
    for name in ["first", "second", "third", "fourth"] {
        handles.push(spawn_blocked(&gateway, &gate, &log, name));
        settle().await;
    }
    assert_eq!(gateway.status().queue_length, 3);

    gate.add_permits(10);
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(
        *log.lock().unwrap(),
        vec!["first", "second", "third", "fourth"]
    );
}

#[tokio::test(start_paused = true)]
async fn rate_cap_delays_admission_until_window_frees() {
    let gateway = RequestGateway::new(
        GatewayConfig::new()
            .max_concurrent(10)
            .max_per_minute(2),
    );
    let start = tokio::time::Instant::now();

    gateway.submit(|| async { Ok(()) }).await.unwrap();
    gateway.submit(|| async { Ok(()) }).await.unwrap();

    let third = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway
                .submit(|| async { Ok(tokio::time::Instant::now()) })
                .await
        })
    };
    settle().await;
    let status = gateway.status();
    assert_eq!(status.queue_length, 1);
    assert_eq!(status.requests_in_last_minute, 2);

    let admitted_at = third.await.unwrap().unwrap();
    assert!(admitted_at.duration_since(start) >= Duration::from_secs(60));
}

#[tokio::test]
async fn clear_queue_cancels_only_queued_requests() {
    let gateway = RequestGateway::new(GatewayConfig::new().max_concurrent(1));
    let (gate, log) = setup();

    let active = spawn_blocked(&gateway, &gate, &log, "active");
    settle().await;
    let queued: Vec<_> = ["q1", "q2"]
        .into_iter()
        .map(|name| spawn_blocked(&gateway, &gate, &log, name))
        .collect();
    settle().await;

    assert_eq!(gateway.clear_queue(), 2);
    for handle in queued {
        assert!(matches!(handle.await.unwrap(), Err(HuginnError::Cancelled)));
    }

    let status = gateway.status();
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.active_requests, 1);

    gate.add_permits(1);
    assert_eq!(active.await.unwrap().unwrap(), "active");
    assert_eq!(*log.lock().unwrap(), vec!["active"]);
}

#[tokio::test]
async fn dropped_waiter_does_not_leak_a_slot() {
    let gateway = RequestGateway::new(GatewayConfig::new().max_concurrent(1));
    let (gate, log) = setup();

    let active = spawn_blocked(&gateway, &gate, &log, "active");
    settle().await;
    let abandoned = spawn_blocked(&gateway, &gate, &log, "abandoned");
    settle().await;
    abandoned.abort();
    let _ = abandoned.await;

    let next = spawn_blocked(&gateway, &gate, &log, "next");
    settle().await;

    gate.add_permits(10);
    active.await.unwrap().unwrap();
    assert_eq!(next.await.unwrap().unwrap(), "next");

    assert_eq!(*log.lock().unwrap(), vec!["active", "next"]);
    assert_eq!(gateway.status().active_requests, 0);
}

#[tokio::test]
async fn queued_submit_is_woken_when_a_slot_frees() {
    let gateway = RequestGateway::new(GatewayConfig::new().max_concurrent(1));
    let (gate, log) = setup();

    let active = spawn_blocked(&gateway, &gate, &log, "active");
    settle().await;

    let mut queued = task::spawn(gateway.submit(|| async { Ok(7) }));
    assert_pending!(queued.poll());
    assert_eq!(gateway.status().queue_length, 1);

    gate.add_permits(1);
    active.await.unwrap().unwrap();

    assert!(queued.is_woken());
    assert_eq!(assert_ready!(queued.poll()).unwrap(), 7);
}

#[tokio::test]
async fn slot_is_released_when_operation_fails() {
    let gateway = RequestGateway::new(GatewayConfig::new().max_concurrent(1));

    let result: Result<()> = gateway
        .submit(|| async { Err(HuginnError::Timeout) })
        .await;
    assert!(result.is_err());

    assert_eq!(gateway.status().active_requests, 0);
    assert!(gateway.submit(|| async { Ok(()) }).await.is_ok());
}

#[test]
fn default_limits() {
    let config = GatewayConfig::default();
    assert_eq!(config.max_concurrent, 5);
    assert_eq!(config.max_per_minute, 60);
    assert_eq!(config.window, Duration::from_secs(60));
}
