use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use huginn::{CircuitBreaker, HuginnError, Result};

const RESET: Duration = Duration::from_secs(60);

async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<()> {
    breaker
        .call(|| async {
            calls.fetch_add(1, Ordering::Relaxed);
            Err(HuginnError::Server {
                status: 503,
                message: "down".into(),
            })
        })
        .await
}

async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<()> {
    breaker
        .call(|| async {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn opens_after_threshold_and_fails_fast() {
    let breaker = CircuitBreaker::new("search", 3, RESET);
    let calls = AtomicU32::new(0);

    for _ in 0..3 {
        let _ = fail(&breaker, &calls).await;
    }
    assert!(breaker.is_open());
    assert_eq!(breaker.state().failure_count, 3);

    let err = succeed(&breaker, &calls).await.unwrap_err();
    assert!(matches!(err, HuginnError::CircuitOpen { ref label } if label == "search"));
    assert_eq!(calls.load(Ordering::Relaxed), 3, "open circuit must not call");
}

#[tokio::test(start_paused = true)]
async fn success_resets_failure_count() {
    let breaker = CircuitBreaker::new("note", 3, RESET);
    let calls = AtomicU32::new(0);

    let _ = fail(&breaker, &calls).await;
    let _ = fail(&breaker, &calls).await;
    succeed(&breaker, &calls).await.unwrap();
    let _ = fail(&breaker, &calls).await;

    assert!(!breaker.is_open());
    assert_eq!(breaker.state().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_do_not_count() {
    let breaker = CircuitBreaker::new("note", 2, RESET);

    for _ in 0..5 {
        let _: Result<()> = breaker.call(|| async { Err(HuginnError::Unauthorized) }).await;
    }

    assert!(!breaker.is_open());
    assert_eq!(breaker.state().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn half_open_trial_success_closes() {
    let breaker = CircuitBreaker::new("ping", 1, RESET);
    let calls = AtomicU32::new(0);
    let _ = fail(&breaker, &calls).await;
    assert!(breaker.is_open());

    tokio::time::advance(RESET + Duration::from_millis(1)).await;
    succeed(&breaker, &calls).await.unwrap();

    let state = breaker.state();
    assert!(!state.is_open);
    assert_eq!(state.failure_count, 0);
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[tokio::test(start_paused = true)]
async fn half_open_trial_failure_reopens() {
    let breaker = CircuitBreaker::new("ping", 1, RESET);
    let calls = AtomicU32::new(0);
    let _ = fail(&breaker, &calls).await;

    tokio::time::advance(RESET + Duration::from_millis(1)).await;
    let _ = fail(&breaker, &calls).await;
    assert!(breaker.is_open());

    // Fresh cooldown from the failed trial.
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(matches!(
        succeed(&breaker, &calls).await,
        Err(HuginnError::CircuitOpen { .. })
    ));
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[tokio::test(start_paused = true)]
async fn only_one_trial_while_half_open() {
    let breaker = CircuitBreaker::new("ping", 1, RESET);
    let calls = AtomicU32::new(0);
    let _ = fail(&breaker, &calls).await;
    tokio::time::advance(RESET + Duration::from_millis(1)).await;

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let trial = breaker.call(|| async {
        let _ = release_rx.await;
        Ok::<_, HuginnError>(())
    });
    let concurrent = async {
        tokio::task::yield_now().await;
        let second = succeed(&breaker, &calls).await;
        let _ = release_tx.send(());
        second
    };

    let (trial, second) = tokio::join!(trial, concurrent);
    assert!(trial.is_ok());
    assert!(matches!(second, Err(HuginnError::CircuitOpen { .. })));
    assert!(!breaker.is_open());
}

#[test]
fn reset_forces_closed() {
    let breaker = CircuitBreaker::new("x", 1, RESET);
    breaker.reset();
    assert!(!breaker.is_open());
    assert_eq!(breaker.label(), "x");
}
