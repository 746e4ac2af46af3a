use std::time::Duration;

use huginn::RetryConfig;

#[test]
fn retry_config_defaults() {
    let config = RetryConfig::default();
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.max_attempts(), 4);
    assert_eq!(config.base_delay, Duration::from_secs(1));
    assert_eq!(config.max_delay, Duration::from_secs(30));
    assert_eq!(config.backoff_multiplier, 2.0);
    assert!(config.jitter);
}

#[test]
fn retry_config_builder() {
    let config = RetryConfig::new()
        .max_retries(5)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(10))
        .backoff_multiplier(3.0)
        .jitter(false);

    assert_eq!(config.max_retries, 5);
    assert_eq!(config.base_delay, Duration::from_millis(100));
    assert_eq!(config.max_delay, Duration::from_secs(10));
    assert_eq!(config.backoff_multiplier, 3.0);
    assert!(!config.jitter);
}

#[test]
fn retry_config_disabled() {
    let config = RetryConfig::disabled();
    assert_eq!(config.max_retries, 0);
    assert_eq!(config.max_attempts(), 1);
}

#[test]
fn retry_config_delay_calculation() {
    let config = RetryConfig::new()
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(10))
        .jitter(false);

    // Exponential backoff: 100ms, 200ms, 400ms, 800ms, ...
    assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
    assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
}

#[test]
fn retry_config_delay_capped_at_max() {
    let config = RetryConfig::new()
        .base_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(5))
        .jitter(false);

    // attempt 3 = 1 * 2^3 = 8s, but capped at 5s
    assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
}

#[test]
fn retry_config_respects_retry_after() {
    let config = RetryConfig::new()
        .base_delay(Duration::from_millis(100))
        .jitter(false);

    // server hint overrides calculated delay
    let delay = config.effective_delay(0, Some(Duration::from_secs(5)));
    assert_eq!(delay, Duration::from_secs(5));

    // without a hint, uses calculated delay
    let delay = config.effective_delay(0, None);
    assert_eq!(delay, Duration::from_millis(100));
}

#[test]
fn jittered_delay_is_never_below_backoff() {
    let config = RetryConfig::new().base_delay(Duration::from_millis(200));
    for attempt in 0..4 {
        let base = config.delay_for_attempt(attempt);
        let delay = config.effective_delay(attempt, None);
        assert!(delay >= base);
        assert!(delay <= base.mul_f64(1.1));
    }
}
