//! Integration tests for retry functionality.

use super::*;
use crate::testing::RecordingSleep;
use std::cell::Cell;
use std::time::{Duration, Instant};
use tracing_test::traced_test;

/// Operation failing `failures` times, counting calls in `attempts`.
fn failing_then<'a>(
    attempts: &'a Cell<u32>,
    failures: u32,
) -> impl FnMut() -> Result<Vec<(&'static str,)>, String> + 'a {
    move || {
        let n = attempts.get() + 1;
        attempts.set(n);
        if n <= failures {
            Err(format!("database is locked (attempt {})", n))
        } else {
            Ok(vec![("alice",)])
        }
    }
}

#[test]
fn test_single_attempt_always_failing() {
    let attempts = Cell::new(0);
    let sleep = RecordingSleep::new();

    let result = retry_with(
        &RetryPolicy::new(1, Duration::ZERO),
        &sleep,
        failing_then(&attempts, u32::MAX),
        |_| true,
        |_| {},
    );

    crate::assert_exhausted!(result, 1);
    assert_eq!(attempts.get(), 1);
    assert_eq!(sleep.count(), 0);
}

#[test]
fn test_succeeds_on_third_attempt() {
    let attempts = Cell::new(0);
    let sleep = RecordingSleep::new();

    let result = retry_with(
        &RetryPolicy::new(3, Duration::ZERO),
        &sleep,
        failing_then(&attempts, 2),
        |_| true,
        |_| {},
    );

    assert_eq!(result, Ok(vec![("alice",)]));
    assert_eq!(attempts.get(), 3);
    assert_eq!(sleep.count(), 2);
}

#[test]
fn test_exhaustion_reports_final_error_and_delays() {
    let attempts = Cell::new(0);
    let sleep = RecordingSleep::new();

    let result = retry_with(
        &RetryPolicy::new(4, Duration::from_secs(3)),
        &sleep,
        failing_then(&attempts, u32::MAX),
        |_| true,
        |_| {},
    );

    match result {
        Err(RetryError::Exhausted(exhausted)) => {
            assert_eq!(exhausted.attempts, 4);
            assert_eq!(exhausted.final_error, "database is locked (attempt 4)");
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(sleep.delays(), vec![Duration::from_secs(3); 3]);
    assert_eq!(sleep.total(), Duration::from_secs(9));
}

#[test]
fn test_first_success_stops_immediately() {
    let attempts = Cell::new(0);
    let sleep = RecordingSleep::new();

    let result = retry_with(
        &RetryPolicy::new(10, Duration::from_secs(1)),
        &sleep,
        failing_then(&attempts, 0),
        |_| true,
        |_| {},
    );

    assert!(result.is_ok());
    assert_eq!(attempts.get(), 1);
    assert_eq!(sleep.count(), 0);
}

#[test]
fn test_retry_if_skips_non_retryable_errors() {
    #[derive(Debug, PartialEq, Clone)]
    #[allow(dead_code)]
    enum TestError {
        Transient,
        Permanent,
    }

    let attempts = Cell::new(0);
    let result: Result<(), _> = retry_if(
        &RetryPolicy::new(5, Duration::ZERO),
        || {
            attempts.set(attempts.get() + 1);
            Err(TestError::Permanent)
        },
        |err| matches!(err, TestError::Transient),
    );

    assert_eq!(
        result,
        Err(RetryError::Permanent {
            error: TestError::Permanent,
            attempt: 1
        })
    );
    assert_eq!(attempts.get(), 1);
}

#[test]
fn test_retry_if_retries_transient_errors() {
    #[derive(Debug, PartialEq, Clone)]
    enum TestError {
        Transient,
        Permanent,
    }

    let attempts = Cell::new(0);
    let result = retry_if(
        &RetryPolicy::new(5, Duration::ZERO),
        || {
            let n = attempts.get() + 1;
            attempts.set(n);
            match n {
                1 | 2 => Err(TestError::Transient),
                3 => Err(TestError::Permanent),
                _ => Ok("unreachable"),
            }
        },
        |err| matches!(err, TestError::Transient),
    );

    assert_eq!(result.unwrap_err().attempts(), 3);
    assert_eq!(attempts.get(), 3);
}

#[test]
fn test_retry_with_hooks_sees_every_failure() {
    let attempts = Cell::new(0);
    let mut events = Vec::new();

    let result = retry_with_hooks(
        &RetryPolicy::new(3, Duration::ZERO),
        failing_then(&attempts, u32::MAX),
        |event: &RetryEvent<'_, String>| {
            events.push((event.attempt, event.next_delay, event.error.clone()));
        },
    );

    assert!(result.is_err());
    assert_eq!(
        events,
        vec![
            (1, Some(Duration::ZERO), "database is locked (attempt 1)".to_string()),
            (2, Some(Duration::ZERO), "database is locked (attempt 2)".to_string()),
            (3, None, "database is locked (attempt 3)".to_string()),
        ]
    );
}

#[test]
fn test_plain_retry_really_sleeps() {
    let attempts = Cell::new(0);
    let start = Instant::now();

    let result = retry(
        &RetryPolicy::new(3, Duration::from_millis(10)),
        failing_then(&attempts, 2),
    );

    assert!(result.is_ok());
    assert!(
        start.elapsed() >= Duration::from_millis(20),
        "Expected at least 20ms, got {:?}",
        start.elapsed()
    );
}

#[test]
fn test_zero_retries_still_attempts_once() {
    let attempts = Cell::new(0);
    let result = retry_with(
        &RetryPolicy::new(0, Duration::from_secs(1)),
        &RecordingSleep::new(),
        failing_then(&attempts, u32::MAX),
        |_| true,
        |_| {},
    );

    crate::assert_exhausted!(result, 1);
}

#[test]
fn test_nan_jitter_keeps_fixed_schedule() {
    let attempts = Cell::new(0);
    let sleep = RecordingSleep::new();

    let result = retry_with(
        &RetryPolicy::new(3, Duration::from_millis(100)).with_jitter(f64::NAN),
        &sleep,
        failing_then(&attempts, u32::MAX),
        |_| true,
        |_| {},
    );

    crate::assert_exhausted!(result, 3);
    assert_eq!(sleep.delays(), vec![Duration::from_millis(100); 2]);
}

#[traced_test]
#[test]
fn test_failures_are_logged() {
    let attempts = Cell::new(0);
    let _ = retry_with(
        &RetryPolicy::new(2, Duration::ZERO),
        &RecordingSleep::new(),
        failing_then(&attempts, u32::MAX),
        |_| true,
        |_| {},
    );

    assert!(logs_contain("attempt failed, retrying"));
    assert!(logs_contain("max retries exceeded"));
}

#[cfg(feature = "async")]
mod async_tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_async_retry_succeeds_on_third_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = retry_async(
            &RetryPolicy::new(5, Duration::from_millis(1)),
            || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient failure")
                    } else {
                        Ok("success")
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_async_retry_exhausted_returns_final_error() {
        let result = retry_async(
            &RetryPolicy::new(3, Duration::from_millis(1)),
            || async { Err::<(), _>("always fails") },
            |_| true,
        )
        .await;

        let exhausted = result.unwrap_err();
        assert!(exhausted.is_exhausted());
        assert_eq!(exhausted.attempts(), 3);
        assert_eq!(exhausted.into_error(), "always fails");
    }

    #[tokio::test]
    async fn test_async_retry_if_skips_non_retryable() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = retry_async(
            &RetryPolicy::new(5, Duration::from_millis(1)),
            || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("no such table: users")
                }
            },
            |e| e.contains("locked"),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Permanent { attempt: 1, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_retry_waits_between_attempts() {
        let start = Instant::now();
        let attempts = Arc::new(AtomicU32::new(0));

        let _ = retry_async(
            &RetryPolicy::new(3, Duration::from_millis(10)),
            || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("retry")
                }
            },
            |_| true,
        )
        .await;

        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
