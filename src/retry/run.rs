//! Executing an operation under a [`RetryPolicy`].
//!
//! Attempts are strictly sequential. After a failed attempt the loop pauses
//! for the policy's delay and tries again, until an attempt succeeds, the
//! error is classified as non-retryable, or the attempt budget is spent.
//! The first success returns immediately.

use std::fmt::Debug;
use std::time::Instant;

use super::{RetryError, RetryEvent, RetryExhausted, RetryPolicy, Sleep, ThreadSleep};

/// Retry `op` on every failure.
///
/// # Example
///
/// ```rust
/// use querywell::retry::retry;
/// use querywell::RetryPolicy;
/// use std::time::Duration;
///
/// let mut calls = 0;
/// let result = retry(&RetryPolicy::new(3, Duration::ZERO), || {
///     calls += 1;
///     if calls < 3 { Err("database is locked") } else { Ok(vec!["alice"]) }
/// });
///
/// assert_eq!(result, Ok(vec!["alice"]));
/// assert_eq!(calls, 3);
/// ```
pub fn retry<T, E, F>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: Debug,
{
    retry_with(policy, &ThreadSleep, op, |_| true, |_| {})
}

/// Retry only when `is_retryable` returns true for the error.
///
/// Non-retryable errors return immediately as [`RetryError::Permanent`].
///
/// # Example
///
/// ```rust
/// use querywell::retry::{retry_if, RetryError};
/// use querywell::RetryPolicy;
/// use std::time::Duration;
///
/// #[derive(Debug, PartialEq)]
/// enum DbError { Locked, Syntax }
///
/// let result: Result<(), _> = retry_if(
///     &RetryPolicy::new(5, Duration::ZERO),
///     || Err(DbError::Syntax),
///     |e| matches!(e, DbError::Locked),
/// );
///
/// assert_eq!(result, Err(RetryError::Permanent { error: DbError::Syntax, attempt: 1 }));
/// ```
pub fn retry_if<T, E, F, P>(policy: &RetryPolicy, op: F, is_retryable: P) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: Debug,
{
    retry_with(policy, &ThreadSleep, op, is_retryable, |_| {})
}

/// Retry on every failure, reporting each failed attempt to `on_retry`.
///
/// The hook runs before the pause, including after the final attempt (with
/// `next_delay: None`).
pub fn retry_with_hooks<T, E, F, H>(
    policy: &RetryPolicy,
    op: F,
    on_retry: H,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    H: FnMut(&RetryEvent<'_, E>),
    E: Debug,
{
    retry_with(policy, &ThreadSleep, op, |_| true, on_retry)
}

/// The general retry loop: explicit sleeper, classifier and hook.
pub fn retry_with<T, E, F, P, H, S>(
    policy: &RetryPolicy,
    sleep: &S,
    mut op: F,
    is_retryable: P,
    mut on_retry: H,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    H: FnMut(&RetryEvent<'_, E>),
    S: Sleep + ?Sized,
    E: Debug,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match op() {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !is_retryable(&error) {
            tracing::warn!(attempt, ?error, "attempt failed with non-retryable error");
            return Err(RetryError::Permanent { error, attempt });
        }

        let next_delay = policy.jittered_delay_after(attempt);
        on_retry(&RetryEvent {
            attempt,
            error: &error,
            next_delay,
            elapsed: start.elapsed(),
        });

        match next_delay {
            Some(delay) => {
                tracing::warn!(attempt, ?error, ?delay, "attempt failed, retrying");
                sleep.sleep(delay);
            }
            None => {
                tracing::error!(attempt, ?error, "attempt failed, max retries exceeded");
                return Err(RetryError::Exhausted(RetryExhausted::new(
                    error,
                    attempt,
                    start.elapsed(),
                )));
            }
        }
    }
}

/// Async retry loop: `make_attempt` builds a fresh future per attempt and
/// pauses use [`tokio::time::sleep`].
///
/// # Example
///
/// ```rust
/// use querywell::retry::retry_async;
/// use querywell::RetryPolicy;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let result = retry_async(
///     &RetryPolicy::new(2, Duration::from_millis(1)),
///     || async { Ok::<_, String>(42) },
///     |_| true,
/// )
/// .await;
/// assert_eq!(result, Ok(42));
/// # });
/// ```
#[cfg(feature = "async")]
pub async fn retry_async<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut make_attempt: F,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Debug,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match make_attempt().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !is_retryable(&error) {
            tracing::warn!(attempt, ?error, "attempt failed with non-retryable error");
            return Err(RetryError::Permanent { error, attempt });
        }

        match policy.jittered_delay_after(attempt) {
            Some(delay) => {
                tracing::warn!(attempt, ?error, ?delay, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
            None => {
                tracing::error!(attempt, ?error, "attempt failed, max retries exceeded");
                return Err(RetryError::Exhausted(RetryExhausted::new(
                    error,
                    attempt,
                    start.elapsed(),
                )));
            }
        }
    }
}
