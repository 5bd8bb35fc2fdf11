//! Error types for retry operations.

use std::time::Duration;

/// Every allowed attempt failed.
///
/// Contains the final error along with metadata about the retry sequence.
///
/// # Examples
///
/// ```rust
/// use querywell::retry::{retry_with, RetryError};
/// use querywell::testing::RecordingSleep;
/// use querywell::RetryPolicy;
/// use std::time::Duration;
///
/// let sleep = RecordingSleep::new();
/// let result: Result<(), _> = retry_with(
///     &RetryPolicy::new(3, Duration::from_secs(2)),
///     &sleep,
///     || Err("database is locked"),
///     |_| true,
///     |_| {},
/// );
///
/// match result {
///     Err(RetryError::Exhausted(exhausted)) => {
///         assert_eq!(exhausted.final_error, "database is locked");
///         assert_eq!(exhausted.attempts, 3);
///     }
///     other => panic!("expected exhaustion, got {:?}", other),
/// }
/// assert_eq!(sleep.count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt.
    pub final_error: E,
    /// Total number of attempts made.
    pub attempts: u32,
    /// Total time spent, pauses included.
    pub total_duration: Duration,
}

impl<E> RetryExhausted<E> {
    /// Create a new RetryExhausted error.
    pub fn new(final_error: E, attempts: u32, total_duration: Duration) -> Self {
        Self {
            final_error,
            attempts,
            total_duration,
        }
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.final_error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.final_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "retry exhausted after {} attempts ({:?}): {}",
            self.attempts, self.total_duration, self.final_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.final_error)
    }
}

/// Why a retried operation produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error.
    Exhausted(RetryExhausted<E>),
    /// An attempt failed with an error the policy does not retry.
    Permanent {
        /// The non-retryable error.
        error: E,
        /// The attempt that produced it (1-indexed).
        attempt: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted(e) => e.attempts,
            RetryError::Permanent { attempt, .. } => *attempt,
        }
    }

    /// Returns true if the retry budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted(_))
    }

    /// Get a reference to the last underlying error.
    pub fn error(&self) -> &E {
        match self {
            RetryError::Exhausted(e) => &e.final_error,
            RetryError::Permanent { error, .. } => error,
        }
    }

    /// Extract the last underlying error.
    pub fn into_error(self) -> E {
        match self {
            RetryError::Exhausted(e) => e.final_error,
            RetryError::Permanent { error, .. } => error,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted(e) => write!(f, "{}", e),
            RetryError::Permanent { error, attempt } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempt, error)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error())
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_retry_exhausted_display() {
        let err = RetryExhausted::new("connection failed", 3, Duration::from_millis(500));
        let display = format!("{}", err);
        assert!(display.contains("retry exhausted"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("connection failed"));
    }

    #[test]
    fn test_retry_exhausted_into_error() {
        let err = RetryExhausted::new("test error", 5, Duration::from_secs(1));
        assert_eq!(err.into_error(), "test error");
    }

    #[test]
    fn test_retry_error_accessors() {
        let exhausted = RetryError::Exhausted(RetryExhausted::new("busy", 4, Duration::ZERO));
        assert!(exhausted.is_exhausted());
        assert_eq!(exhausted.attempts(), 4);
        assert_eq!(exhausted.error(), &"busy");

        let permanent = RetryError::Permanent {
            error: "syntax error",
            attempt: 1,
        };
        assert!(!permanent.is_exhausted());
        assert_eq!(permanent.attempts(), 1);
        assert_eq!(permanent.into_error(), "syntax error");
    }

    #[test]
    fn test_retry_error_display() {
        let permanent = RetryError::Permanent {
            error: "no such table: users",
            attempt: 2,
        };
        assert_eq!(
            permanent.to_string(),
            "non-retryable failure on attempt 2: no such table: users"
        );
    }

    #[test]
    fn test_retry_error_source_chain() {
        use std::error::Error;
        let io = std::io::Error::other("disk I/O error");
        let err = RetryError::Exhausted(RetryExhausted::new(io, 2, Duration::ZERO));
        assert_eq!(err.source().unwrap().to_string(), "disk I/O error");
    }
}
