//! Bounded, fixed-delay retry for fallible operations.
//!
//! - **Pure Core**: [`RetryPolicy`] is just data (attempt budget, delay, jitter)
//! - **Explicit failure**: running out of attempts is a [`RetryError::Exhausted`],
//!   never an empty or stale value
//! - **Classified**: [`retry_if`] takes a predicate so permanent errors fail fast;
//!   [`retry`] retries everything
//!
//! # Quick Start
//!
//! ```rust
//! use querywell::retry::retry;
//! use querywell::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(4, Duration::from_millis(10));
//! let rows = retry(&policy, || Ok::<_, String>(vec![("alice",)]));
//! assert_eq!(rows, Ok(vec![("alice",)]));
//! ```
//!
//! # Error Types
//!
//! - [`RetryExhausted`]: every attempt failed; holds the final error and metadata
//! - [`RetryError`]: exhaustion or a non-retryable failure

mod error;
mod policy;
mod run;
mod sleep;

pub use error::{RetryError, RetryExhausted};
pub use policy::{JitterStrategy, RetryEvent, RetryPolicy};
#[cfg(feature = "async")]
pub use run::retry_async;
pub use run::{retry, retry_if, retry_with, retry_with_hooks};
pub use sleep::{Sleep, ThreadSleep};

#[cfg(test)]
mod tests;
