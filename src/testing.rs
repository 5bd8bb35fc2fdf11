//! Testing utilities for code built on querywell.
//!
//! - [`MockConnector`]: an in-memory [`Connector`] that counts acquires and
//!   releases and can be told to fail either one
//! - [`RecordingSleep`]: a [`Sleep`] that records requested pauses instead of
//!   blocking, so retry schedules can be asserted exactly
//! - [`assert_exhausted!`](crate::assert_exhausted) and
//!   [`assert_cached!`](crate::assert_cached) assertion macros
//!
//! # Example
//!
//! ```rust
//! use querywell::testing::{MockConnector, RecordingSleep};
//! use querywell::{Args, QueryPipeline, RetryPolicy};
//! use std::time::Duration;
//!
//! let connector = MockConnector::new();
//! let sleep = RecordingSleep::new();
//!
//! let pipeline = QueryPipeline::new(connector.clone(), "users.db", |_conn, _args: &Args| {
//!     Err::<Vec<i64>, _>("database is locked")
//! })
//! .with_retry(RetryPolicy::new(3, Duration::from_secs(1)))
//! .with_sleep(sleep.clone());
//!
//! querywell::assert_exhausted!(pipeline.call(&Args::query("SELECT 1")), 3);
//! assert_eq!(sleep.delays(), vec![Duration::from_secs(1); 2]);
//! assert_eq!(connector.released(), 1);
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::retry::Sleep;
use crate::scope::Connector;

/// In-memory connector with acquire/release counters.
///
/// Clones share counters, so keep a clone to inspect after handing one to a
/// scope or pipeline.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    counters: Arc<Counters>,
    fail_connect: Option<String>,
    fail_release: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU32,
    released: AtomicU32,
}

/// Handle produced by [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConnection {
    /// Location the handle was opened for.
    pub location: String,
    /// 1-based sequence number of this handle.
    pub id: u32,
    /// Free-form log operations may append to.
    pub executed: Vec<String>,
}

impl MockConnector {
    /// A connector whose connect and release always succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose `connect` fails with `message`.
    pub fn failing_connect(message: impl Into<String>) -> Self {
        Self {
            fail_connect: Some(message.into()),
            ..Self::default()
        }
    }

    /// A connector whose `release` fails with `message`.
    pub fn failing_release(message: impl Into<String>) -> Self {
        Self {
            fail_release: Some(message.into()),
            ..Self::default()
        }
    }

    /// Handles opened so far.
    pub fn acquired(&self) -> u32 {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    /// Handles released so far (including failed releases).
    pub fn released(&self) -> u32 {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Handles currently open.
    pub fn open(&self) -> u32 {
        self.acquired() - self.released()
    }
}

impl Connector for MockConnector {
    type Handle = MockConnection;
    type Error = String;

    fn connect(&self, location: &str) -> Result<MockConnection, String> {
        if let Some(message) = &self.fail_connect {
            return Err(message.clone());
        }
        let id = self.counters.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            location: location.to_string(),
            id,
            executed: Vec::new(),
        })
    }

    fn release(&self, _handle: MockConnection) -> Result<(), String> {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        match &self.fail_release {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }
}

/// Records pauses instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleep {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleep {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of pauses requested.
    pub fn count(&self) -> usize {
        self.delays().len()
    }

    /// Sum of all requested pauses.
    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

impl Sleep for RecordingSleep {
    fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Assert that a result failed because the retry budget ran out after
/// exactly `attempts` attempts.
///
/// Works with any error exposing `is_exhausted()` and `attempts()`, i.e.
/// [`RetryError`](crate::RetryError) and [`QueryError`](crate::QueryError).
#[macro_export]
macro_rules! assert_exhausted {
    ($result:expr, $attempts:expr) => {
        match $result {
            Err(e) if e.is_exhausted() => {
                assert_eq!(e.attempts(), $attempts, "unexpected attempt count");
            }
            Err(e) => panic!("Expected exhausted retries, got error: {:?}", e),
            Ok(v) => panic!("Expected exhausted retries, got Ok: {:?}", v),
        }
    };
}

/// Assert that a [`ResultCache`](crate::ResultCache) holds `value` for the
/// key derived from `args`.
#[macro_export]
macro_rules! assert_cached {
    ($cache:expr, $args:expr, $value:expr) => {
        match $args.key() {
            Ok(key) => match $cache.get(&key) {
                Some(v) => assert_eq!(v, $value),
                None => panic!("Expected cache entry for {}, found none", key),
            },
            Err(e) => panic!("Cannot derive cache key: {}", e),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Args, ResultCache};

    #[test]
    fn mock_connector_counts_and_numbers_handles() {
        let connector = MockConnector::new();
        let a = connector.connect("a.db").unwrap();
        let b = connector.connect("b.db").unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(connector.open(), 2);

        connector.release(a).unwrap();
        assert_eq!(connector.open(), 1);
        assert_eq!(connector.released(), 1);
    }

    #[test]
    fn mock_connector_failures() {
        assert_eq!(
            MockConnector::failing_connect("nope").connect("x"),
            Err("nope".to_string())
        );

        let connector = MockConnector::failing_release("locked");
        let handle = connector.connect("x").unwrap();
        assert_eq!(connector.release(handle), Err("locked".to_string()));
        assert_eq!(connector.released(), 1);
    }

    #[test]
    fn clones_share_counters() {
        let connector = MockConnector::new();
        let clone = connector.clone();
        let handle = clone.connect("x").unwrap();
        clone.release(handle).unwrap();
        assert_eq!(connector.acquired(), 1);
        assert_eq!(connector.released(), 1);
    }

    #[test]
    fn recording_sleep_records_without_blocking() {
        let sleep = RecordingSleep::new();
        sleep.sleep(Duration::from_secs(3600));
        sleep.sleep(Duration::from_secs(1));
        assert_eq!(sleep.count(), 2);
        assert_eq!(sleep.total(), Duration::from_secs(3601));
    }

    #[test]
    fn assert_cached_macro() {
        let cache = ResultCache::new();
        let args = Args::query("SELECT 1");
        let key = args.key().unwrap();
        cache.get_or_try_insert_with(&key, || Ok::<_, ()>(1)).unwrap();
        assert_cached!(cache, args, 1);
    }

    #[test]
    #[should_panic(expected = "Expected cache entry")]
    fn assert_cached_panics_when_absent() {
        let cache: ResultCache<i32> = ResultCache::new();
        assert_cached!(cache, Args::query("SELECT 1"), 1);
    }

    #[test]
    #[should_panic(expected = "Expected exhausted retries, got Ok")]
    fn assert_exhausted_panics_on_success() {
        let result: Result<i32, crate::RetryError<String>> = Ok(1);
        assert_exhausted!(result, 1);
    }
}
