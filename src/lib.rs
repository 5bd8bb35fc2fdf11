//! # Querywell
//!
//! > *Draw from the well once.*
//!
//! Wrap a data-access function in three layers:
//!
//! - **ConnectionScope**: open a handle, lend it to the call, always release it
//! - **RetryPolicy**: re-run failed attempts a bounded number of times with a
//!   fixed pause, and report exhaustion as an explicit error
//! - **ResultCache**: remember successful results per call key, where
//!   keyword-argument order does not matter
//!
//! [`QueryPipeline`] composes all three for one operation. The pieces are also
//! usable on their own.
//!
//! ## Quick Example
//!
//! ```rust
//! use querywell::testing::MockConnector;
//! use querywell::{Args, QueryPipeline, RetryPolicy, Value};
//! use std::time::Duration;
//!
//! let fetch_users = QueryPipeline::new(MockConnector::new(), "db/users.db", |_conn, _args: &Args| {
//!     Ok::<_, String>(vec![vec![Value::from("alice")]])
//! })
//! .with_retry(RetryPolicy::new(4, Duration::from_millis(10)));
//!
//! // first call runs the query
//! let users = fetch_users.call(&Args::query("SELECT * FROM users")).unwrap();
//! // second call is served from the cache
//! let users_again = fetch_users.call(&Args::query("SELECT * FROM users")).unwrap();
//!
//! assert_eq!(users, users_again);
//! assert_eq!(fetch_users.stats().hits, 1);
//! ```
//!
//! ## Features
//!
//! - `sqlite`: [`sqlite::SqliteConnector`] and row helpers on `rusqlite`
//! - `async`: [`retry::retry_async`] pausing with `tokio::time::sleep`
//! - `jitter`: proportional jitter on the retry delay
//! - `serde`: (de)serialize [`PipelineConfig`]

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cache;
pub mod config;
pub mod key;
pub mod pipeline;
pub mod retry;
pub mod scope;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod testing;
pub mod value;

// Re-exports
pub use cache::{CacheStats, ResultCache};
pub use config::{ConfigError, PipelineConfig};
pub use key::{Args, CallKey, KeyError};
pub use pipeline::{QueryError, QueryPipeline};
pub use retry::{RetryError, RetryExhausted, RetryPolicy};
pub use scope::{ConnectionScope, Connector, ScopeError};
pub use value::{Row, Rows, Value};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::ResultCache;
    pub use crate::key::Args;
    pub use crate::pipeline::{QueryError, QueryPipeline};
    pub use crate::retry::{RetryError, RetryPolicy};
    pub use crate::scope::{ConnectionScope, Connector};
    pub use crate::value::{Rows, Value};
}
