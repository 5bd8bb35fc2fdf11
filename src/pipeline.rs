//! The composed call pipeline: scoped connection, bounded retry, result cache.
//!
//! [`QueryPipeline`] binds one data-access operation to its own
//! [`ResultCache`], a [`ConnectionScope`] and a [`RetryPolicy`]. A call runs:
//!
//! 1. derive the [`CallKey`](crate::CallKey) from the arguments, failing fast
//!    on [`KeyError`];
//! 2. look the key up in the cache, returning a hit without opening a
//!    connection;
//! 3. on a miss, acquire one handle, run the retry loop with that same handle
//!    for every attempt, and release it;
//! 4. store the value only if an attempt succeeded.
//!
//! ```rust
//! use querywell::testing::MockConnector;
//! use querywell::{Args, QueryPipeline, RetryPolicy, Value};
//! use std::time::Duration;
//!
//! let connector = MockConnector::new();
//! let users = QueryPipeline::new(connector.clone(), "db/users.db", |_conn, args: &Args| {
//!     let sql = args.get("query").and_then(Value::as_text).unwrap_or_default();
//!     Ok::<_, String>(vec![vec![Value::from(sql)]])
//! })
//! .with_retry(RetryPolicy::new(3, Duration::ZERO));
//!
//! let first = users.call(&Args::query("SELECT * FROM users")).unwrap();
//! let again = users.call(&Args::query("SELECT * FROM users")).unwrap();
//!
//! assert_eq!(first, again);
//! assert_eq!(connector.acquired(), 1); // the second call never connected
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::cache::{CacheStats, ResultCache};
use crate::config::{ConfigError, PipelineConfig};
use crate::key::{Args, KeyError};
use crate::retry::{retry_with, RetryError, RetryExhausted, RetryPolicy, Sleep, ThreadSleep};
use crate::scope::{ConnectionScope, Connector, ScopeError};

type Classifier<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// A data-access operation wrapped in connection scoping, retry and caching.
///
/// `F` is called as `operation(&mut handle, &args)`.
pub struct QueryPipeline<C, F, V, E> {
    scope: ConnectionScope<C>,
    policy: RetryPolicy,
    sleep: Box<dyn Sleep + Send + Sync>,
    is_retryable: Option<Classifier<E>>,
    operation: F,
    cache: ResultCache<V>,
    _error: PhantomData<fn() -> E>,
}

/// Why a pipeline call produced no value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError<E, A> {
    /// The arguments could not be turned into a cache key. Nothing ran.
    Key(KeyError),
    /// The connection could not be opened. Nothing ran.
    Acquire(A),
    /// Every allowed attempt failed.
    Exhausted(RetryExhausted<E>),
    /// An attempt failed with an error classified as non-retryable.
    Permanent {
        /// The non-retryable error.
        error: E,
        /// The attempt that produced it (1-indexed).
        attempt: u32,
    },
}

impl<E, A> QueryError<E, A> {
    /// Returns true if the retry budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, QueryError::Exhausted(_))
    }

    /// Attempts made; zero when the operation never ran.
    pub fn attempts(&self) -> u32 {
        match self {
            QueryError::Key(_) | QueryError::Acquire(_) => 0,
            QueryError::Exhausted(e) => e.attempts,
            QueryError::Permanent { attempt, .. } => *attempt,
        }
    }

    /// The operation's last error, if it ran at all.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            QueryError::Exhausted(e) => Some(&e.final_error),
            QueryError::Permanent { error, .. } => Some(error),
            QueryError::Key(_) | QueryError::Acquire(_) => None,
        }
    }
}

impl<E, A> From<KeyError> for QueryError<E, A> {
    fn from(e: KeyError) -> Self {
        QueryError::Key(e)
    }
}

impl<E, A> From<ScopeError<RetryError<E>, A>> for QueryError<E, A> {
    fn from(e: ScopeError<RetryError<E>, A>) -> Self {
        match e {
            ScopeError::Acquire(a) => QueryError::Acquire(a),
            ScopeError::Use(RetryError::Exhausted(x)) => QueryError::Exhausted(x),
            ScopeError::Use(RetryError::Permanent { error, attempt }) => {
                QueryError::Permanent { error, attempt }
            }
        }
    }
}

impl<E: fmt::Display, A: fmt::Display> fmt::Display for QueryError<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Key(e) => write!(f, "invalid call arguments: {}", e),
            QueryError::Acquire(e) => write!(f, "could not open connection: {}", e),
            QueryError::Exhausted(e) => write!(f, "{}", e),
            QueryError::Permanent { error, attempt } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempt, error)
            }
        }
    }
}

impl<E, A> std::error::Error for QueryError<E, A>
where
    E: std::error::Error + 'static,
    A: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Key(e) => Some(e),
            QueryError::Acquire(e) => Some(e),
            QueryError::Exhausted(e) => Some(&e.final_error),
            QueryError::Permanent { error, .. } => Some(error),
        }
    }
}

impl<C, F, V, E> QueryPipeline<C, F, V, E>
where
    C: Connector,
    F: Fn(&mut C::Handle, &Args) -> Result<V, E>,
{
    /// Wrap `operation` with a connection scope for `location`, the default
    /// [`RetryPolicy`], and a fresh cache.
    pub fn new(connector: C, location: impl Into<String>, operation: F) -> Self {
        QueryPipeline {
            scope: ConnectionScope::new(connector, location),
            policy: RetryPolicy::default(),
            sleep: Box::new(ThreadSleep),
            is_retryable: None,
            operation,
            cache: ResultCache::new(),
            _error: PhantomData,
        }
    }

    /// Build a pipeline from validated configuration.
    pub fn from_config(
        config: &PipelineConfig,
        connector: C,
        operation: F,
    ) -> Result<Self, ConfigError> {
        let policy = config.retry_policy()?;
        Ok(Self::new(connector, config.location.clone(), operation).with_retry(policy))
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace how the retry loop pauses.
    pub fn with_sleep<S>(mut self, sleep: S) -> Self
    where
        S: Sleep + Send + Sync + 'static,
    {
        self.sleep = Box::new(sleep);
        self
    }

    /// Retry only errors for which `is_retryable` returns true.
    ///
    /// Without a classifier every error is retried.
    pub fn retry_if<P>(mut self, is_retryable: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Some(Box::new(is_retryable));
        self
    }

    /// Run the pipeline for `args`.
    pub fn call(&self, args: &Args) -> Result<V, QueryError<E, C::Error>>
    where
        V: Clone,
        E: fmt::Debug,
    {
        let key = args.key()?;
        let span = tracing::debug_span!("query", key = %key, location = %self.scope.location());
        let _entered = span.enter();

        self.cache.get_or_try_insert_with(&key, || {
            self.scope
                .run(|handle| {
                    retry_with(
                        &self.policy,
                        &*self.sleep,
                        || (self.operation)(&mut *handle, args),
                        |e| self.is_retryable.as_ref().is_none_or(|p| p(e)),
                        |_| {},
                    )
                })
                .map_err(QueryError::from)
        })
    }

    /// The pipeline's result cache.
    pub fn cache(&self) -> &ResultCache<V> {
        &self.cache
    }

    /// Hit/miss counters of the cache.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The connection scope.
    pub fn scope(&self) -> &ConnectionScope<C> {
        &self.scope
    }
}

impl<C, F, V, E> fmt::Debug for QueryPipeline<C, F, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("scope", &self.scope)
            .field("policy", &self.policy)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
