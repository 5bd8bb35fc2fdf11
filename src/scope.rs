//! Scoped acquisition of a connection handle.
//!
//! A [`ConnectionScope`] opens a handle through its [`Connector`], lends it to
//! an operation, and releases it on every exit path: success, error, or
//! panic. There is exactly one acquire and one release per [`run`](ConnectionScope::run),
//! however many times the operation retries inside it.
//!
//! ```rust
//! use querywell::{ConnectionScope, Connector};
//!
//! struct Files;
//!
//! impl Connector for Files {
//!     type Handle = Vec<String>;
//!     type Error = String;
//!
//!     fn connect(&self, location: &str) -> Result<Self::Handle, Self::Error> {
//!         Ok(vec![format!("opened {}", location)])
//!     }
//!
//!     fn release(&self, _handle: Self::Handle) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! let scope = ConnectionScope::new(Files, "db/users.db");
//! let log = scope.run(|h| Ok::<_, String>(h.clone())).unwrap();
//! assert_eq!(log, vec!["opened db/users.db".to_string()]);
//! ```

use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

/// Opens and closes handles for a resource location (a path or DSN).
pub trait Connector {
    /// The open connection.
    type Handle;
    /// Failure to open or close a handle.
    type Error: fmt::Debug;

    /// Open a handle for `location`.
    fn connect(&self, location: &str) -> Result<Self::Handle, Self::Error>;

    /// Close a handle. Called exactly once per successful [`connect`](Self::connect).
    fn release(&self, handle: Self::Handle) -> Result<(), Self::Error>;
}

/// A connector bound to the location it opens.
pub struct ConnectionScope<C> {
    connector: C,
    location: String,
}

/// Which phase of a scoped run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError<E, A> {
    /// The handle could not be opened; the operation never ran.
    Acquire(A),
    /// The operation failed; the handle was released afterwards.
    Use(E),
}

impl<E, A> ScopeError<E, A> {
    /// Returns the acquire error, if any.
    pub fn acquire_error(&self) -> Option<&A> {
        match self {
            ScopeError::Acquire(e) => Some(e),
            ScopeError::Use(_) => None,
        }
    }

    /// Returns the use error, if any.
    pub fn use_error(&self) -> Option<&E> {
        match self {
            ScopeError::Use(e) => Some(e),
            ScopeError::Acquire(_) => None,
        }
    }
}

impl<E: fmt::Display, A: fmt::Display> fmt::Display for ScopeError<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Acquire(e) => write!(f, "acquire failed: {}", e),
            ScopeError::Use(e) => write!(f, "{}", e),
        }
    }
}

impl<E, A> std::error::Error for ScopeError<E, A>
where
    E: std::error::Error + 'static,
    A: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScopeError::Acquire(e) => Some(e),
            ScopeError::Use(e) => Some(e),
        }
    }
}

impl<C: Connector> ConnectionScope<C> {
    /// Bind `connector` to `location`.
    pub fn new(connector: C, location: impl Into<String>) -> Self {
        ConnectionScope {
            connector,
            location: location.into(),
        }
    }

    /// The location handles are opened for.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The underlying connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Acquire a handle, run `f` with it, and release it.
    ///
    /// Release failures are logged and never replace `f`'s result. If `f`
    /// panics the handle is released before the panic resumes.
    pub fn run<T, E, F>(&self, f: F) -> Result<T, ScopeError<E, C::Error>>
    where
        F: FnOnce(&mut C::Handle) -> Result<T, E>,
    {
        let mut handle = self
            .connector
            .connect(&self.location)
            .map_err(ScopeError::Acquire)?;
        tracing::debug!(location = %self.location, "connection acquired");

        let outcome = catch_unwind(AssertUnwindSafe(|| f(&mut handle)));

        match self.connector.release(handle) {
            Ok(()) => tracing::debug!(location = %self.location, "connection released"),
            Err(rel_err) => {
                tracing::warn!(location = %self.location, ?rel_err, "connection release failed")
            }
        }

        match outcome {
            Ok(result) => result.map_err(ScopeError::Use),
            Err(panic_payload) => resume_unwind(panic_payload),
        }
    }
}

impl<C> fmt::Debug for ConnectionScope<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionScope")
            .field("connector", &std::any::type_name::<C>())
            .field("location", &self.location)
            .finish()
    }
}
