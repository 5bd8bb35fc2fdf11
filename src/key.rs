//! Call arguments and the cache keys derived from them.
//!
//! A wrapped operation is called with [`Args`]: positional values plus named
//! keyword values. The connection handle is never part of `Args`, so it never
//! takes part in the key.
//!
//! [`Args::key`] normalises keyword arguments by sorting them on their name,
//! so the order in which a caller supplies them does not matter:
//!
//! ```rust
//! use querywell::Args;
//!
//! let a = Args::new().kwarg("a", 1).kwarg("b", 2);
//! let b = Args::new().kwarg("b", 2).kwarg("a", 1);
//! assert_eq!(a.key().unwrap(), b.key().unwrap());
//! ```
//!
//! Derivation is fallible. A NaN float has no usable equality and a keyword
//! given twice is ambiguous; both are rejected before any work happens:
//!
//! ```rust
//! use querywell::{Args, KeyError};
//!
//! let err = Args::new().arg(f64::NAN).key().unwrap_err();
//! assert!(matches!(err, KeyError::Unhashable { .. }));
//! ```

use std::fmt;

use crate::value::Value;

/// Arguments of one call, excluding the connection handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Args {
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
}

impl Args {
    /// Empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single `query` keyword argument.
    ///
    /// ```rust
    /// use querywell::Args;
    ///
    /// let args = Args::query("SELECT * FROM users");
    /// assert_eq!(args.get("query").and_then(|v| v.as_text()), Some("SELECT * FROM users"));
    /// ```
    pub fn query(sql: impl Into<String>) -> Self {
        Self::new().kwarg("query", sql.into())
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Append a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    /// Positional arguments in call order.
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Keyword arguments in the order they were supplied.
    pub fn keyword(&self) -> &[(String, Value)] {
        &self.keyword
    }

    /// Look up a keyword argument by name (first occurrence).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.keyword
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Derive the normalised cache key for these arguments.
    pub fn key(&self) -> Result<CallKey, KeyError> {
        let positional = self
            .positional
            .iter()
            .enumerate()
            .map(|(i, v)| {
                KeyPart::from_value(v).ok_or_else(|| KeyError::Unhashable {
                    argument: format!("#{}", i),
                    kind: v.kind(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut keyword = Vec::with_capacity(self.keyword.len());
        for (name, v) in &self.keyword {
            let part = KeyPart::from_value(v).ok_or_else(|| KeyError::Unhashable {
                argument: name.clone(),
                kind: v.kind(),
            })?;
            keyword.push((name.clone(), part));
        }
        keyword.sort_by(|a, b| a.0.cmp(&b.0));

        if let Some(pair) = keyword.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(KeyError::DuplicateKeyword(pair[0].0.clone()));
        }

        Ok(CallKey {
            positional,
            keyword,
        })
    }
}

/// Normalised, hashable identity of a call's arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallKey {
    positional: Vec<KeyPart>,
    keyword: Vec<(String, KeyPart)>,
}

impl CallKey {
    /// Number of positional parts.
    pub fn arity(&self) -> usize {
        self.positional.len()
    }

    /// Keyword names in normalised (sorted) order.
    pub fn keyword_names(&self) -> impl Iterator<Item = &str> {
        self.keyword.iter().map(|(k, _)| k.as_str())
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut first = true;
        for part in &self.positional {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", part)?;
        }
        for (name, part) in &self.keyword {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}={}", name, part)?;
        }
        write!(f, ")")
    }
}

/// Hashable mirror of [`Value`].
///
/// Floats are stored by bit pattern with `-0.0` folded into `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Blob(Vec<u8>),
    List(Vec<KeyPart>),
}

impl KeyPart {
    fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Int(n) => KeyPart::Int(*n),
            Value::Float(x) if x.is_nan() => return None,
            Value::Float(x) => KeyPart::Float(if *x == 0.0 { 0u64 } else { x.to_bits() }),
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Blob(b) => KeyPart::Blob(b.clone()),
            Value::List(items) => KeyPart::List(
                items
                    .iter()
                    .map(KeyPart::from_value)
                    .collect::<Option<Vec<_>>>()?,
            ),
        })
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => write!(f, "NULL"),
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            KeyPart::Text(s) => write!(f, "{:?}", s),
            KeyPart::Blob(b) => write!(f, "<{} bytes>", b.len()),
            KeyPart::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Failure to derive a [`CallKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// An argument holds a value with no stable equality (NaN).
    Unhashable {
        /// `#i` for positional arguments, the keyword name otherwise.
        argument: String,
        /// Variant name of the offending value.
        kind: &'static str,
    },
    /// The same keyword was supplied more than once.
    DuplicateKeyword(String),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::Unhashable { argument, kind } => {
                write!(f, "argument {} ({}) cannot be used as a cache key", argument, kind)
            }
            KeyError::DuplicateKeyword(name) => {
                write!(f, "keyword argument '{}' supplied more than once", name)
            }
        }
    }
}

impl std::error::Error for KeyError {}
