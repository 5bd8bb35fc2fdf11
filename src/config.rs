//! Pipeline configuration.
//!
//! [`PipelineConfig`] is plain data describing where to connect and how to
//! retry. With the `serde` feature it can be loaded from any serde format;
//! missing fields fall back to [`PipelineConfig::default`].
//!
//! ```rust
//! use querywell::PipelineConfig;
//! use std::time::Duration;
//!
//! let config = PipelineConfig {
//!     retries: 4,
//!     delay_ms: 3000,
//!     ..PipelineConfig::default()
//! };
//!
//! let policy = config.retry_policy().unwrap();
//! assert_eq!(policy.max_attempts(), 4);
//! assert_eq!(policy.delay(), Duration::from_secs(3));
//! ```

use std::fmt;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Where to connect and how to retry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PipelineConfig {
    /// Resource location handed to the connector (a path or DSN).
    pub location: String,
    /// Maximum total attempts per call.
    pub retries: u32,
    /// Pause between attempts, in milliseconds.
    pub delay_ms: u64,
    /// Optional proportional jitter factor in `[0, 1]`.
    pub jitter: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            location: "db/users.db".to_string(),
            retries: 3,
            delay_ms: 2000,
            jitter: None,
        }
    }
}

impl PipelineConfig {
    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.trim().is_empty() {
            return Err(ConfigError::EmptyLocation);
        }
        if self.retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if let Some(factor) = self.jitter {
            if !(0.0..=1.0).contains(&factor) {
                return Err(ConfigError::JitterOutOfRange(factor));
            }
        }
        Ok(())
    }

    /// Validate and convert into a [`RetryPolicy`].
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        self.validate()?;
        let policy = RetryPolicy::new(self.retries, Duration::from_millis(self.delay_ms));
        Ok(match self.jitter {
            Some(factor) => policy.with_jitter(factor),
            None => policy,
        })
    }
}

/// Invalid [`PipelineConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `location` is empty or whitespace.
    EmptyLocation,
    /// `retries` is zero; at least one attempt is required.
    ZeroRetries,
    /// `jitter` lies outside `[0, 1]` (NaN included).
    JitterOutOfRange(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyLocation => write!(f, "location must not be empty"),
            ConfigError::ZeroRetries => write!(f, "retries must be at least 1"),
            ConfigError::JitterOutOfRange(x) => {
                write!(f, "jitter factor {} is outside [0, 1]", x)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::JitterStrategy;

    #[test]
    fn default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        let base = PipelineConfig::default();

        let empty = PipelineConfig {
            location: "  ".to_string(),
            ..base.clone()
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyLocation));

        let zero = PipelineConfig {
            retries: 0,
            ..base.clone()
        };
        assert_eq!(zero.retry_policy(), Err(ConfigError::ZeroRetries));

        let jitter = PipelineConfig {
            jitter: Some(1.5),
            ..base.clone()
        };
        assert_eq!(jitter.validate(), Err(ConfigError::JitterOutOfRange(1.5)));

        let nan = PipelineConfig {
            jitter: Some(f64::NAN),
            ..base
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn jitter_is_carried_into_policy() {
        let config = PipelineConfig {
            jitter: Some(0.25),
            ..PipelineConfig::default()
        };
        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.jitter(), &JitterStrategy::Proportional(0.25));
    }

    #[cfg(feature = "serde")]
    mod serde_tests {
        use super::*;

        #[test]
        fn deserializes_with_defaults() {
            let config: PipelineConfig =
                serde_json::from_str(r#"{"location": "data/app.db", "retries": 5}"#).unwrap();
            assert_eq!(config.location, "data/app.db");
            assert_eq!(config.retries, 5);
            assert_eq!(config.delay_ms, 2000);
            assert_eq!(config.jitter, None);
        }

        #[test]
        fn rejects_unknown_fields() {
            let result: Result<PipelineConfig, _> =
                serde_json::from_str(r#"{"retry": 5}"#);
            assert!(result.is_err());
        }

        #[test]
        fn round_trips_through_json() {
            let config = PipelineConfig {
                jitter: Some(0.1),
                ..PipelineConfig::default()
            };
            let json = serde_json::to_string(&config).unwrap();
            let back: PipelineConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(back, config);
        }
    }
}
