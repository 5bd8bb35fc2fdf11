//! Retry policy configuration.

use std::time::Duration;

/// How many times to attempt an operation and how long to wait in between.
///
/// Policies are plain data. They describe the schedule; the functions in
/// [`crate::retry`] execute it.
///
/// `retries` counts *total* attempts, so `RetryPolicy::new(3, d)` runs the
/// operation at most three times with two pauses of `d`.
///
/// # Examples
///
/// ```rust
/// use querywell::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(200));
///
/// assert_eq!(policy.delay_after(1), Some(Duration::from_millis(200)));
/// assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
/// assert_eq!(policy.delay_after(3), None); // no fourth attempt
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    retries: u32,
    delay: Duration,
    jitter: JitterStrategy,
}

/// Strategy for adding randomness to the fixed delay.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±percentage randomness to delay.
    Proportional(f64),
}

/// Information about a failed attempt, passed to hooks.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a E,
    /// Delay before next attempt, `None` when this was the last one.
    pub next_delay: Option<Duration>,
    /// Total elapsed time since first attempt.
    pub elapsed: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing up to `retries` attempts, pausing `delay`
    /// between consecutive attempts.
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self {
            retries,
            delay,
            jitter: JitterStrategy::None,
        }
    }

    /// A policy that never retries: one attempt, no delay.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Add proportional jitter to the delay.
    ///
    /// The factor determines the range of randomness. For example, `0.25` means
    /// the actual delay will be ±25% of the configured delay.
    ///
    /// The factor is clamped to `[0, 1]`; NaN disables jitter.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, delays stay exact.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = if factor.is_nan() {
            JitterStrategy::None
        } else {
            JitterStrategy::Proportional(factor.clamp(0.0, 1.0))
        };
        self
    }

    /// Maximum number of attempts. A zero setting still runs once.
    pub fn max_attempts(&self) -> u32 {
        self.retries.max(1)
    }

    /// The configured pause between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Get the jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// Pause to take after attempt `attempt` (1-indexed) has failed.
    ///
    /// Returns `None` when that attempt was the last one allowed.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            None
        } else {
            Some(self.delay)
        }
    }

    /// [`delay_after`](Self::delay_after) with jitter applied.
    #[doc(hidden)]
    pub fn jittered_delay_after(&self, attempt: u32) -> Option<Duration> {
        self.delay_after(attempt).map(|d| self.jitter.apply(d))
    }

    /// Check that the policy allows at least one attempt and that any jitter
    /// factor lies in `[0, 1]`.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.retries == 0 {
            return Err("RetryPolicy must allow at least one attempt");
        }
        match self.jitter {
            JitterStrategy::Proportional(factor) if !(0.0..=1.0).contains(&factor) => {
                Err("RetryPolicy jitter factor must lie in [0, 1]")
            }
            _ => Ok(()),
        }
    }
}

impl Default for RetryPolicy {
    /// Three attempts, two seconds apart.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl JitterStrategy {
    /// Apply jitter to a base delay.
    ///
    /// Factors outside `[0, 1]` are clamped; a NaN factor leaves the delay
    /// unchanged.
    pub fn apply(&self, base_delay: Duration) -> Duration {
        match self {
            JitterStrategy::None => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let base = base_delay.as_secs_f64();
                let range = base * factor.clamp(0.0, 1.0);
                if !(range > 0.0) {
                    return base_delay;
                }
                let min = (base - range).max(0.0);
                let max = base + range;
                let jittered = rand::rng().random_range(min..=max);
                Duration::try_from_secs_f64(jittered).unwrap_or(base_delay)
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) => base_delay,
        }
    }
}
