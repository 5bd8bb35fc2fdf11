//! Pausing between attempts.

use std::sync::Arc;
use std::time::Duration;

/// Something that can block the current thread for a duration.
///
/// The retry loop pauses through this trait so callers can substitute a
/// recording or no-op implementation (see [`crate::testing::RecordingSleep`]).
pub trait Sleep {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread with [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<S: Sleep + ?Sized> Sleep for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<S: Sleep + ?Sized> Sleep for Arc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
