//! Monotonic time source for engine deadlines.

use tokio::time::Instant;

/// Source of "now" for the suppression window and conflict detection times.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Tokio's clock. Follows `tokio::time::pause` and `advance` in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
