//! Platform abstraction traits for the Cardgrid runtime.
//!
//! These traits allow the runtime to delegate scheduling and clock
//! responsibilities to the host, so the grid can be driven by a real event
//! loop or by a deterministic test harness.

use std::time::Duration;

/// Schedules work for the runtime.
///
/// Implementations are asked for another tick whenever a task is woken. They
/// must be safe to use from multiple threads because wakers may be cloned
/// across threads by asset loaders.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host run another runtime tick.
    fn schedule_tick(&self);
}

/// Monotonic time source.
pub trait Clock {
    /// Returns the time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Returns the time elapsed since `since`, saturating at zero.
    fn elapsed_since(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }
}
