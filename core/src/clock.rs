//! Monotonic time source for elapsed-time samples.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// A clock reading is an offset from an origin fixed for the clock's lifetime.
///
/// Implementations must be safe to call from a forked child, so they may not
/// take locks or allocate.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// The process-wide monotonic clock.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

static SHARED: OnceLock<Arc<MonotonicClock>> = OnceLock::new();

impl MonotonicClock {
    /// Returns the single clock every updater samples unless one is injected.
    ///
    /// The origin is captured on first use and never changes afterwards.
    pub fn shared() -> Arc<dyn Clock> {
        let clock = SHARED.get_or_init(|| {
            Arc::new(MonotonicClock {
                origin: Instant::now(),
            })
        });
        Arc::clone(clock) as Arc<dyn Clock>
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for deterministic rendering and tests.
///
/// Readings may move backwards; the renderer reports the absolute distance
/// from its start reading either way.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(duration_to_nanos(start)),
        }
    }

    pub fn set(&self, reading: Duration) {
        self.nanos.store(duration_to_nanos(reading), Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Distance between two readings, regardless of which one is later.
#[must_use]
pub fn elapsed_between(start: Duration, now: Duration) -> Duration {
    start.abs_diff(now)
}
