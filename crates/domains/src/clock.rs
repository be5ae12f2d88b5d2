//! Time source used for creation timestamps.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "testing"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "testing"))]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::Clock;

    /// Deterministic clock: every `now()` returns the current instant and
    /// then moves forward by `step`.
    #[derive(Debug)]
    pub struct ManualClock {
        micros: AtomicI64,
        step_micros: i64,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                micros: AtomicI64::new(start.timestamp_micros()),
                step_micros: step.num_microseconds().unwrap_or(0),
            }
        }

        /// A clock frozen at `at`.
        pub fn fixed(at: DateTime<Utc>) -> Self {
            Self::new(at, Duration::zero())
        }

        pub fn advance(&self, by: Duration) {
            self.micros
                .fetch_add(by.num_microseconds().unwrap_or(0), Ordering::SeqCst);
        }

        pub fn set(&self, at: DateTime<Utc>) {
            self.micros.store(at.timestamp_micros(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            let micros = self.micros.fetch_add(self.step_micros, Ordering::SeqCst);
            Utc.timestamp_micros(micros)
                .single()
                .unwrap_or_else(Utc::now)
        }
    }
}
