//! Time sources for polling loops.
//!
//! Every wait in the crate reads time and sleeps through [`Clock`], so tests
//! can drive multi-minute reboot sequences instantly with a manual clock.

use std::thread;
use std::time::{Duration, Instant};

/// Source of monotonic time that can also block the caller.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by [`Instant`] and [`thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Measures elapsed time against a [`Clock`].
pub struct Stopwatch<'a, C: Clock + ?Sized> {
    clock: &'a C,
    started: Instant,
}

impl<'a, C: Clock + ?Sized> Stopwatch<'a, C> {
    /// Starts measuring now.
    #[must_use]
    pub fn start(clock: &'a C) -> Self {
        Self {
            clock,
            started: clock.now(),
        }
    }

    /// Time since [`Stopwatch::start`].
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-support"))]
mod manual {
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use super::Clock;

    /// Clock that only advances when slept on or advanced explicitly.
    ///
    /// Clones share the same timeline.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ManualClock {
        /// Starts a timeline at the current instant.
        #[must_use]
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Moves the timeline forward.
        pub fn advance(&self, duration: Duration) {
            let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
            *offset = offset.saturating_add(duration);
        }

        /// Time elapsed since the clock was created.
        #[must_use]
        pub fn elapsed(&self) -> Duration {
            *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Clock, ManualClock, Stopwatch};

    #[test]
    fn manual_clock_advances_only_when_slept() {
        let clock = ManualClock::new();
        let watch = Stopwatch::start(&clock);
        assert_eq!(watch.elapsed(), Duration::ZERO);
        clock.sleep(Duration::from_millis(750));
        assert_eq!(watch.elapsed(), Duration::from_millis(750));
    }

    #[test]
    fn clones_share_a_timeline() {
        let clock = ManualClock::new();
        let other = clock.clone();
        other.advance(Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }
}
