//! Bounded polling of boolean probes.

use std::time::Duration;

use tracing::{debug, trace};

use crate::budget::TimeoutBudget;
use crate::clock::Clock;

/// Tracing target for retry scheduling.
const RETRY_TARGET: &str = "kitlink::retry";

/// Default upper bound on the delay between two attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest delay accepted; a zero delay would never consume a finite budget.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Polling cadence of [`retry_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl RetryPolicy {
    /// Polls at most every `max_delay`, clamped to at least one millisecond.
    #[must_use]
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay: max_delay.max(MIN_POLL_INTERVAL),
        }
    }

    /// Upper bound on the delay between attempts.
    #[must_use]
    pub const fn max_delay(self) -> Duration {
        self.max_delay
    }
}

/// Evaluates `probe` until it returns `true` or `budget` runs out.
///
/// The budget is measured from entry, so time spent inside `probe` counts
/// against it as well as time spent asleep. Between attempts the caller's
/// thread sleeps for the lesser of the policy's maximum delay and what is
/// left. A zero budget allows exactly one attempt; an infinite budget retries
/// until the probe succeeds.
///
/// Returns `true` as soon as the probe succeeds and `false` once a finite
/// budget is exhausted without success.
#[must_use]
pub fn retry_until<C, P>(
    clock: &C,
    policy: RetryPolicy,
    budget: TimeoutBudget,
    mut probe: P,
) -> bool
where
    C: Clock + ?Sized,
    P: FnMut() -> bool,
{
    let started = clock.now();
    // Sum of requested sleeps; a coarse clock must not stall a finite budget.
    let mut slept = Duration::ZERO;
    let mut attempts: u64 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        if probe() {
            debug!(target: RETRY_TARGET, attempts, "probe succeeded");
            return true;
        }
        let elapsed = clock.now().saturating_duration_since(started).max(slept);
        let remaining = budget.remaining_after(elapsed);
        if remaining.is_exhausted() {
            debug!(target: RETRY_TARGET, attempts, %budget, "retry budget exhausted");
            return false;
        }
        let delay = remaining.next_delay(policy.max_delay());
        clock.sleep(delay);
        slept = slept.saturating_add(delay);
        trace!(
            target: RETRY_TARGET,
            attempts,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            %remaining,
            "probe failed; retrying"
        );
    }
}
