//! Timeout budgets shared by multi-phase waits.

use std::fmt;
use std::time::Duration;

/// Time remaining for a bounded wait.
///
/// A budget is consumed monotonically as the phases of a wait execute.
/// Subtraction saturates at zero, so a phase that overruns leaves the next
/// phase with a zero budget (one attempt) rather than wrapping around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutBudget {
    /// No bound: retry until the probe succeeds.
    Infinite,
    /// At most this much time. A zero budget allows exactly one attempt.
    Finite(Duration),
}

impl TimeoutBudget {
    /// A budget permitting a single attempt.
    pub const ZERO: Self = Self::Finite(Duration::ZERO);

    /// Converts a signed millisecond count; negative values mean infinite.
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        u64::try_from(millis).map_or(Self::Infinite, |value| {
            Self::Finite(Duration::from_millis(value))
        })
    }

    /// Builds a finite budget.
    #[must_use]
    pub const fn finite(duration: Duration) -> Self {
        Self::Finite(duration)
    }

    /// Returns the budget left after `elapsed` has been spent.
    #[must_use]
    pub const fn remaining_after(self, elapsed: Duration) -> Self {
        match self {
            Self::Infinite => Self::Infinite,
            Self::Finite(left) => Self::Finite(left.saturating_sub(elapsed)),
        }
    }

    /// Returns `true` once a finite budget has reached zero.
    #[must_use]
    pub const fn is_exhausted(self) -> bool {
        match self {
            Self::Infinite => false,
            Self::Finite(left) => left.is_zero(),
        }
    }

    /// Delay before the next attempt: the lesser of `max_delay` and the
    /// remaining budget.
    #[must_use]
    pub fn next_delay(self, max_delay: Duration) -> Duration {
        match self {
            Self::Infinite => max_delay,
            Self::Finite(left) => left.min(max_delay),
        }
    }

    /// Remaining time, or `None` when unbounded.
    #[must_use]
    pub const fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::Finite(left) => Some(left),
        }
    }
}

impl fmt::Display for TimeoutBudget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => formatter.write_str("an unbounded wait"),
            Self::Finite(left) => write!(formatter, "{} ms", left.as_millis()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::TimeoutBudget;

    #[rstest]
    #[case(-1, TimeoutBudget::Infinite)]
    #[case(i64::MIN, TimeoutBudget::Infinite)]
    #[case(0, TimeoutBudget::ZERO)]
    #[case(1_500, TimeoutBudget::Finite(Duration::from_millis(1_500)))]
    fn converts_signed_milliseconds(#[case] millis: i64, #[case] expected: TimeoutBudget) {
        assert_eq!(TimeoutBudget::from_millis(millis), expected);
    }

    #[test]
    fn overrun_clamps_to_zero() {
        let budget = TimeoutBudget::finite(Duration::from_millis(300));
        let left = budget.remaining_after(Duration::from_secs(5));
        assert_eq!(left, TimeoutBudget::ZERO);
        assert!(left.is_exhausted());
    }

    #[test]
    fn infinite_budget_never_exhausts() {
        let left = TimeoutBudget::Infinite.remaining_after(Duration::MAX);
        assert_eq!(left, TimeoutBudget::Infinite);
        assert!(!left.is_exhausted());
    }

    #[test]
    fn next_delay_is_capped_by_remaining_budget() {
        let max = Duration::from_secs(1);
        let budget = TimeoutBudget::finite(Duration::from_millis(250));
        assert_eq!(budget.next_delay(max), Duration::from_millis(250));
        assert_eq!(TimeoutBudget::Infinite.next_delay(max), max);
    }
}
