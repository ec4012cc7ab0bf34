//! # Retry budget for poll events.
//!
//! [`Retries`] is the number of timer-driven dispatches a poll event is still
//! allowed before the poller retires it. "Poll forever" is an explicit
//! [`Retries::Unbounded`] variant, not a magic large integer, so exhaustion
//! checks never depend on sentinel arithmetic.
//!
//! ## Example
//! ```rust
//! use eventvisor::Retries;
//!
//! let mut budget = Retries::Bounded(2);
//! budget = budget.decrement();
//! assert!(!budget.is_exhausted());
//! budget = budget.decrement();
//! assert!(budget.is_exhausted());
//!
//! assert!(!Retries::Unbounded.decrement().is_exhausted());
//! ```

/// Remaining timer-driven dispatches for a poll event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retries {
    /// Poll until the module calls `poll_event_done` (never exhausted).
    Unbounded,
    /// At most `n` further dispatches; `Bounded(0)` is exhausted.
    Bounded(u32),
}

impl Default for Retries {
    /// Returns [`Retries::Unbounded`].
    fn default() -> Self {
        Retries::Unbounded
    }
}

impl Retries {
    /// Consumes one dispatch from the budget (saturating at zero).
    ///
    /// `Unbounded` is returned unchanged.
    #[must_use]
    pub fn decrement(self) -> Self {
        match self {
            Retries::Unbounded => Retries::Unbounded,
            Retries::Bounded(n) => Retries::Bounded(n.saturating_sub(1)),
        }
    }

    /// True once the budget has reached zero.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Retries::Bounded(0))
    }

    /// Remaining dispatches, `None` for unbounded budgets.
    #[inline]
    pub fn remaining(&self) -> Option<u32> {
        match self {
            Retries::Unbounded => None,
            Retries::Bounded(n) => Some(*n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_counts_down_and_saturates() {
        let mut r = Retries::Bounded(2);
        assert_eq!(r.remaining(), Some(2));

        r = r.decrement();
        assert_eq!(r.remaining(), Some(1));
        assert!(!r.is_exhausted());

        r = r.decrement();
        assert!(r.is_exhausted());

        // Saturates, stays exhausted.
        r = r.decrement();
        assert_eq!(r.remaining(), Some(0));
        assert!(r.is_exhausted());
    }

    #[test]
    fn unbounded_never_exhausts() {
        let mut r = Retries::Unbounded;
        for _ in 0..1000 {
            r = r.decrement();
        }
        assert!(!r.is_exhausted());
        assert_eq!(r.remaining(), None);
    }

    #[test]
    fn default_is_unbounded() {
        assert_eq!(Retries::default(), Retries::Unbounded);
    }
}
