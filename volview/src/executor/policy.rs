//! Scheduling priority for tile loads.
//!
//! Unlike a "bigger is more urgent" scheme, load priorities count *down*: the
//! queue always serves the numerically lowest priority first. Priorities are
//! derived from the resolution level as `max_level - level`, so coarse levels,
//! which are cheap and needed first for a progressive paint, jump the queue.

use std::fmt;

/// Load priority; lower values are serviced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(u16);

impl Priority {
    /// The most urgent priority.
    pub const HIGHEST: Priority = Priority(0);

    /// Create a priority from a raw value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Priority of a tile at `level` in a pyramid whose coarsest level is `max_level`.
    ///
    /// The coarsest level gets [`Priority::HIGHEST`].
    pub fn for_level(max_level: u8, level: u8) -> Self {
        Self(max_level.saturating_sub(level) as u16)
    }

    /// Raw value.
    pub fn value(self) -> u16 {
        self.0
    }

    /// The more urgent of two priorities.
    pub fn most_urgent(self, other: Priority) -> Priority {
        self.min(other)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_level_prefers_coarse_levels() {
        let max_level = 4;
        assert_eq!(Priority::for_level(max_level, 4), Priority::HIGHEST);
        assert_eq!(Priority::for_level(max_level, 0), Priority::new(4));
        assert!(Priority::for_level(max_level, 3) < Priority::for_level(max_level, 1));
    }

    #[test]
    fn test_for_level_saturates() {
        assert_eq!(Priority::for_level(2, 5), Priority::HIGHEST);
    }

    #[test]
    fn test_most_urgent() {
        assert_eq!(
            Priority::new(3).most_urgent(Priority::new(1)),
            Priority::new(1)
        );
    }
}
