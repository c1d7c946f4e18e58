//! Adaptive backoff under sustained slow I/O.
//!
//! Each finished frame reports how long it spent waiting on blocking loads. After
//! `block_frames` consecutive frames over the I/O budget, refinement is capped at
//! the coarsest screen scale. A single frame within budget lifts the cap.

use std::time::Duration;

use tracing::{debug, info};

/// I/O backoff state carried from frame to frame.
#[derive(Debug, Clone)]
pub struct IoBackoff {
    io_budget: Duration,
    block_frames: u32,
    slow_frames: u32,
    capped: bool,
}

impl IoBackoff {
    pub fn new(io_budget: Duration, block_frames: u32) -> Self {
        Self {
            io_budget,
            block_frames: block_frames.max(1),
            slow_frames: 0,
            capped: false,
        }
    }

    /// Whether the next frame must stop at the coarsest scale.
    pub fn is_capped(&self) -> bool {
        self.capped
    }

    /// Consecutive slow frames so far.
    pub fn slow_frames(&self) -> u32 {
        self.slow_frames
    }

    /// Record the blocking-load time of a finished frame.
    pub fn record_frame(&mut self, io_time: Duration) {
        if io_time > self.io_budget {
            self.slow_frames = self.slow_frames.saturating_add(1);
            if !self.capped && self.slow_frames >= self.block_frames {
                self.capped = true;
                info!(
                    slow_frames = self.slow_frames,
                    io_ms = io_time.as_millis() as u64,
                    "Sustained slow I/O, capping refinement at coarsest scale"
                );
            }
        } else {
            if self.capped {
                debug!("Fast I/O frame, lifting refinement cap");
            }
            self.slow_frames = 0;
            self.capped = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_millis(10);
    const SLOW: Duration = Duration::from_millis(25);
    const FAST: Duration = Duration::from_millis(2);

    #[test]
    fn test_caps_after_consecutive_slow_frames() {
        let mut backoff = IoBackoff::new(BUDGET, 3);
        backoff.record_frame(SLOW);
        backoff.record_frame(SLOW);
        assert!(!backoff.is_capped());
        backoff.record_frame(SLOW);
        assert!(backoff.is_capped());
    }

    #[test]
    fn test_one_fast_frame_resets() {
        let mut backoff = IoBackoff::new(BUDGET, 2);
        backoff.record_frame(SLOW);
        backoff.record_frame(SLOW);
        assert!(backoff.is_capped());

        backoff.record_frame(FAST);
        assert!(!backoff.is_capped());
        assert_eq!(backoff.slow_frames(), 0);

        // The count starts over
        backoff.record_frame(SLOW);
        assert!(!backoff.is_capped());
    }

    #[test]
    fn test_interrupted_streak_does_not_cap() {
        let mut backoff = IoBackoff::new(BUDGET, 2);
        backoff.record_frame(SLOW);
        backoff.record_frame(FAST);
        backoff.record_frame(SLOW);
        assert!(!backoff.is_capped());
    }

    #[test]
    fn test_exactly_on_budget_is_fast() {
        let mut backoff = IoBackoff::new(BUDGET, 1);
        backoff.record_frame(BUDGET);
        assert!(!backoff.is_capped());
    }
}
