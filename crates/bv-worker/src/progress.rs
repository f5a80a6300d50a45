//! Frame-derived job progress.

/// Highest percentage reported before a job is terminal.
pub const MAX_RUNNING_PERCENT: u8 = 99;

/// Percentage of `expected` frames that are done, capped below 100.
pub fn progress_percent(done: u64, expected: u64) -> u8 {
    if expected == 0 {
        return 0;
    }
    let pct = done.min(expected).saturating_mul(100) / expected;
    (pct as u8).min(MAX_RUNNING_PERCENT)
}

/// Monotonic progress over a known number of frames.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    expected: u64,
    done: u64,
    percent: u8,
}

impl ProgressTracker {
    pub fn new(expected: u64) -> Self {
        Self {
            expected,
            done: 0,
            percent: 0,
        }
    }

    pub fn set_expected(&mut self, expected: u64) {
        self.expected = expected;
    }

    /// Record `done` finished frames; returns the new percent when it moved.
    pub fn advance(&mut self, done: u64) -> Option<u8> {
        self.done = self.done.max(done);
        let next = progress_percent(self.done, self.expected);
        if next > self.percent {
            self.percent = next;
            Some(next)
        } else {
            None
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_capped_until_terminal() {
        assert_eq!(progress_percent(0, 10), 0);
        assert_eq!(progress_percent(5, 10), 50);
        assert_eq!(progress_percent(10, 10), 99);
        assert_eq!(progress_percent(12, 10), 99);
        assert_eq!(progress_percent(3, 0), 0);
    }

    #[test]
    fn test_tracker_is_monotonic() {
        let mut tracker = ProgressTracker::new(4);
        assert_eq!(tracker.advance(2), Some(50));
        assert_eq!(tracker.advance(1), None);
        assert_eq!(tracker.percent(), 50);
        assert_eq!(tracker.advance(3), Some(75));
        assert_eq!(tracker.advance(4), Some(99));
        assert_eq!(tracker.done(), 4);
    }
}
