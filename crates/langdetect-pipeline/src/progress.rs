//! Run counters and time-remaining estimation
//!
//! Progress reporting is best effort: every calculation here degrades to
//! "unknown" instead of failing.

use std::time::{Duration, Instant};

/// Shown when no estimate can be made
pub const UNKNOWN_ETA: &str = "??:??:??";

/// Process-scoped counters for one run
#[derive(Debug, Clone)]
pub struct RunState {
    /// Results already in the target when the run started
    pub initial_result_count: i64,
    /// Source records consumed by this run
    pub detected_count: i64,
    /// Source records left to consume, never negative
    pub remaining_count: i64,
    pub start_time: Instant,
}

impl RunState {
    /// Counters for a run over `source_count` matching rows of which
    /// `initial_result_count` already have results
    pub fn new(initial_result_count: i64, source_count: i64) -> Self {
        Self {
            initial_result_count,
            detected_count: 0,
            remaining_count: source_count.saturating_sub(initial_result_count).max(0),
            start_time: Instant::now(),
        }
    }

    /// Record one consumed source record
    pub fn consume(&mut self) {
        self.detected_count += 1;
        self.remaining_count -= 1;
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining_count > 0
    }

    /// Offset of the next unread record in offset mode
    pub fn next_offset(&self) -> i64 {
        self.initial_result_count.saturating_add(self.detected_count)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Estimated time until the source is exhausted, `None` before the first
    /// record has been consumed
    pub fn eta(&self) -> Option<Duration> {
        self.eta_with_elapsed(self.elapsed())
    }

    /// `elapsed / detected * remaining`
    pub fn eta_with_elapsed(&self, elapsed: Duration) -> Option<Duration> {
        if self.detected_count <= 0 || self.remaining_count < 0 {
            return None;
        }
        let per_record = elapsed.as_secs_f64() / self.detected_count as f64;
        Duration::try_from_secs_f64(per_record * self.remaining_count as f64).ok()
    }
}

/// Format as `H:MM:SS`, or `H:MM` without seconds
///
/// Hours are not wrapped, so long runs read e.g. `36:05:09`.
pub fn format_hms(duration: Duration, show_seconds: bool) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;

    if show_seconds {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours}:{minutes:02}")
    }
}

/// Format an estimate, falling back to [`UNKNOWN_ETA`]
pub fn format_eta(eta: Option<Duration>) -> String {
    eta.map(|d| format_hms(d, true))
        .unwrap_or_else(|| UNKNOWN_ETA.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_eta_from_average_record_time() {
        let mut state = RunState::new(0, 100);
        for _ in 0..10 {
            state.consume();
        }
        assert_eq!(state.detected_count, 10);
        assert_eq!(state.remaining_count, 90);

        let eta = state.eta_with_elapsed(Duration::from_secs(10)).unwrap();
        assert_eq!(eta.as_secs(), 90);
        assert_eq!(format_eta(Some(eta)), "0:01:30");
    }

    #[test]
    fn test_eta_unknown_before_first_record() {
        let state = RunState::new(0, 100);
        assert_eq!(state.eta_with_elapsed(Duration::from_secs(10)), None);
        assert_eq!(format_eta(state.eta()), UNKNOWN_ETA);
    }

    #[test]
    fn test_eta_with_zero_elapsed() {
        let mut state = RunState::new(0, 5);
        state.consume();
        assert_eq!(state.eta_with_elapsed(Duration::ZERO), Some(Duration::ZERO));
    }

    #[test]
    fn test_negative_remaining_is_clamped() {
        let state = RunState::new(120, 100);
        assert_eq!(state.remaining_count, 0);
        assert!(!state.has_remaining());
        assert_eq!(state.next_offset(), 120);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::from_secs(0), true), "0:00:00");
        assert_eq!(format_hms(Duration::from_secs(3_725), true), "1:02:05");
        assert_eq!(format_hms(Duration::from_secs(3_725), false), "1:02");
        assert_eq!(format_hms(Duration::from_secs(36 * 3600 + 5), true), "36:00:05");
        assert_eq!(format_hms(Duration::from_millis(59_999), true), "0:00:59");
    }
}
