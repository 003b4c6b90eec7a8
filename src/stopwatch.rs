//! Elapsed-stay stopwatch and its display formats.

use std::time::Duration;

/// Display format for an elapsed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElapsedFormat {
    /// `HH:MM:SS`
    #[default]
    Clock,
    /// `N시간 M분 S초`
    Korean,
    /// `N시간 M분`
    KoreanShort,
}

/// Format a duration for display. Sub-second parts are dropped.
///
/// ```rust
/// use std::time::Duration;
/// use clover_engine::stopwatch::{format_elapsed, ElapsedFormat};
///
/// let d = Duration::from_secs(3 * 3600 + 7 * 60 + 5);
/// assert_eq!(format_elapsed(d, ElapsedFormat::Clock), "03:07:05");
/// assert_eq!(format_elapsed(d, ElapsedFormat::Korean), "3시간 7분 5초");
/// assert_eq!(format_elapsed(d, ElapsedFormat::KoreanShort), "3시간 7분");
/// ```
pub fn format_elapsed(elapsed: Duration, format: ElapsedFormat) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    match format {
        ElapsedFormat::Clock => format!("{:02}:{:02}:{:02}", hours, minutes, seconds),
        ElapsedFormat::Korean => format!("{}시간 {}분 {}초", hours, minutes, seconds),
        ElapsedFormat::KoreanShort => format!("{}시간 {}분", hours, minutes),
    }
}

/// Stopwatch started by the first marker of a stay episode.
///
/// It advances by whole ticks: each [`tick`](Self::tick) while running adds one tick interval.
#[derive(Debug, Clone)]
pub struct ElapsedStayTimer {
    tick_interval: Duration,
    started_at_ms: Option<i64>,
    ticks: u64,
}

impl ElapsedStayTimer {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            started_at_ms: None,
            ticks: 0,
        }
    }

    /// Start at `now_ms` unless already running. Returns whether it started.
    pub fn start_if_idle(&mut self, now_ms: i64) -> bool {
        if self.started_at_ms.is_some() {
            return false;
        }
        self.started_at_ms = Some(now_ms);
        self.ticks = 0;
        true
    }

    pub fn is_running(&self) -> bool {
        self.started_at_ms.is_some()
    }

    /// Timestamp (Unix ms) of the marker that started the stopwatch.
    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    pub fn tick(&mut self) {
        if self.is_running() {
            self.ticks += 1;
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.tick_interval.saturating_mul(self.ticks.min(u32::MAX as u64) as u32)
    }

    pub fn display(&self, format: ElapsedFormat) -> String {
        format_elapsed(self.elapsed(), format)
    }

    /// Stop and zero.
    pub fn clear(&mut self) {
        self.started_at_ms = None;
        self.ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timer_does_not_advance() {
        let mut timer = ElapsedStayTimer::new(Duration::from_secs(1));
        timer.tick();
        timer.tick();
        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert!(!timer.is_running());
    }

    #[test]
    fn test_runs_after_start() {
        let mut timer = ElapsedStayTimer::new(Duration::from_secs(1));
        assert!(timer.start_if_idle(1_000));
        for _ in 0..65 {
            timer.tick();
        }
        assert_eq!(timer.elapsed(), Duration::from_secs(65));
        assert_eq!(timer.display(ElapsedFormat::Clock), "00:01:05");
        assert_eq!(timer.started_at_ms(), Some(1_000));
    }

    #[test]
    fn test_second_start_is_ignored() {
        let mut timer = ElapsedStayTimer::new(Duration::from_secs(1));
        timer.start_if_idle(1_000);
        timer.tick();
        assert!(!timer.start_if_idle(9_000));
        assert_eq!(timer.started_at_ms(), Some(1_000));
        assert_eq!(timer.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_clear_stops() {
        let mut timer = ElapsedStayTimer::new(Duration::from_secs(1));
        timer.start_if_idle(0);
        timer.tick();
        timer.clear();
        timer.tick();
        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert!(!timer.is_running());
    }

    #[test]
    fn test_format_zero_and_long() {
        assert_eq!(format_elapsed(Duration::ZERO, ElapsedFormat::Clock), "00:00:00");
        assert_eq!(format_elapsed(Duration::ZERO, ElapsedFormat::KoreanShort), "0시간 0분");
        assert_eq!(
            format_elapsed(Duration::from_millis(100 * 3600 * 1000 + 999), ElapsedFormat::Clock),
            "100:00:00"
        );
    }
}
