//! Daily reset detection.
//!
//! The scheduler is polled on a coarse tick with the current wall-clock time in the host's
//! zone. It fires when the local calendar date has moved past the date of the last reset,
//! which happens on the first poll at or after 00:00. Each date fires at most once, however
//! short the polling period, and a poll that misses the 00:00 minute (suspended device, late
//! tick) still fires on the next one.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike};
use log::info;

#[derive(Debug, Clone)]
pub struct MidnightResetScheduler {
    last_reset_date: NaiveDate,
}

impl MidnightResetScheduler {
    /// Start tracking from `today`; no reset fires until the date changes.
    pub fn new(today: NaiveDate) -> Self {
        Self { last_reset_date: today }
    }

    /// Start tracking from the local date of `now`.
    pub fn starting_at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self::new(now.date_naive())
    }

    pub fn last_reset_date(&self) -> NaiveDate {
        self.last_reset_date
    }

    /// Poll with the current time. Returns `true` exactly once per new local date.
    pub fn check<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        let today = now.date_naive();
        if today <= self.last_reset_date {
            return false;
        }
        info!(
            "[MidnightResetScheduler] Day changed {} -> {} (local {:02}:{:02})",
            self.last_reset_date,
            today,
            now.hour(),
            now.minute()
        );
        self.last_reset_date = today;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn test_no_reset_on_same_day() {
        let start = kst().with_ymd_and_hms(2024, 8, 21, 9, 0, 0).unwrap();
        let mut scheduler = MidnightResetScheduler::starting_at(&start);
        assert!(!scheduler.check(&start));
        assert!(!scheduler.check(&kst().with_ymd_and_hms(2024, 8, 21, 23, 59, 59).unwrap()));
    }

    #[test]
    fn test_fires_once_in_midnight_minute() {
        let mut scheduler = MidnightResetScheduler::new(NaiveDate::from_ymd_opt(2024, 8, 21).unwrap());
        let mut fired = 0;
        // Poll every 10s through the whole 00:00 minute
        for second in (0..60).step_by(10) {
            let now = kst().with_ymd_and_hms(2024, 8, 22, 0, 0, second).unwrap();
            if scheduler.check(&now) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(scheduler.last_reset_date(), NaiveDate::from_ymd_opt(2024, 8, 22).unwrap());
    }

    #[test]
    fn test_fires_after_missed_window() {
        let mut scheduler = MidnightResetScheduler::new(NaiveDate::from_ymd_opt(2024, 8, 21).unwrap());
        assert!(scheduler.check(&kst().with_ymd_and_hms(2024, 8, 22, 0, 3, 0).unwrap()));
        assert!(!scheduler.check(&kst().with_ymd_and_hms(2024, 8, 22, 0, 4, 0).unwrap()));
    }

    #[test]
    fn test_uses_local_date_of_zone() {
        // 15:30 UTC on the 21st is already 00:30 on the 22nd in Seoul
        let instant = Utc.with_ymd_and_hms(2024, 8, 21, 15, 30, 0).unwrap();
        let mut utc = MidnightResetScheduler::new(NaiveDate::from_ymd_opt(2024, 8, 21).unwrap());
        let mut seoul = utc.clone();
        assert!(!utc.check(&instant));
        assert!(seoul.check(&instant.with_timezone(&kst())));
    }

    #[test]
    fn test_clock_going_backwards_does_not_fire() {
        let mut scheduler = MidnightResetScheduler::new(NaiveDate::from_ymd_opt(2024, 8, 22).unwrap());
        assert!(!scheduler.check(&kst().with_ymd_and_hms(2024, 8, 21, 0, 0, 0).unwrap()));
    }
}
