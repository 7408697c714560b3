use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::models::Trend;

/// Change in percentage points that must be exceeded before a metric is
/// reported as moving.
pub const DEFAULT_TREND_DEADBAND: Decimal = Decimal::TWO;

pub const DEFAULT_WINDOW_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindows {
    pub recent: DateRange,
    pub prior: DateRange,
}

impl TrendWindows {
    /// Two back-to-back windows of `days` each, the recent one ending on `as_of`.
    pub fn ending_at(as_of: NaiveDate, days: u32) -> Self {
        let span = Duration::days(i64::from(days.max(1)));
        let recent_start = as_of - span + Duration::days(1);
        let prior_end = recent_start - Duration::days(1);
        Self {
            recent: DateRange {
                start: recent_start,
                end: as_of,
            },
            prior: DateRange {
                start: prior_end - span + Duration::days(1),
                end: prior_end,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendClassifier {
    deadband: Decimal,
}

impl Default for TrendClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TREND_DEADBAND)
    }
}

impl TrendClassifier {
    pub fn new(deadband: Decimal) -> Self {
        Self {
            deadband: deadband.abs(),
        }
    }

    pub fn deadband(&self) -> Decimal {
        self.deadband
    }

    /// Either side missing means there is not enough data to call a
    /// direction, which is reported as stable.
    pub fn classify(&self, recent: Option<Decimal>, prior: Option<Decimal>) -> Trend {
        let (Some(recent), Some(prior)) = (recent, prior) else {
            return Trend::Stable;
        };

        let delta = recent - prior;
        if delta > self.deadband {
            Trend::Improving
        } else if delta < -self.deadband {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deadband_is_symmetric_and_inclusive() {
        let classifier = TrendClassifier::default();
        let base = dec!(80);

        assert_eq!(classifier.classify(Some(base + dec!(3)), Some(base)), Trend::Improving);
        assert_eq!(classifier.classify(Some(base - dec!(3)), Some(base)), Trend::Declining);
        assert_eq!(classifier.classify(Some(base), Some(base)), Trend::Stable);
        assert_eq!(classifier.classify(Some(base + dec!(2)), Some(base)), Trend::Stable);
        assert_eq!(classifier.classify(Some(base - dec!(2)), Some(base)), Trend::Stable);
        assert_eq!(classifier.classify(Some(base + dec!(2.1)), Some(base)), Trend::Improving);
    }

    #[test]
    fn missing_window_is_stable() {
        let classifier = TrendClassifier::default();
        assert_eq!(classifier.classify(None, Some(dec!(90))), Trend::Stable);
        assert_eq!(classifier.classify(Some(dec!(10)), None), Trend::Stable);
        assert_eq!(classifier.classify(None, None), Trend::Stable);
    }

    #[test]
    fn deadband_is_configurable() {
        let classifier = TrendClassifier::new(dec!(5));
        assert_eq!(classifier.classify(Some(dec!(84)), Some(dec!(80))), Trend::Stable);
        assert_eq!(classifier.classify(Some(dec!(86)), Some(dec!(80))), Trend::Improving);
    }

    #[test]
    fn windows_are_adjacent_and_equal_length() {
        let as_of = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        let windows = TrendWindows::ending_at(as_of, 14);

        assert_eq!(windows.recent.start, NaiveDate::from_ymd_opt(2026, 2, 15).unwrap());
        assert_eq!(windows.recent.end, as_of);
        assert_eq!(windows.prior.end, NaiveDate::from_ymd_opt(2026, 2, 14).unwrap());
        assert_eq!(windows.prior.start, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert!(!windows.prior.contains(windows.recent.start));
    }
}
