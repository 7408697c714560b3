use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, RecordIssue};
use crate::models::{round_half_up, AttendanceCounts, AttendanceEntry, AttendanceStatus, ClassSession};

/// How a scheduled day without any attendance entry is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmarkedPolicy {
    /// Counts as an absence.
    #[default]
    Absent,
    /// Counts as excused: still in the denominator, never as attended.
    Excused,
    /// Dropped from the denominator entirely.
    Excluded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceAggregate {
    pub counts: AttendanceCounts,
    pub attendance_rate: Decimal,
    pub punctuality_rate: Decimal,
    pub anomalies: Vec<RecordIssue>,
}

impl AttendanceAggregate {
    pub fn has_data(&self) -> bool {
        self.counts.total_days > 0
    }

    /// `(attendance_rate, punctuality_rate)`, or the no-data signal when
    /// there were no countable days.
    pub fn rates(&self) -> Result<(Decimal, Decimal), EngineError> {
        if self.has_data() {
            Ok((self.attendance_rate, self.punctuality_rate))
        } else {
            Err(EngineError::NoAttendanceRecorded)
        }
    }
}

/// Collapses corrected entries so one survives per (student, class, date).
pub fn latest_entries<'a, I>(entries: I) -> Vec<&'a AttendanceEntry>
where
    I: IntoIterator<Item = &'a AttendanceEntry>,
{
    let mut latest: BTreeMap<(&str, &str, NaiveDate), &AttendanceEntry> = BTreeMap::new();

    for entry in entries {
        let key = (entry.student_id.as_str(), entry.class_id.as_str(), entry.date);
        match latest.get(&key) {
            Some(current) if (current.recorded_at, current.status) >= (entry.recorded_at, entry.status) => {}
            _ => {
                latest.insert(key, entry);
            }
        }
    }

    latest.into_values().collect()
}

/// Tallies one student's attendance in one class up to and including `as_of`.
///
/// `sessions` should be the class's sessions; only scheduled ones count
/// toward `total_days`. Entries dated on a day with no session at all are
/// tallied, added to the denominator, and reported as anomalies.
pub fn aggregate_attendance<'a, E, S>(
    entries: E,
    sessions: S,
    as_of: NaiveDate,
    policy: UnmarkedPolicy,
) -> AttendanceAggregate
where
    E: IntoIterator<Item = &'a AttendanceEntry>,
    S: IntoIterator<Item = &'a ClassSession>,
{
    tally_attendance(entries, sessions, as_of, policy, true)
}

/// Same tally as [`aggregate_attendance`]. With `log_anomalies` off the
/// missing-session entries are still collected but not logged, for passes
/// over a subset of records someone has already aggregated.
pub fn tally_attendance<'a, E, S>(
    entries: E,
    sessions: S,
    as_of: NaiveDate,
    policy: UnmarkedPolicy,
    log_anomalies: bool,
) -> AttendanceAggregate
where
    E: IntoIterator<Item = &'a AttendanceEntry>,
    S: IntoIterator<Item = &'a ClassSession>,
{
    let mut scheduled = BTreeSet::new();
    let mut known = BTreeSet::new();
    for session in sessions {
        known.insert(session.date);
        if session.scheduled && session.date <= as_of {
            scheduled.insert(session.date);
        }
    }

    let mut counts = AttendanceCounts::default();
    let mut marked = BTreeSet::new();
    let mut anomalies = Vec::new();

    for entry in latest_entries(entries) {
        if entry.date > as_of {
            continue;
        }

        if scheduled.contains(&entry.date) {
            marked.insert(entry.date);
        } else if !known.contains(&entry.date) {
            if log_anomalies {
                warn!(record = %entry.record_key(), "attendance entry without a class session");
            }
            anomalies.push(RecordIssue::missing_session(entry.record_key()));
        } else {
            debug!(record = %entry.record_key(), "ignoring entry on an unscheduled session");
            continue;
        }

        counts.total_days += 1;
        match entry.status {
            AttendanceStatus::Present => counts.present_days += 1,
            AttendanceStatus::Late => counts.late_days += 1,
            AttendanceStatus::Absent => counts.absent_days += 1,
            AttendanceStatus::Excused => counts.excused_days += 1,
            AttendanceStatus::Sick => counts.sick_days += 1,
        }
    }

    for _ in scheduled.difference(&marked) {
        counts.unmarked_days += 1;
        match policy {
            UnmarkedPolicy::Absent => {
                counts.absent_days += 1;
                counts.total_days += 1;
            }
            UnmarkedPolicy::Excused => {
                counts.excused_days += 1;
                counts.total_days += 1;
            }
            UnmarkedPolicy::Excluded => {}
        }
    }

    let attendance_rate = rate(counts.present_days + counts.late_days, counts.total_days);
    let punctuality_rate = rate(counts.present_days, counts.total_days);

    debug!(
        total_days = counts.total_days,
        unmarked = counts.unmarked_days,
        %attendance_rate,
        "aggregated attendance"
    );

    AttendanceAggregate {
        counts,
        attendance_rate,
        punctuality_rate,
        anomalies,
    }
}

/// Whole-number percentage; zero when there is nothing to divide by.
fn rate(numerator: u32, total_days: u32) -> Decimal {
    if total_days == 0 {
        return round_half_up(Decimal::ZERO, 0);
    }
    round_half_up(
        Decimal::from(numerator) / Decimal::from(total_days) * Decimal::ONE_HUNDRED,
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap() + Duration::days(n)
    }

    fn sessions(days: i64) -> Vec<ClassSession> {
        (0..days)
            .map(|n| ClassSession {
                class_id: "c1".to_string(),
                date: day(n),
                scheduled: true,
            })
            .collect()
    }

    fn entry(n: i64, status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            student_id: "s1".to_string(),
            class_id: "c1".to_string(),
            date: day(n),
            status,
            recorded_at: Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap() + Duration::days(n),
        }
    }

    #[test]
    fn present_and_late_count_toward_attendance() {
        let sessions = sessions(4);
        let entries = vec![
            entry(0, AttendanceStatus::Present),
            entry(1, AttendanceStatus::Late),
            entry(2, AttendanceStatus::Sick),
            entry(3, AttendanceStatus::Present),
        ];

        let result = aggregate_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Absent);
        assert_eq!(result.counts.total_days, 4);
        assert_eq!(result.counts.sick_days, 1);
        assert_eq!(result.attendance_rate, dec!(75));
        assert_eq!(result.punctuality_rate, dec!(50));
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn no_sessions_means_zero_rates_and_no_data() {
        let entries: Vec<AttendanceEntry> = Vec::new();
        let sessions: Vec<ClassSession> = Vec::new();
        let result = aggregate_attendance(&entries, &sessions, day(0), UnmarkedPolicy::Absent);
        assert_eq!(result.attendance_rate, Decimal::ZERO);
        assert_eq!(result.punctuality_rate, Decimal::ZERO);
        assert!(!result.has_data());
        assert_eq!(result.rates(), Err(EngineError::NoAttendanceRecorded));
    }

    #[test]
    fn unmarked_days_follow_the_policy() {
        let sessions = sessions(4);
        let entries = vec![entry(0, AttendanceStatus::Present), entry(1, AttendanceStatus::Present)];

        let absent = aggregate_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Absent);
        assert_eq!(absent.counts.total_days, 4);
        assert_eq!(absent.counts.absent_days, 2);
        assert_eq!(absent.counts.unmarked_days, 2);
        assert_eq!(absent.attendance_rate, dec!(50));

        let excused = aggregate_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Excused);
        assert_eq!(excused.counts.excused_days, 2);
        assert_eq!(excused.attendance_rate, dec!(50));

        let excluded = aggregate_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Excluded);
        assert_eq!(excluded.counts.total_days, 2);
        assert_eq!(excluded.attendance_rate, dec!(100));
    }

    #[test]
    fn future_sessions_are_not_counted() {
        let sessions = sessions(10);
        let entries = vec![entry(0, AttendanceStatus::Present), entry(1, AttendanceStatus::Present)];

        let result = aggregate_attendance(&entries, &sessions, day(1), UnmarkedPolicy::Absent);
        assert_eq!(result.counts.total_days, 2);
        assert_eq!(result.attendance_rate, dec!(100));
    }

    #[test]
    fn entries_without_a_session_are_flagged_but_counted() {
        let sessions = sessions(1);
        let entries = vec![entry(0, AttendanceStatus::Present), entry(5, AttendanceStatus::Absent)];

        let result = aggregate_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Absent);
        assert_eq!(result.counts.total_days, 2);
        assert_eq!(result.counts.absent_days, 1);
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].record_key, "attendance:s1/c1/2026-02-06");
        assert_eq!(result.attendance_rate, dec!(50));
    }

    #[test]
    fn quiet_tally_still_collects_anomalies() {
        let sessions = sessions(1);
        let entries = vec![entry(0, AttendanceStatus::Present), entry(5, AttendanceStatus::Absent)];

        let loud = aggregate_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Absent);
        let quiet = tally_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Absent, false);
        assert_eq!(loud, quiet);
    }

    #[test]
    fn unscheduled_sessions_are_ignored() {
        let mut sessions = sessions(2);
        sessions[1].scheduled = false;
        let entries = vec![entry(0, AttendanceStatus::Present), entry(1, AttendanceStatus::Absent)];

        let result = aggregate_attendance(&entries, &sessions, day(10), UnmarkedPolicy::Absent);
        assert_eq!(result.counts.total_days, 1);
        assert_eq!(result.attendance_rate, dec!(100));
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn corrected_entry_replaces_the_original() {
        let sessions = sessions(1);
        let original = entry(0, AttendanceStatus::Absent);
        let mut corrected = entry(0, AttendanceStatus::Late);
        corrected.recorded_at = original.recorded_at + Duration::minutes(30);

        let result = aggregate_attendance(
            &[corrected, original],
            &sessions,
            day(10),
            UnmarkedPolicy::Absent,
        );
        assert_eq!(result.counts.total_days, 1);
        assert_eq!(result.counts.late_days, 1);
        assert_eq!(result.counts.absent_days, 0);
    }

    #[test]
    fn rates_round_half_up() {
        // 18 of 24 present and late = 75%, 17 of 24 on time = 70.83%
        let sessions = sessions(24);
        let mut entries: Vec<AttendanceEntry> = (0..17).map(|n| entry(n, AttendanceStatus::Present)).collect();
        entries.push(entry(17, AttendanceStatus::Late));

        let result = aggregate_attendance(&entries, &sessions, day(30), UnmarkedPolicy::Absent);
        assert_eq!(result.attendance_rate, dec!(75));
        assert_eq!(result.punctuality_rate, dec!(71));
    }
}
