use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::RecordIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentType {
    Homework,
    Quiz,
    Test,
    Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentGrade {
    pub student_id: String,
    pub assignment_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub points_earned: Decimal,
    pub points_possible: Decimal,
    pub assignment_type: AssignmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}

impl AssignmentGrade {
    /// Weight applied to this grade; records without one count as 1.
    pub fn effective_weight(&self) -> Decimal {
        self.weight.unwrap_or(Decimal::ONE)
    }

    pub fn record_key(&self) -> String {
        format!("grade:{}/{}", self.student_id, self.assignment_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    Sick,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub recorded_at: DateTime<Utc>,
}

impl AttendanceEntry {
    pub fn record_key(&self) -> String {
        format!("attendance:{}/{}/{}", self.student_id, self.class_id, self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSession {
    pub class_id: String,
    pub date: NaiveDate,
    pub scheduled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Term {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Everything the record store hands over for one aggregation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub grades: Vec<AssignmentGrade>,
    #[serde(default)]
    pub attendance: Vec<AttendanceEntry>,
    #[serde(default)]
    pub sessions: Vec<ClassSession>,
    /// Enrolled students per class id.
    #[serde(default)]
    pub rosters: BTreeMap<String, Vec<String>>,
}

impl RecordSet {
    pub fn class_ids(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self.rosters.keys().cloned().collect();
        ids.extend(self.grades.iter().map(|g| g.class_id.clone()));
        ids.extend(self.attendance.iter().map(|a| a.class_id.clone()));
        ids.extend(self.sessions.iter().map(|s| s.class_id.clone()));
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    /// Maps an already rounded percentage onto the fixed grade bands.
    pub fn from_percentage(percentage: Decimal) -> Self {
        if percentage >= Decimal::from(90) {
            LetterGrade::A
        } else if percentage >= Decimal::from(80) {
            LetterGrade::B
        } else if percentage >= Decimal::from(70) {
            LetterGrade::C
        } else if percentage >= Decimal::from(60) {
            LetterGrade::D
        } else {
            LetterGrade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub total_days: u32,
    pub present_days: u32,
    pub late_days: u32,
    pub absent_days: u32,
    pub excused_days: u32,
    pub sick_days: u32,
    pub unmarked_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub percentage: Option<Decimal>,
    pub letter_grade: Option<LetterGrade>,
    pub trend: Trend,
    pub graded_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformanceSummary {
    pub student_id: String,
    pub class_id: String,
    pub subject_breakdown: BTreeMap<String, SubjectResult>,
    /// `None` when no subject has a gradable record.
    pub overall_percentage: Option<Decimal>,
    pub overall_letter_grade: Option<LetterGrade>,
    pub attendance_rate: Decimal,
    pub punctuality_rate: Decimal,
    /// False when there were no countable days, so the zero rates mean "no data".
    pub attendance_recorded: bool,
    pub attendance: AttendanceCounts,
    pub attendance_trend: Trend,
    pub class_rank: Option<u32>,
    pub percentile: Option<Decimal>,
    pub class_size: usize,
    pub issues: Vec<RecordIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPerformanceSummary {
    pub class_id: String,
    pub term: Option<String>,
    pub as_of: NaiveDate,
    pub student_summaries: Vec<StudentPerformanceSummary>,
    pub class_average_percentage: Option<Decimal>,
    pub class_average_attendance: Option<Decimal>,
}

/// Round-half-up (away from zero) to `dp` places, with the scale pinned so
/// `90` and `90.0` render the same way.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}
