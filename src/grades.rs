use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{EngineError, RecordIssue};
use crate::models::{round_half_up, AssignmentGrade, LetterGrade};

/// Decimal places kept on grade percentages.
pub const PERCENTAGE_DP: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct GradeAggregate {
    pub percentage: Option<Decimal>,
    pub letter_grade: Option<LetterGrade>,
    pub counted: usize,
    pub excluded: Vec<RecordIssue>,
}

impl GradeAggregate {
    pub fn percentage(&self) -> Result<Decimal, EngineError> {
        self.percentage.ok_or(EngineError::NoGradesRecorded)
    }
}

pub fn validate_grade(grade: &AssignmentGrade) -> Result<(), EngineError> {
    let reason = if grade.points_possible <= Decimal::ZERO {
        Some("points possible must be positive")
    } else if grade.points_earned < Decimal::ZERO {
        Some("points earned must not be negative")
    } else if grade.points_earned > grade.points_possible {
        Some("points earned exceeds points possible")
    } else if grade.effective_weight() < Decimal::ZERO {
        Some("weight must not be negative")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(EngineError::InvalidRecord {
            key: grade.record_key(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// The surviving record for one (student, assignment) and the day that
/// assignment was first recorded, which places it in a term or window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentGrade<'a> {
    pub grade: &'a AssignmentGrade,
    pub first_recorded: NaiveDate,
}

/// Collapses resubmitted grades so only the latest `recorded_at` per
/// (student, assignment) survives. Output is sorted by that key.
pub fn current_grades<'a, I>(grades: I) -> Vec<CurrentGrade<'a>>
where
    I: IntoIterator<Item = &'a AssignmentGrade>,
{
    let mut latest: HashMap<(&str, &str), CurrentGrade<'a>> = HashMap::new();

    for grade in grades {
        let key = (grade.student_id.as_str(), grade.assignment_id.as_str());
        let day = grade.recorded_at.date_naive();
        match latest.get_mut(&key) {
            Some(current) => {
                current.first_recorded = current.first_recorded.min(day);
                if supersedes(grade, current.grade) {
                    current.grade = grade;
                }
            }
            None => {
                latest.insert(
                    key,
                    CurrentGrade {
                        grade,
                        first_recorded: day,
                    },
                );
            }
        }
    }

    let mut values: Vec<CurrentGrade<'a>> = latest.into_values().collect();
    values.sort_by(|a, b| {
        (a.grade.student_id.as_str(), a.grade.assignment_id.as_str())
            .cmp(&(b.grade.student_id.as_str(), b.grade.assignment_id.as_str()))
    });
    values
}

pub fn latest_grades<'a, I>(grades: I) -> Vec<&'a AssignmentGrade>
where
    I: IntoIterator<Item = &'a AssignmentGrade>,
{
    current_grades(grades).into_iter().map(|c| c.grade).collect()
}

// Exact recorded_at ties fall back on the record values so the winner does
// not depend on arrival order.
fn supersedes(candidate: &AssignmentGrade, current: &AssignmentGrade) -> bool {
    let rank = |g: &AssignmentGrade| {
        (
            g.recorded_at,
            g.points_earned,
            g.points_possible,
            g.effective_weight(),
            g.assignment_type,
            g.subject_id.clone(),
            g.class_id.clone(),
        )
    };
    rank(candidate) > rank(current)
}

/// Weighted percentage over one student's grades in a subject.
///
/// Malformed records are skipped and reported in `excluded`; the remaining
/// records still produce a result. No gradable records yields `None`
/// rather than zero.
pub fn aggregate_grades<'a, I>(grades: I) -> GradeAggregate
where
    I: IntoIterator<Item = &'a AssignmentGrade>,
{
    let mut earned = Decimal::ZERO;
    let mut possible = Decimal::ZERO;
    let mut counted = 0usize;
    let mut excluded = Vec::new();

    for grade in latest_grades(grades) {
        if let Err(err) = validate_grade(grade) {
            warn!(record = %grade.record_key(), error = %err, "excluding grade");
            excluded.push(RecordIssue::invalid(grade.record_key(), reason_of(&err)));
            continue;
        }

        let weight = grade.effective_weight();
        let sums = grade
            .points_earned
            .checked_mul(weight)
            .zip(grade.points_possible.checked_mul(weight))
            .and_then(|(e, p)| Some((earned.checked_add(e)?, possible.checked_add(p)?)));

        match sums {
            Some((e, p)) => {
                earned = e;
                possible = p;
                counted += 1;
            }
            None => {
                warn!(record = %grade.record_key(), "excluding grade that overflows the running total");
                excluded.push(RecordIssue::invalid(
                    grade.record_key(),
                    "weighted points overflow",
                ));
            }
        }
    }

    let percentage = if possible > Decimal::ZERO {
        Some(round_half_up(
            earned / possible * Decimal::ONE_HUNDRED,
            PERCENTAGE_DP,
        ))
    } else {
        None
    };

    debug!(counted, excluded = excluded.len(), ?percentage, "aggregated grades");

    GradeAggregate {
        percentage,
        letter_grade: percentage.map(LetterGrade::from_percentage),
        counted,
        excluded,
    }
}

fn reason_of(err: &EngineError) -> String {
    match err {
        EngineError::InvalidRecord { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
