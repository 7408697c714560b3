use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::attendance::{aggregate_attendance, tally_attendance, AttendanceAggregate, UnmarkedPolicy};
use crate::error::{EngineError, RecordIssue};
use crate::grades::{aggregate_grades, current_grades, CurrentGrade, PERCENTAGE_DP};
use crate::models::{
    round_half_up, AssignmentGrade, AttendanceEntry, ClassPerformanceSummary, ClassSession,
    LetterGrade, RecordSet, StudentPerformanceSummary, SubjectResult, Term,
};
use crate::ranking::RankingEngine;
use crate::settings::EngineSettings;
use crate::trend::{DateRange, TrendClassifier, TrendWindows};

/// Which class, as of which day, and optionally within which term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportScope {
    pub class_id: String,
    pub as_of: NaiveDate,
    #[serde(default)]
    pub term: Option<Term>,
}

impl ReportScope {
    pub fn new(class_id: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            class_id: class_id.into(),
            as_of,
            term: None,
        }
    }

    pub fn with_term(mut self, term: Term) -> Self {
        self.term = Some(term);
        self
    }

    fn in_term(&self, date: NaiveDate) -> bool {
        self.term.as_ref().map_or(true, |term| term.contains(date))
    }
}

/// Composes the aggregators into per-student and per-class summaries.
///
/// The builder holds only configuration; every call recomputes from the
/// records it is given.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReportBuilder {
    trend: TrendClassifier,
    ranking: RankingEngine,
    window_days: u32,
    unmarked_policy: UnmarkedPolicy,
}

impl Default for SummaryReportBuilder {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

struct ClassRecords<'a> {
    grades: Vec<CurrentGrade<'a>>,
    attendance: Vec<&'a AttendanceEntry>,
    sessions: Vec<&'a ClassSession>,
    students: BTreeSet<&'a str>,
}

impl SummaryReportBuilder {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            trend: TrendClassifier::new(settings.trend.deadband),
            ranking: RankingEngine::new(settings.ranking.tie_precision),
            window_days: settings.trend.window_days,
            unmarked_policy: settings.attendance.unmarked_policy,
        }
    }

    pub fn build_class_summary(
        &self,
        records: &RecordSet,
        scope: &ReportScope,
    ) -> Result<ClassPerformanceSummary, EngineError> {
        let span = debug_span!("class_summary", class_id = %scope.class_id, as_of = %scope.as_of);
        let _guard = span.enter();

        let class = self.select(records, scope);
        let windows = TrendWindows::ending_at(scope.as_of, self.window_days);

        let mut grades_by_student: HashMap<&str, Vec<CurrentGrade>> = HashMap::new();
        for &current in &class.grades {
            grades_by_student
                .entry(current.grade.student_id.as_str())
                .or_default()
                .push(current);
        }
        let mut attendance_by_student: HashMap<&str, Vec<&AttendanceEntry>> = HashMap::new();
        for &entry in &class.attendance {
            attendance_by_student.entry(entry.student_id.as_str()).or_default().push(entry);
        }

        let mut drafts: BTreeMap<&str, StudentPerformanceSummary> = BTreeMap::new();
        for &student_id in &class.students {
            let grades = grades_by_student.remove(student_id).unwrap_or_default();
            let attendance = attendance_by_student.remove(student_id).unwrap_or_default();
            let draft = self.student_draft(
                student_id,
                scope,
                &windows,
                &grades,
                &attendance,
                &class.sessions,
            );
            drafts.insert(student_id, draft);
        }

        let ranking_input: Vec<(String, Option<Decimal>)> = drafts
            .values()
            .map(|s| (s.student_id.clone(), s.overall_percentage))
            .collect();
        let ranking = self.ranking.rank(&ranking_input)?;

        let mut student_summaries = Vec::with_capacity(ranking.entries.len());
        for entry in ranking.entries {
            if let Some(mut summary) = drafts.remove(entry.student_id.as_str()) {
                summary.class_rank = entry.rank;
                summary.percentile = entry.percentile;
                summary.class_size = ranking.class_size;
                student_summaries.push(summary);
            }
        }

        let class_average_percentage =
            mean(student_summaries.iter().filter_map(|s| s.overall_percentage), PERCENTAGE_DP);
        let class_average_attendance = mean(
            student_summaries
                .iter()
                .filter(|s| s.attendance_recorded)
                .map(|s| s.attendance_rate),
            1,
        );

        debug!(
            students = student_summaries.len(),
            eligible = ranking.eligible,
            ?class_average_percentage,
            "built class summary"
        );

        Ok(ClassPerformanceSummary {
            class_id: scope.class_id.clone(),
            term: scope.term.as_ref().map(|t| t.name.clone()),
            as_of: scope.as_of,
            student_summaries,
            class_average_percentage,
            class_average_attendance,
        })
    }

    /// One student's summary, ranked against the rest of the class.
    pub fn build_student_summary(
        &self,
        records: &RecordSet,
        scope: &ReportScope,
        student_id: &str,
    ) -> Result<StudentPerformanceSummary, EngineError> {
        self.build_class_summary(records, scope)?
            .student_summaries
            .into_iter()
            .find(|s| s.student_id == student_id)
            .ok_or_else(|| EngineError::UnknownStudent {
                student_id: student_id.to_string(),
                class_id: scope.class_id.clone(),
            })
    }

    fn select<'a>(&self, records: &'a RecordSet, scope: &ReportScope) -> ClassRecords<'a> {
        let class_id = scope.class_id.as_str();

        // Corrections are collapsed before the class and term filters so a
        // regrade filed after the term, or under another class, still
        // replaces the original. The first recording places it in a term.
        let grades: Vec<CurrentGrade> = current_grades(
            records
                .grades
                .iter()
                .filter(|g| g.recorded_at.date_naive() <= scope.as_of),
        )
        .into_iter()
        .filter(|c| c.grade.class_id == class_id && scope.in_term(c.first_recorded))
        .collect();
        let attendance: Vec<&AttendanceEntry> = records
            .attendance
            .iter()
            .filter(|a| a.class_id == class_id && scope.in_term(a.date))
            .collect();
        let sessions: Vec<&ClassSession> = records
            .sessions
            .iter()
            .filter(|s| s.class_id == class_id && scope.in_term(s.date))
            .collect();

        let mut students: BTreeSet<&str> = records
            .rosters
            .get(class_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        students.extend(grades.iter().map(|c| c.grade.student_id.as_str()));
        students.extend(attendance.iter().map(|a| a.student_id.as_str()));

        ClassRecords {
            grades,
            attendance,
            sessions,
            students,
        }
    }

    fn student_draft(
        &self,
        student_id: &str,
        scope: &ReportScope,
        windows: &TrendWindows,
        grades: &[CurrentGrade],
        attendance: &[&AttendanceEntry],
        sessions: &[&ClassSession],
    ) -> StudentPerformanceSummary {
        let mut issues: Vec<RecordIssue> = Vec::new();

        let mut by_subject: BTreeMap<&str, Vec<CurrentGrade>> = BTreeMap::new();
        for &current in grades {
            by_subject
                .entry(current.grade.subject_id.as_str())
                .or_default()
                .push(current);
        }

        let mut subject_breakdown = BTreeMap::new();
        for (subject_id, subject_grades) in by_subject {
            let all = aggregate_grades(subject_grades.iter().map(|c| c.grade));
            let recent = aggregate_grades(in_window(&subject_grades, &windows.recent));
            let prior = aggregate_grades(in_window(&subject_grades, &windows.prior));
            issues.extend(all.excluded);

            subject_breakdown.insert(
                subject_id.to_string(),
                SubjectResult {
                    percentage: all.percentage,
                    letter_grade: all.letter_grade,
                    trend: self.trend.classify(recent.percentage, prior.percentage),
                    graded_count: all.counted,
                },
            );
        }

        let overall_percentage = mean(
            subject_breakdown.values().filter_map(|s| s.percentage),
            PERCENTAGE_DP,
        );

        let overall = aggregate_attendance(
            attendance.iter().copied(),
            sessions.iter().copied(),
            scope.as_of,
            self.unmarked_policy,
        );
        let recent = self.window_attendance(attendance, sessions, &windows.recent);
        let prior = self.window_attendance(attendance, sessions, &windows.prior);
        issues.extend(overall.anomalies.iter().cloned());
        issues.sort();

        StudentPerformanceSummary {
            student_id: student_id.to_string(),
            class_id: scope.class_id.clone(),
            subject_breakdown,
            overall_percentage,
            overall_letter_grade: overall_percentage.map(LetterGrade::from_percentage),
            attendance_rate: overall.attendance_rate,
            punctuality_rate: overall.punctuality_rate,
            attendance_recorded: overall.has_data(),
            attendance: overall.counts,
            attendance_trend: self.trend.classify(
                recent.rates().ok().map(|(rate, _)| rate),
                prior.rates().ok().map(|(rate, _)| rate),
            ),
            class_rank: None,
            percentile: None,
            class_size: 0,
            issues,
        }
    }

    // Anomalies were already logged by the overall pass.
    fn window_attendance(
        &self,
        entries: &[&AttendanceEntry],
        sessions: &[&ClassSession],
        window: &DateRange,
    ) -> AttendanceAggregate {
        tally_attendance(
            entries.iter().copied().filter(|e| window.contains(e.date)),
            sessions.iter().copied().filter(|s| window.contains(s.date)),
            window.end,
            self.unmarked_policy,
            false,
        )
    }
}

fn in_window<'a>(
    grades: &'a [CurrentGrade<'a>],
    window: &'a DateRange,
) -> impl Iterator<Item = &'a AssignmentGrade> + 'a {
    grades
        .iter()
        .filter(move |c| window.contains(c.first_recorded))
        .map(|c| c.grade)
}

/// Unweighted mean, rounded; `None` for an empty input.
fn mean<I>(values: I, dp: u32) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    let (sum, count) = values
        .into_iter()
        .fold((Decimal::ZERO, 0u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| round_half_up(sum / Decimal::from(count), dp))
}
