use std::fmt::Write;

use rust_decimal::Decimal;

use crate::models::{ClassPerformanceSummary, LetterGrade, StudentPerformanceSummary};

const NO_DATA: &str = "No data";

fn percent(value: Option<Decimal>) -> String {
    value.map_or_else(|| NO_DATA.to_string(), |v| format!("{v}%"))
}

fn letter(value: Option<LetterGrade>) -> &'static str {
    value.map_or("-", |l| l.as_str())
}

fn attendance(summary: &StudentPerformanceSummary) -> String {
    if summary.attendance_recorded {
        format!(
            "{}% ({}% on time)",
            summary.attendance_rate, summary.punctuality_rate
        )
    } else {
        NO_DATA.to_string()
    }
}

pub fn build_report(summary: &ClassPerformanceSummary) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Class Performance Report: {}", summary.class_id);
    let _ = writeln!(
        output,
        "Generated for {} as of {}",
        summary.term.as_deref().unwrap_or("all terms"),
        summary.as_of
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Averages");
    let _ = writeln!(
        output,
        "- Grade: {}",
        percent(summary.class_average_percentage)
    );
    let _ = writeln!(
        output,
        "- Attendance: {}",
        percent(summary.class_average_attendance)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rankings");

    if summary.student_summaries.is_empty() {
        let _ = writeln!(output, "No students recorded for this class.");
    } else {
        let _ = writeln!(output, "| Rank | Student | Overall | Grade | Attendance | Trend |");
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for student in summary.student_summaries.iter() {
            let rank = student
                .class_rank
                .map_or_else(|| "-".to_string(), |r| format!("{r}/{}", student.class_size));
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                rank,
                student.student_id,
                percent(student.overall_percentage),
                letter(student.overall_letter_grade),
                attendance(student),
                student.attendance_trend.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Breakdown");

    for student in summary.student_summaries.iter() {
        if student.subject_breakdown.is_empty() {
            continue;
        }
        let _ = writeln!(output, "### {}", student.student_id);
        for (subject, result) in student.subject_breakdown.iter() {
            let _ = writeln!(
                output,
                "- {}: {} ({}, {})",
                subject,
                percent(result.percentage),
                letter(result.letter_grade),
                result.trend.as_str()
            );
        }
    }

    let issues: Vec<_> = summary
        .student_summaries
        .iter()
        .flat_map(|s| s.issues.iter())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Record Issues");

    if issues.is_empty() {
        let _ = writeln!(output, "No record issues found.");
    } else {
        for issue in issues.iter() {
            let _ = writeln!(output, "- {}: {}", issue.record_key, issue.message);
        }
    }

    output
}
