use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::StoreError;
use crate::models::{
    AssignmentGrade, AssignmentType, AttendanceEntry, AttendanceStatus, ClassSession, RecordSet,
};

/// CSV exports that make up one record set.
#[derive(Debug, Clone)]
pub struct CsvSources {
    pub grades: PathBuf,
    pub attendance: PathBuf,
    pub sessions: PathBuf,
    pub roster: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize)]
struct GradeRow {
    student_id: String,
    assignment_id: String,
    class_id: String,
    subject_id: String,
    points_earned: Decimal,
    points_possible: Decimal,
    assignment_type: AssignmentType,
    weight: Option<Decimal>,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, serde::Deserialize)]
struct AttendanceRow {
    student_id: String,
    class_id: String,
    date: NaiveDate,
    status: AttendanceStatus,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, serde::Deserialize)]
struct SessionRow {
    class_id: String,
    date: NaiveDate,
    scheduled: bool,
}

#[derive(Debug, serde::Deserialize)]
struct RosterRow {
    class_id: String,
    student_id: String,
}

pub fn load_record_set(path: &Path) -> Result<RecordSet, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

pub fn save_record_set(path: &Path, records: &RecordSet) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn import_csv(sources: &CsvSources, version: u64) -> Result<RecordSet, StoreError> {
    let grades = read_rows::<GradeRow>(&sources.grades)?
        .into_iter()
        .map(|row| AssignmentGrade {
            student_id: row.student_id,
            assignment_id: row.assignment_id,
            class_id: row.class_id,
            subject_id: row.subject_id,
            points_earned: row.points_earned,
            points_possible: row.points_possible,
            assignment_type: row.assignment_type,
            weight: row.weight,
            recorded_at: row.recorded_at,
        })
        .collect();

    let attendance = read_rows::<AttendanceRow>(&sources.attendance)?
        .into_iter()
        .map(|row| AttendanceEntry {
            student_id: row.student_id,
            class_id: row.class_id,
            date: row.date,
            status: row.status,
            recorded_at: row.recorded_at,
        })
        .collect();

    let sessions = read_rows::<SessionRow>(&sources.sessions)?
        .into_iter()
        .map(|row| ClassSession {
            class_id: row.class_id,
            date: row.date,
            scheduled: row.scheduled,
        })
        .collect();

    let mut rosters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(path) = &sources.roster {
        for row in read_rows::<RosterRow>(path)? {
            let students = rosters.entry(row.class_id).or_default();
            if !students.contains(&row.student_id) {
                students.push(row.student_id);
            }
        }
    }

    let records = RecordSet {
        version,
        grades,
        attendance,
        sessions,
        rosters,
    };
    info!(
        grades = records.grades.len(),
        attendance = records.attendance.len(),
        sessions = records.sessions.len(),
        "imported record set"
    );
    Ok(records)
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = std::fs::File::open(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_rows(file, &path.display().to_string())
}

fn parse_rows<T: DeserializeOwned, R: Read>(reader: R, label: &str) -> Result<Vec<T>, StoreError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();

    for result in reader.deserialize::<T>() {
        let row = result.map_err(|source| StoreError::Csv {
            path: label.to_string(),
            source,
        })?;
        rows.push(row);
    }

    Ok(rows)
}
