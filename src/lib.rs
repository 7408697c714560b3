//! # Academic performance aggregation
//!
//! Turns raw grade and attendance records into per-student and per-class
//! summaries: weighted percentages, letter grades, attendance and
//! punctuality rates, trends and class rankings.
//!
//! Every aggregation is a pure function of the `RecordSet` it is handed.
//! Storage, rendering and scheduling live outside this crate; `store` and
//! `report` are thin adapters for the command-line tool.

pub mod attendance;
pub mod batch;
pub mod cache;
pub mod error;
pub mod grades;
pub mod models;
pub mod ranking;
pub mod report;
pub mod settings;
pub mod store;
pub mod summary;
pub mod trend;

pub use error::{ConfigError, EngineError, IssueKind, RecordIssue, StoreError};
pub use models::{
    AssignmentGrade, AssignmentType, AttendanceEntry, AttendanceStatus, ClassPerformanceSummary,
    ClassSession, LetterGrade, RecordSet, StudentPerformanceSummary, Term, Trend,
};
pub use settings::EngineSettings;
pub use summary::{ReportScope, SummaryReportBuilder};
