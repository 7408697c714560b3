use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("no grades recorded")]
    NoGradesRecorded,

    #[error("no attendance recorded")]
    NoAttendanceRecorded,

    #[error("attendance entry {key} has no matching class session")]
    MissingSessionData { key: String },

    #[error("student {0} appears more than once in ranking input")]
    DuplicateStudent(String),

    #[error("student {student_id} has no records in class {class_id}")]
    UnknownStudent { student_id: String, class_id: String },

    #[error("summary for {scope} timed out after {seconds}s")]
    Timeout { scope: String, seconds: u64 },

    #[error("summary worker for {scope} failed: {reason}")]
    Worker { scope: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed csv in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed record set json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    InvalidRecord,
    MissingSessionData,
}

/// A per-record problem reported next to a best-effort result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIssue {
    pub kind: IssueKind,
    pub record_key: String,
    pub message: String,
}

impl RecordIssue {
    pub fn invalid(record_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::InvalidRecord,
            record_key: record_key.into(),
            message: message.into(),
        }
    }

    pub fn missing_session(record_key: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::MissingSessionData,
            record_key: record_key.into(),
            message: "no class session exists for this date".to_string(),
        }
    }

    pub fn to_error(&self) -> EngineError {
        match self.kind {
            IssueKind::InvalidRecord => EngineError::InvalidRecord {
                key: self.record_key.clone(),
                reason: self.message.clone(),
            },
            IssueKind::MissingSessionData => EngineError::MissingSessionData {
                key: self.record_key.clone(),
            },
        }
    }
}
