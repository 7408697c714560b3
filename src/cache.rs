use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::EngineError;
use crate::models::{ClassPerformanceSummary, RecordSet};
use crate::summary::{ReportScope, SummaryReportBuilder};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub class_id: String,
    pub term: Option<String>,
    pub as_of: NaiveDate,
    pub version: u64,
}

impl CacheKey {
    pub fn new(scope: &ReportScope, version: u64) -> Self {
        Self {
            class_id: scope.class_id.clone(),
            term: scope.term.as_ref().map(|t| t.name.clone()),
            as_of: scope.as_of,
            version,
        }
    }
}

/// Caller-owned memo of class summaries keyed by record set version.
///
/// The engine never invalidates on its own: bump `RecordSet::version` when
/// the records change, then drop stale entries with `invalidate_before`.
#[derive(Debug, Default)]
pub struct SummaryCache {
    entries: HashMap<CacheKey, ClassPerformanceSummary>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &mut self,
        builder: &SummaryReportBuilder,
        records: &RecordSet,
        scope: &ReportScope,
    ) -> Result<ClassPerformanceSummary, EngineError> {
        let key = CacheKey::new(scope, records.version);
        if let Some(hit) = self.entries.get(&key) {
            debug!(class_id = %key.class_id, version = key.version, "summary cache hit");
            return Ok(hit.clone());
        }

        let summary = builder.build_class_summary(records, scope)?;
        self.entries.insert(key, summary.clone());
        Ok(summary)
    }

    pub fn invalidate_before(&mut self, version: u64) {
        self.entries.retain(|key, _| key.version >= version);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
