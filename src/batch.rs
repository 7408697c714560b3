use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::{ClassPerformanceSummary, RecordSet};
use crate::settings::BatchSettings;
use crate::summary::{ReportScope, SummaryReportBuilder};

/// Builds one summary per scope on the blocking pool, `max_workers` at a
/// time. Results line up with `scopes`; a failed or slow class only fails
/// its own slot.
pub async fn summarize_classes(
    builder: Arc<SummaryReportBuilder>,
    records: Arc<RecordSet>,
    scopes: Vec<ReportScope>,
    settings: &BatchSettings,
) -> Vec<Result<ClassPerformanceSummary, EngineError>> {
    let limit = Duration::from_secs(settings.timeout_secs.max(1));
    run_scopes(scopes, settings.max_workers, limit, move |scope| {
        builder.build_class_summary(&records, scope)
    })
    .await
}

async fn run_scopes<F>(
    scopes: Vec<ReportScope>,
    max_workers: usize,
    limit: Duration,
    work: F,
) -> Vec<Result<ClassPerformanceSummary, EngineError>>
where
    F: Fn(&ReportScope) -> Result<ClassPerformanceSummary, EngineError> + Send + Sync + 'static,
{
    let permits = Arc::new(Semaphore::new(max_workers.max(1)));
    let work = Arc::new(work);
    let seconds = limit.as_secs();

    let handles: Vec<_> = scopes
        .into_iter()
        .map(|scope| {
            let work = Arc::clone(&work);
            let permits = Arc::clone(&permits);
            let label = scope.class_id.clone();

            let handle = tokio::spawn(async move {
                let class_id = scope.class_id.clone();
                let permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(err) => {
                        return Err(EngineError::Worker {
                            scope: class_id,
                            reason: err.to_string(),
                        })
                    }
                };
                // A timed-out build keeps running, so it holds its worker
                // slot until it actually returns.
                let job = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    work(&scope)
                });

                match timeout(limit, job).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => Err(EngineError::Worker {
                        scope: class_id,
                        reason: join_err.to_string(),
                    }),
                    Err(_) => Err(EngineError::Timeout {
                        scope: class_id,
                        seconds,
                    }),
                }
            });
            (label, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (label, handle) in handles {
        let result = handle.await.unwrap_or_else(|join_err| {
            Err(EngineError::Worker {
                scope: label.clone(),
                reason: join_err.to_string(),
            })
        });
        if let Err(err) = &result {
            warn!(class_id = %label, error = %err, "class summary failed");
        }
        results.push(result);
    }

    info!(
        classes = results.len(),
        failed = results.iter().filter(|r| r.is_err()).count(),
        "batch summaries complete"
    );
    results
}

/// One batch slot as written out: the summary, or why there is none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOutcome {
    pub class_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ClassPerformanceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Pairs batch results with the class ids they were requested for.
pub fn outcomes(
    class_ids: Vec<String>,
    results: Vec<Result<ClassPerformanceSummary, EngineError>>,
) -> Vec<ClassOutcome> {
    class_ids
        .into_iter()
        .zip(results)
        .map(|(class_id, result)| match result {
            Ok(summary) => ClassOutcome {
                class_id,
                summary: Some(summary),
                error: None,
            },
            Err(err) => ClassOutcome {
                class_id,
                summary: None,
                error: Some(err.to_string()),
            },
        })
        .collect()
}

/// One scope per class found in `records`, all sharing `as_of`.
pub fn scopes_for_all_classes(records: &RecordSet, as_of: chrono::NaiveDate) -> Vec<ReportScope> {
    records
        .class_ids()
        .into_iter()
        .map(|class_id| ReportScope::new(class_id, as_of))
        .collect()
}
