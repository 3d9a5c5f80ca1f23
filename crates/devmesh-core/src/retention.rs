//! TTL retention: batched deletion of events beyond the horizon, then of
//! templates nothing references anymore.

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::db::Store;
use crate::error::Result;

/// Outcome of a retention run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub events_deleted: u64,
    pub templates_deleted: u64,
    pub batches: u32,
    /// Set on dry runs instead of deleting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_delete: Option<i64>,
}

/// Delete events older than the horizon and templates left unreferenced
/// outside it. Deletes are batched so the hot table is never locked for
/// long; templates still referenced by any event are never removed.
pub async fn run_retention(
    store: &Store,
    horizon: Duration,
    batch_size: i64,
    dry_run: bool,
) -> Result<RetentionReport> {
    let cutoff = Utc::now() - horizon;
    let mut report = RetentionReport::default();

    let to_delete = store.count_events_before(cutoff).await?;
    log::info!(
        "retention: cutoff={} events_to_delete={to_delete} dry_run={dry_run}",
        cutoff.to_rfc3339()
    );

    if dry_run {
        report.would_delete = Some(to_delete);
        return Ok(report);
    }

    loop {
        let deleted = store.delete_events_before(cutoff, batch_size).await?;
        if deleted == 0 {
            break;
        }
        report.batches += 1;
        report.events_deleted += deleted;
        log::info!(
            "retention batch {}: deleted {deleted} events (total {})",
            report.batches,
            report.events_deleted
        );
    }

    report.templates_deleted = store.delete_unreferenced_templates_before(cutoff).await?;
    log::info!(
        "retention complete: {} events, {} templates removed",
        report.events_deleted,
        report.templates_deleted
    );

    Ok(report)
}
