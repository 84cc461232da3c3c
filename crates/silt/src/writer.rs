//! Bulk submission and result aggregation.
//!
//! The `BulkWriter` takes a mapped batch, submits it to the backend as one
//! unordered bulk write, and folds the backend's summary plus the mapper's
//! skip accounting into a single `WriteReport`.

use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{BulkBackend, WriteFailure};
use crate::error::Result;
use crate::mapper::{MappedBatch, SkippedRecord, WriteOperation};

/// Aggregate outcome of one batch submission.
///
/// `updated` counts upsert filters that *matched* an existing document, not
/// documents the server actually modified: re-submitting an identical batch
/// reports every record as updated even though each `$set` was a no-op.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteReport {
    /// Documents created by insert operations
    pub inserted: u64,
    /// Upserts that matched an existing document
    pub updated: u64,
    /// Upserts that created a new document
    pub upserted: u64,
    /// Records skipped during mapping
    pub skipped: u64,
    /// Operations individually rejected by the backend
    pub failed: u64,
    /// Diagnostics for skipped records
    pub skip_reasons: Vec<SkippedRecord>,
    /// Diagnostics for rejected operations
    pub write_failures: Vec<WriteFailure>,
}

impl WriteReport {
    /// Total records that reached the store.
    pub fn records_written(&self) -> u64 {
        self.inserted + self.updated + self.upserted
    }

    /// Fold another report's counts and diagnostics into this one.
    pub fn merge(&mut self, other: WriteReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.upserted += other.upserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.skip_reasons.extend(other.skip_reasons);
        self.write_failures.extend(other.write_failures);
    }
}

/// Submits mapped batches to a backend, one unordered bulk write per batch.
#[derive(Debug)]
pub struct BulkWriter<B> {
    backend: B,
}

impl<B: BulkBackend> BulkWriter<B> {
    /// Wrap a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Destination collection name.
    pub fn collection(&self) -> &str {
        self.backend.collection()
    }

    /// Submit one mapped batch.
    ///
    /// An empty operation sequence returns immediately with zero counts and
    /// no backend call; skip diagnostics collected during mapping still ride
    /// along in the report. Per-operation rejections from the backend are
    /// surfaced in the report, not as `Err` — only whole-call failures
    /// (connectivity, auth, timeout) propagate.
    ///
    /// Duplicate keys within one batch are not coalesced: both operations
    /// are submitted and, execution order being unspecified for unordered
    /// bulk writes, the surviving value is last-write-wins at the backend's
    /// discretion.
    pub async fn submit(&self, mapped: MappedBatch) -> Result<WriteReport> {
        let MappedBatch {
            operations,
            skipped,
            skip_reasons,
        } = mapped;

        let mut report = WriteReport {
            skipped,
            skip_reasons,
            ..Default::default()
        };
        if report.skipped > 0 {
            counter!("silt_records_skipped_total").increment(report.skipped);
        }

        if operations.is_empty() {
            debug!(
                collection = self.backend.collection(),
                "No operations to submit, skipping backend call"
            );
            return Ok(report);
        }

        let record_count = operations.len();
        let keyed = operations
            .iter()
            .any(|op| matches!(op, WriteOperation::UpsertByKey { .. }));

        let started = Instant::now();
        let summary = self.backend.bulk_write(operations).await?;
        histogram!("silt_flush_duration_seconds").record(started.elapsed().as_secs_f64());
        counter!("silt_batches_total").increment(1);

        report.inserted = summary.inserted;
        report.updated = summary.matched;
        report.upserted = summary.upserted;
        report.failed = summary.failures.len() as u64;
        report.write_failures = summary.failures;
        counter!("silt_records_written_total").increment(report.records_written());

        if keyed {
            info!(
                updated = report.updated,
                upserted = report.upserted,
                "Bulk write completed: {} updated, {} upserted.",
                report.updated,
                report.upserted
            );
        }
        info!(
            records = record_count,
            collection = self.backend.collection(),
            "Uploaded {} records into {}",
            record_count,
            self.backend.collection()
        );

        Ok(report)
    }
}
