//! Storage backend seam.
//!
//! The writer submits batches through [`BulkBackend`], so the same pipeline
//! runs against MongoDB in production and against an in-memory store in
//! tests.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::mapper::WriteOperation;

pub mod memory;
pub mod mongo;

pub use memory::MemoryBackend;
pub use mongo::MongoBackend;

/// One backend-reported operation failure inside an otherwise-accepted
/// unordered submission (e.g. a uniqueness conflict on an insert).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteFailure {
    /// Index of the operation within the submitted batch
    pub index: usize,
    /// Backend error code, when one exists
    pub code: Option<i32>,
    /// Backend error message
    pub message: String,
}

/// Outcome counts of one unordered bulk submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkSummary {
    /// Documents created by insert operations
    pub inserted: u64,
    /// Upsert filters that matched an existing document
    pub matched: u64,
    /// Upserts that created a new document
    pub upserted: u64,
    /// Individually rejected operations; the rest of the batch still applied
    pub failures: Vec<WriteFailure>,
}

/// A document store accepting unordered bulk writes.
///
/// One submission carries a mix of inserts and upserts-by-key. Inserts
/// create documents unconditionally. Upserts partial-update the document
/// matching the filter, or create one from filter plus body when none
/// matches. Execution is unordered: one rejected operation does not stop
/// the others, and no ordering is guaranteed between operations.
///
/// `Err` is reserved for whole-call failures (connectivity, auth, timeout).
/// Per-operation rejections come back in [`BulkSummary::failures`] with the
/// call itself succeeding. The writer never submits an empty operation set.
#[async_trait]
pub trait BulkBackend: Send + Sync {
    /// Submit one unordered batch of operations.
    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<BulkSummary>;

    /// Destination collection name, for reporting.
    fn collection(&self) -> &str;
}
