//! Record batching.
//!
//! The `Batcher` accumulates records until a threshold is reached, then hands
//! the full batch back for submission. Thresholds are a record count and an
//! optional cumulative byte budget. The buffer is always reset on hand-off;
//! no partial-batch state survives a flush.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut batcher = Batcher::new().with_max_records(1000);
//!
//! for record in records {
//!     if let Some(batch) = batcher.push(record) {
//!         writer.submit(batch).await?;
//!     }
//! }
//! if let Some(batch) = batcher.flush() {
//!     writer.submit(batch).await?;
//! }
//! ```

use mongodb::bson::{Bson, Document};

use crate::config::MongoSinkConfig;

/// Thresholds for batching.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Maximum number of records per batch
    pub max_records: usize,
    /// Maximum estimated bytes per batch (0 = no limit)
    pub max_bytes: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_records: 1_000_000,
            max_bytes: 0,
        }
    }
}

impl From<&MongoSinkConfig> for BatcherConfig {
    fn from(config: &MongoSinkConfig) -> Self {
        Self {
            max_records: config.batch_max_records,
            max_bytes: config.batch_max_bytes,
        }
    }
}

/// Accumulates records into bounded batches.
#[derive(Debug, Default)]
pub struct Batcher {
    config: BatcherConfig,
    records: Vec<Document>,
    current_bytes: usize,
}

impl Batcher {
    /// Create a batcher with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batcher with the given thresholds.
    pub fn with_config(config: BatcherConfig) -> Self {
        Self {
            config,
            records: Vec::new(),
            current_bytes: 0,
        }
    }

    /// Set the record-count threshold.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.config.max_records = max_records;
        self
    }

    /// Set the byte budget (0 disables it).
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.config.max_bytes = max_bytes;
        self
    }

    /// Add a record to the current batch.
    ///
    /// Returns `Some(batch)` when a threshold is reached. If the incoming
    /// record would overflow the byte budget, the current buffer ships first
    /// and the record seeds the next batch — a single record larger than the
    /// budget still ships (alone) rather than being rejected.
    pub fn push(&mut self, record: Document) -> Option<Batch> {
        let record_bytes = estimated_size(&record);

        let over_records = self.records.len() >= self.config.max_records;
        let over_bytes = self.config.max_bytes > 0
            && self.current_bytes + record_bytes > self.config.max_bytes;

        if over_records || over_bytes {
            let batch = self.take_batch();
            self.records.push(record);
            self.current_bytes = record_bytes;
            return batch;
        }

        self.records.push(record);
        self.current_bytes += record_bytes;

        if self.records.len() >= self.config.max_records {
            return self.take_batch();
        }

        None
    }

    /// Hand off the current batch, even if under threshold.
    pub fn flush(&mut self) -> Option<Batch> {
        self.take_batch()
    }

    /// Take the current batch and reset the buffer.
    fn take_batch(&mut self) -> Option<Batch> {
        if self.records.is_empty() {
            return None;
        }

        let records = std::mem::take(&mut self.records);
        let estimated_bytes = self.current_bytes;
        self.current_bytes = 0;

        Some(Batch {
            records,
            estimated_bytes,
        })
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current estimated byte size of the buffer.
    pub fn bytes(&self) -> usize {
        self.current_bytes
    }
}

/// A batch of records ready for submission.
#[derive(Debug)]
pub struct Batch {
    /// The records in this batch
    pub records: Vec<Document>,
    /// Total estimated bytes
    pub estimated_bytes: usize,
}

impl Batch {
    /// Build a batch directly from records.
    pub fn from_records(records: Vec<Document>) -> Self {
        let estimated_bytes = records.iter().map(estimated_size).sum();
        Self {
            records,
            estimated_bytes,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.records.iter()
    }
}

impl IntoIterator for Batch {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Estimate a record's wire size without serializing it.
pub(crate) fn estimated_size(record: &Document) -> usize {
    record
        .iter()
        .map(|(key, value)| key.len() + 1 + bson_size(value))
        .sum::<usize>()
        + 5
}

fn bson_size(value: &Bson) -> usize {
    match value {
        Bson::String(s) => s.len() + 5,
        Bson::Array(items) => items.iter().map(bson_size).sum::<usize>() + 5,
        Bson::Document(doc) => estimated_size(doc),
        Bson::Binary(bin) => bin.bytes.len() + 5,
        Bson::Null | Bson::Boolean(_) => 1,
        Bson::Int32(_) => 4,
        Bson::ObjectId(_) => 12,
        _ => 8,
    }
}
