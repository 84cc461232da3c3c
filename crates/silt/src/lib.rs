//! silt - batching MongoDB ingestion sink
//!
//! Receives a stream of schema-less records and durably persists them into
//! MongoDB: upsert-by-key when a stream declares a primary key, plain
//! insertion otherwise. Records accumulate into bounded batches; each batch
//! goes to the server as a single unordered bulk write, and per-record
//! problems (a malformed `_id`) are skipped with a diagnostic instead of
//! aborting the batch.
//!
//! # Pipeline
//!
//! ```text
//! records ──▶ Batcher ──▶ map_batch ──▶ BulkWriter ──▶ BulkBackend
//!             (bounded    (Insert /     (unordered     ├── MongoBackend
//!              batches)    UpsertByKey   bulk write,   └── MemoryBackend
//!                          + skips)      WriteReport)
//! ```
//!
//! One [`StreamSink`] per stream owns the whole pipeline; independent
//! streams run concurrently with no shared state.
//!
//! # Usage
//!
//! ```rust,ignore
//! use silt::{MongoSinkConfig, StreamSink};
//!
//! let config: MongoSinkConfig = serde_yaml::from_str(raw)?;
//! let mut sink = StreamSink::connect(&config, "orders", &keys).await?;
//!
//! for record in records {
//!     sink.append(record).await?;
//! }
//! let report = sink.flush().await?;
//! println!("{} written, {} skipped", report.records_written(), report.skipped);
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod mapper;
pub mod sink;
pub mod types;
pub mod writer;

pub use backend::{BulkBackend, BulkSummary, MemoryBackend, MongoBackend, WriteFailure};
pub use batch::{Batch, Batcher, BatcherConfig};
pub use config::{collection_name, MongoSinkConfig};
pub use error::{Result, SinkError};
pub use mapper::{
    convert_object_id, map_batch, KeyDescriptor, MappedBatch, SkippedRecord, WriteOperation,
    ID_FIELD,
};
pub use sink::StreamSink;
pub use types::SensitiveString;
pub use writer::{BulkWriter, WriteReport};
