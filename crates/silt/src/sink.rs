//! Per-stream pipeline orchestration.
//!
//! A `StreamSink` owns one stream's batcher, key descriptor and writer, and
//! wires them into the append → map → submit flow. Every mutating operation
//! takes `&mut self`, so appends cannot interleave with an in-flight
//! submission on the same stream; independent streams are independent values
//! and run concurrently without shared state.

use futures::{Stream, StreamExt};
use mongodb::bson::Document;
use tracing::{debug, info};

use crate::backend::{BulkBackend, MongoBackend};
use crate::batch::{Batch, Batcher, BatcherConfig};
use crate::config::{collection_name, MongoSinkConfig};
use crate::error::Result;
use crate::mapper::{map_batch, KeyDescriptor};
use crate::writer::{BulkWriter, WriteReport};

/// One stream's ingestion pipeline.
#[derive(Debug)]
pub struct StreamSink<B> {
    batcher: Batcher,
    key: Option<KeyDescriptor>,
    writer: BulkWriter<B>,
}

impl<B: BulkBackend> StreamSink<B> {
    /// Wire a pipeline over the given backend.
    pub fn new(backend: B, key: Option<KeyDescriptor>, batcher_config: BatcherConfig) -> Self {
        Self {
            batcher: Batcher::with_config(batcher_config),
            key,
            writer: BulkWriter::new(backend),
        }
    }

    /// The configured key, if any.
    pub fn key(&self) -> Option<&KeyDescriptor> {
        self.key.as_ref()
    }

    /// Destination collection name.
    pub fn collection(&self) -> &str {
        self.writer.collection()
    }

    /// Records currently buffered.
    pub fn buffered(&self) -> usize {
        self.batcher.len()
    }

    /// The backend behind the writer.
    pub fn backend(&self) -> &B {
        self.writer.backend()
    }

    /// Buffer one record.
    ///
    /// When the record fills the batch, the batch is mapped and submitted
    /// before this returns — the producer blocks until the write attempt
    /// completes (`Some(report)`). Otherwise returns `Ok(None)` immediately.
    pub async fn append(&mut self, record: Document) -> Result<Option<WriteReport>> {
        match self.batcher.push(record) {
            Some(batch) => self.submit(batch).await.map(Some),
            None => Ok(None),
        }
    }

    /// Force submission of the current buffer, even under threshold.
    ///
    /// An empty buffer yields an all-zero report and no backend call.
    pub async fn flush(&mut self) -> Result<WriteReport> {
        match self.batcher.flush() {
            Some(batch) => self.submit(batch).await,
            None => Ok(WriteReport::default()),
        }
    }

    /// Drive a record stream to completion: append every record, flush the
    /// residue, and return the merged report for the whole run.
    pub async fn write_all(&mut self, records: impl Stream<Item = Document>) -> Result<WriteReport> {
        let mut records = std::pin::pin!(records);
        let mut total = WriteReport::default();

        while let Some(record) = records.next().await {
            if let Some(report) = self.append(record).await? {
                total.merge(report);
            }
        }
        total.merge(self.flush().await?);

        info!(
            collection = self.collection(),
            written = total.records_written(),
            skipped = total.skipped,
            failed = total.failed,
            "Stream complete"
        );
        Ok(total)
    }

    // The batcher's buffer is already reset by the time the submission runs;
    // a fatal error leaves no partial-batch state behind.
    async fn submit(&mut self, batch: Batch) -> Result<WriteReport> {
        debug!(
            records = batch.len(),
            estimated_bytes = batch.estimated_bytes,
            collection = self.collection(),
            "Submitting batch"
        );
        let mapped = map_batch(batch.records, self.key.as_ref());
        self.writer.submit(mapped).await
    }
}

impl StreamSink<MongoBackend> {
    /// Build a sink for one stream against MongoDB.
    ///
    /// Validates the config, derives the collection name from the stream's
    /// logical name, takes the first declared key property as the key (any
    /// further entries are ignored), and verifies the deployment with a ping
    /// before accepting records. The connection lives as long as the sink
    /// and is released when it drops, on every exit path.
    pub async fn connect(
        config: &MongoSinkConfig,
        stream_name: &str,
        key_properties: &[String],
    ) -> Result<Self> {
        config.validate_all()?;
        let collection = collection_name(stream_name);
        let backend = MongoBackend::connect(config, collection).await?;
        Ok(Self::new(
            backend,
            KeyDescriptor::first_of(key_properties),
            BatcherConfig::from(config),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use mongodb::bson::doc;

    fn sink(backend: MemoryBackend, key: Option<KeyDescriptor>, max_records: usize) -> StreamSink<MemoryBackend> {
        StreamSink::new(
            backend,
            key,
            BatcherConfig {
                max_records,
                max_bytes: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_append_buffers_until_threshold() {
        let backend = MemoryBackend::new("orders");
        let mut sink = sink(backend.clone(), None, 3);

        assert!(sink.append(doc! {"a": 1}).await.unwrap().is_none());
        assert!(sink.append(doc! {"a": 2}).await.unwrap().is_none());
        assert_eq!(sink.buffered(), 2);
        assert_eq!(backend.calls(), 0);

        let report = sink.append(doc! {"a": 3}).await.unwrap().expect("threshold hit");
        assert_eq!(report.inserted, 3);
        assert_eq!(sink.buffered(), 0);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_is_a_no_op() {
        let backend = MemoryBackend::new("orders");
        let mut sink = sink(backend.clone(), None, 10);

        let report = sink.flush().await.unwrap();
        assert_eq!(report.records_written(), 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_fatal_error_leaves_buffer_cleared() {
        let backend = MemoryBackend::new("orders").fail_with("connection lost");
        let mut sink = sink(backend, None, 10);

        sink.append(doc! {"a": 1}).await.unwrap();
        assert!(sink.flush().await.is_err());
        // no partial-batch state survives the failed flush
        assert_eq!(sink.buffered(), 0);
    }

    #[tokio::test]
    async fn test_write_all_flushes_residue_and_merges_reports() {
        let backend = MemoryBackend::new("orders");
        let mut sink = sink(backend.clone(), None, 2);

        let records = futures::stream::iter(vec![
            doc! {"a": 1},
            doc! {"a": 2},
            doc! {"a": 3},
        ]);
        let report = sink.write_all(records).await.unwrap();

        assert_eq!(report.inserted, 3);
        // one threshold batch plus one residue flush
        assert_eq!(backend.calls(), 2);
        assert_eq!(backend.documents().len(), 3);
    }

    #[tokio::test]
    async fn test_independent_streams_share_nothing() {
        let orders = MemoryBackend::new("orders");
        let users = MemoryBackend::new("users");
        let mut order_sink = sink(orders.clone(), None, 10);
        let mut user_sink = sink(users.clone(), None, 10);

        order_sink.append(doc! {"a": 1}).await.unwrap();
        user_sink.append(doc! {"b": 2}).await.unwrap();
        order_sink.flush().await.unwrap();
        user_sink.flush().await.unwrap();

        assert_eq!(orders.documents(), vec![doc! {"a": 1}]);
        assert_eq!(users.documents(), vec![doc! {"b": 2}]);
    }
}
