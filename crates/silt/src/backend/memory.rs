//! In-memory backend for hermetic tests and dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use parking_lot::Mutex;

use super::{BulkBackend, BulkSummary, WriteFailure};
use crate::error::{Result, SinkError};
use crate::mapper::WriteOperation;

#[derive(Debug, Default)]
struct Inner {
    documents: Vec<Document>,
    calls: u64,
    fail_call: Option<String>,
    fail_operations: Vec<(usize, String)>,
}

/// A document store held in process memory.
///
/// Operations are applied sequentially in submission order, which realizes
/// last-write-wins for duplicate keys within a batch. Upserts merge their
/// body field-by-field into the matched document (`$set` semantics); on the
/// insert side the filter fields are materialized alongside the body.
///
/// Clones share state, so a test can hand one handle to the pipeline and
/// keep another for inspection. Failure injection covers both whole-call
/// connection failures and per-index operation rejections.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    collection: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    /// Create an empty store for the given collection name.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Make every subsequent `bulk_write` call fail as a whole with a
    /// connection error.
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        self.inner.lock().fail_call = Some(message.into());
        self
    }

    /// Reject the operation at `index` in each subsequent submission; the
    /// rest of the batch still applies.
    pub fn fail_operation(self, index: usize, message: impl Into<String>) -> Self {
        self.inner.lock().fail_operations.push((index, message.into()));
        self
    }

    /// Snapshot of the stored documents.
    pub fn documents(&self) -> Vec<Document> {
        self.inner.lock().documents.clone()
    }

    /// Stored documents matching the filter.
    pub fn find(&self, filter: &Document) -> Vec<Document> {
        self.inner
            .lock()
            .documents
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .cloned()
            .collect()
    }

    /// Number of `bulk_write` calls received.
    pub fn calls(&self) -> u64 {
        self.inner.lock().calls
    }

    /// Drop all stored documents and injected failures.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.documents.clear();
        inner.fail_call = None;
        inner.fail_operations.clear();
    }
}

/// Equality match on every filter field; a null filter value matches a
/// missing field, as the real store does.
fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, value)| doc.get(key).unwrap_or(&Bson::Null) == value)
}

#[async_trait]
impl BulkBackend for MemoryBackend {
    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<BulkSummary> {
        let mut inner = self.inner.lock();
        inner.calls += 1;

        if let Some(message) = inner.fail_call.clone() {
            return Err(SinkError::connection(message));
        }

        let mut summary = BulkSummary::default();
        for (index, operation) in operations.into_iter().enumerate() {
            let injected = inner
                .fail_operations
                .iter()
                .find(|(i, _)| *i == index)
                .map(|(_, message)| message.clone());
            if let Some(message) = injected {
                summary.failures.push(WriteFailure {
                    index,
                    code: None,
                    message,
                });
                continue;
            }

            match operation {
                WriteOperation::Insert(document) => {
                    inner.documents.push(document);
                    summary.inserted += 1;
                }
                WriteOperation::UpsertByKey { filter, body } => {
                    if let Some(existing) = inner
                        .documents
                        .iter_mut()
                        .find(|doc| matches_filter(doc, &filter))
                    {
                        for (key, value) in body {
                            existing.insert(key, value);
                        }
                        summary.matched += 1;
                    } else {
                        let mut document = filter;
                        for (key, value) in body {
                            document.insert(key, value);
                        }
                        inner.documents.push(document);
                        summary.upserted += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_insert_appends_documents() {
        let backend = MemoryBackend::new("orders");
        let summary = backend
            .bulk_write(vec![
                WriteOperation::Insert(doc! {"a": 1}),
                WriteOperation::Insert(doc! {"a": 1}),
            ])
            .await
            .unwrap();

        assert_eq!(summary.inserted, 2);
        // inserts are unconditional, duplicates accumulate
        assert_eq!(backend.documents().len(), 2);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_upsert_merges_partial_update() {
        let backend = MemoryBackend::new("orders");
        backend
            .bulk_write(vec![WriteOperation::Insert(
                doc! {"sku": "A1", "price": 10, "stock": 5},
            )])
            .await
            .unwrap();

        let summary = backend
            .bulk_write(vec![WriteOperation::UpsertByKey {
                filter: doc! {"sku": "A1"},
                body: doc! {"price": 12},
            }])
            .await
            .unwrap();

        assert_eq!(summary.matched, 1);
        assert_eq!(summary.upserted, 0);
        // fields absent from the body survive
        assert_eq!(
            backend.documents(),
            vec![doc! {"sku": "A1", "price": 12, "stock": 5}]
        );
    }

    #[tokio::test]
    async fn test_upsert_without_match_materializes_filter_fields() {
        let backend = MemoryBackend::new("orders");
        let summary = backend
            .bulk_write(vec![WriteOperation::UpsertByKey {
                filter: doc! {"sku": "A1"},
                body: doc! {"price": 10},
            }])
            .await
            .unwrap();

        assert_eq!(summary.upserted, 1);
        assert_eq!(backend.documents(), vec![doc! {"sku": "A1", "price": 10}]);
    }

    #[tokio::test]
    async fn test_null_filter_matches_missing_field() {
        let backend = MemoryBackend::new("orders");
        backend
            .bulk_write(vec![WriteOperation::Insert(doc! {"price": 10})])
            .await
            .unwrap();

        let summary = backend
            .bulk_write(vec![WriteOperation::UpsertByKey {
                filter: doc! {"sku": Bson::Null},
                body: doc! {"price": 11},
            }])
            .await
            .unwrap();

        assert_eq!(summary.matched, 1);
        assert_eq!(backend.find(&doc! {"price": 11}).len(), 1);
    }

    #[tokio::test]
    async fn test_injected_call_failure() {
        let backend = MemoryBackend::new("orders").fail_with("broken pipe");
        let err = backend
            .bulk_write(vec![WriteOperation::Insert(doc! {"a": 1})])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("broken pipe"));
        assert!(backend.documents().is_empty());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_operation_failure_keeps_rest_of_batch() {
        let backend = MemoryBackend::new("orders").fail_operation(0, "duplicate key");
        let summary = backend
            .bulk_write(vec![
                WriteOperation::Insert(doc! {"a": 1}),
                WriteOperation::Insert(doc! {"b": 2}),
            ])
            .await
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].index, 0);
        assert_eq!(backend.documents(), vec![doc! {"b": 2}]);
    }

    #[tokio::test]
    async fn test_clear_resets_state() {
        let backend = MemoryBackend::new("orders").fail_with("down");
        backend.clear();
        let summary = backend
            .bulk_write(vec![WriteOperation::Insert(doc! {"a": 1})])
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
    }
}
