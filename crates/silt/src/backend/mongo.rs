//! MongoDB backend on the official async driver.
//!
//! One sink owns one client. Driver errors are classified into the sink's
//! error taxonomy here, at the seam: a bulk-write error carrying per-index
//! write errors is a *partial* failure and comes back as a successful
//! [`BulkSummary`] with `failures` populated; everything that failed the
//! call as a whole propagates as [`SinkError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::{BulkWriteError, ErrorKind, PartialBulkWriteResult};
use mongodb::options::{
    ClientOptions, InsertOneModel, Tls, TlsOptions, UpdateModifications, UpdateOneModel, WriteModel,
};
use mongodb::{Client, Namespace};
use tracing::debug;

use super::{BulkBackend, BulkSummary, WriteFailure};
use crate::config::MongoSinkConfig;
use crate::error::{Result, SinkError};
use crate::mapper::WriteOperation;

/// Production backend writing to one MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
    namespace: Namespace,
}

impl MongoBackend {
    /// Build the client from config. No network traffic happens here for
    /// standard URIs (SRV URIs resolve their seed list during parsing).
    pub async fn new(config: &MongoSinkConfig, collection: impl Into<String>) -> Result<Self> {
        let uri = config.effective_uri()?;
        let mut options = ClientOptions::parse(uri.expose_secret())
            .await
            .map_err(|e| SinkError::config(format!("invalid connection string: {}", e)))?;

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.retry_writes = Some(config.retry_writes);
        if config.tls {
            options.tls = Some(Tls::Enabled(TlsOptions::default()));
        }

        let client = Client::with_options(options)
            .map_err(|e| SinkError::config(format!("failed to build MongoDB client: {}", e)))?;

        Ok(Self {
            client,
            namespace: Namespace::new(config.database.clone(), collection),
        })
    }

    /// Verify the deployment responds.
    pub async fn ping(&self) -> Result<()> {
        let started = Instant::now();
        self.client
            .database("admin")
            .run_command(doc! {"ping": 1})
            .await
            .map_err(classify_driver_error)?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            namespace = %self.namespace,
            "Connected to MongoDB deployment"
        );
        Ok(())
    }

    /// Build the client and verify connectivity in one step.
    pub async fn connect(config: &MongoSinkConfig, collection: impl Into<String>) -> Result<Self> {
        let backend = Self::new(config, collection).await?;
        backend.ping().await?;
        Ok(backend)
    }

    fn build_models(&self, operations: Vec<WriteOperation>) -> Vec<WriteModel> {
        operations
            .into_iter()
            .map(|operation| match operation {
                WriteOperation::Insert(document) => WriteModel::InsertOne(
                    InsertOneModel::builder()
                        .namespace(self.namespace.clone())
                        .document(document)
                        .build(),
                ),
                WriteOperation::UpsertByKey { filter, body } => WriteModel::UpdateOne(
                    UpdateOneModel::builder()
                        .namespace(self.namespace.clone())
                        .filter(filter)
                        .update(UpdateModifications::Document(doc! {"$set": body}))
                        .upsert(true)
                        .build(),
                ),
            })
            .collect()
    }
}

#[async_trait]
impl BulkBackend for MongoBackend {
    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<BulkSummary> {
        let models = self.build_models(operations);

        match self.client.bulk_write(models).ordered(false).await {
            Ok(result) => Ok(BulkSummary {
                inserted: result.inserted_count as u64,
                matched: result.matched_count as u64,
                upserted: result.upserted_count as u64,
                failures: Vec::new(),
            }),
            Err(err) => {
                let message = err.to_string();
                match *err.kind {
                    ErrorKind::BulkWrite(bulk) if !bulk.write_errors.is_empty() => {
                        Ok(summary_from_partial_failure(bulk))
                    }
                    kind => Err(classify_kind(&kind, message)),
                }
            }
        }
    }

    fn collection(&self) -> &str {
        &self.namespace.coll
    }
}

/// An unordered submission where some operations were rejected but the call
/// itself succeeded: counts come from the partial result, rejections become
/// per-index failures.
fn summary_from_partial_failure(error: BulkWriteError) -> BulkSummary {
    let (inserted, matched, upserted) = match error.partial_result {
        Some(PartialBulkWriteResult::Summary(summary)) => (
            summary.inserted_count as u64,
            summary.matched_count as u64,
            summary.upserted_count as u64,
        ),
        // verbose results are never requested; no partial result means
        // nothing applied before the errors were collected
        _ => (0, 0, 0),
    };

    let mut failures: Vec<WriteFailure> = error
        .write_errors
        .into_iter()
        .map(|(index, write_error)| WriteFailure {
            index,
            code: Some(write_error.code),
            message: write_error.message,
        })
        .collect();
    failures.sort_by_key(|failure| failure.index);

    BulkSummary {
        inserted,
        matched,
        upserted,
        failures,
    }
}

fn classify_driver_error(err: mongodb::error::Error) -> SinkError {
    let message = err.to_string();
    classify_kind(&err.kind, message)
}

fn classify_kind(kind: &ErrorKind, message: String) -> SinkError {
    match kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::DnsResolve { .. } => {
            SinkError::connection(message)
        }
        ErrorKind::Io(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => {
            SinkError::timeout(message)
        }
        ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } => {
            SinkError::connection(message)
        }
        ErrorKind::Authentication { .. } => SinkError::auth(message),
        ErrorKind::InvalidArgument { .. } => SinkError::config(message),
        _ => SinkError::backend(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensitiveString;

    fn config(uri: &str) -> MongoSinkConfig {
        MongoSinkConfig {
            connection_string: Some(SensitiveString::new(uri)),
            database: "warehouse".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_builds_client_offline() {
        let backend = MongoBackend::new(&config("mongodb://localhost:27017"), "orders")
            .await
            .unwrap();
        assert_eq!(backend.collection(), "orders");
        assert_eq!(backend.namespace.db, "warehouse");
    }

    #[tokio::test]
    async fn test_new_rejects_malformed_uri_as_config_error() {
        let err = MongoBackend::new(&config("definitely not a uri"), "orders")
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_models_maps_operation_kinds() {
        use mongodb::bson::doc;

        let backend = MongoBackend::new(&config("mongodb://localhost:27017"), "orders")
            .await
            .unwrap();
        let models = backend.build_models(vec![
            WriteOperation::Insert(doc! {"a": 1}),
            WriteOperation::UpsertByKey {
                filter: doc! {"sku": "A1"},
                body: doc! {"price": 10},
            },
        ]);

        assert_eq!(models.len(), 2);
        assert!(matches!(models[0], WriteModel::InsertOne(_)));
        assert!(matches!(models[1], WriteModel::UpdateOne(_)));
    }
}
