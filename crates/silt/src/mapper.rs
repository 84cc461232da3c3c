//! Record-to-operation mapping.
//!
//! Each record in a batch becomes exactly one write operation, or is
//! explicitly recorded as skipped — nothing is dropped silently. Without a
//! key every record maps to an insert. With a key, records map to
//! upsert-by-key operations; a key on the reserved `_id` field additionally
//! goes through native ObjectId conversion, and records whose value does not
//! convert are skipped with a diagnostic instead of aborting the batch.

use mongodb::bson::{oid::ObjectId, Bson, Document};
use serde::Serialize;
use tracing::warn;

/// MongoDB's reserved document-identifier field.
pub const ID_FIELD: &str = "_id";

/// Diagnostics retained per batch. Skips beyond this are still counted,
/// their details are dropped to bound memory on pathological batches.
const MAX_SKIP_DIAGNOSTICS: usize = 1_000;

/// The designated primary-key field for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    field: String,
}

impl KeyDescriptor {
    /// Key on the given field name.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Take the first declared key property; streams declaring several keys
    /// are matched on the first one only.
    pub fn first_of(key_properties: &[String]) -> Option<Self> {
        key_properties.first().map(Self::new)
    }

    /// The key field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Whether this key targets the reserved `_id` field.
    pub fn is_identifier(&self) -> bool {
        self.field == ID_FIELD
    }
}

/// One mapped write operation. Lives only for the duration of a batch
/// submission.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    /// Unconditionally create a new document.
    Insert(Document),
    /// Apply `body` as a partial update to the document matching `filter`,
    /// creating it from filter + body when no match exists. Fields absent
    /// from `body` are left untouched on an existing document.
    UpsertByKey { filter: Document, body: Document },
}

/// Diagnostic for a record skipped during mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// The offending key value
    pub value: Bson,
    /// Why it could not be used
    pub error: String,
}

/// Output of mapping one batch: the operations to submit plus skip
/// accounting.
#[derive(Debug, Default)]
pub struct MappedBatch {
    /// Operations in record order
    pub operations: Vec<WriteOperation>,
    /// Total records skipped
    pub skipped: u64,
    /// Details for the first 1,000 skips
    pub skip_reasons: Vec<SkippedRecord>,
}

impl MappedBatch {
    /// Whether there is nothing to submit.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Convert a raw key value into a native ObjectId.
///
/// An existing ObjectId passes through; a 24-character hex string is parsed.
/// Null (including a missing field read as null) and every other type fail.
pub fn convert_object_id(value: &Bson) -> std::result::Result<ObjectId, String> {
    match value {
        Bson::ObjectId(oid) => Ok(*oid),
        Bson::String(s) => {
            ObjectId::parse_str(s).map_err(|e| format!("invalid ObjectId '{}': {}", s, e))
        }
        Bson::Null => Err("missing or null identifier value".to_string()),
        other => Err(format!(
            "unsupported identifier type {:?}",
            other.element_type()
        )),
    }
}

/// Map one record against the key. Consumes the record; on success the key
/// value lands in the filter (and, for `_id` keys, is removed from the body).
fn map_record(
    mut record: Document,
    key: &KeyDescriptor,
) -> std::result::Result<WriteOperation, SkippedRecord> {
    // missing field reads as null, same as the lookup it replaces
    let raw = record.get(key.field()).cloned().unwrap_or(Bson::Null);

    let key_value = if key.is_identifier() {
        match convert_object_id(&raw) {
            Ok(oid) => {
                // the identifier must not appear in both filter and update
                record.remove(ID_FIELD);
                Bson::ObjectId(oid)
            }
            Err(error) => return Err(SkippedRecord { value: raw, error }),
        }
    } else {
        raw
    };

    let mut filter = Document::new();
    filter.insert(key.field(), key_value);

    Ok(WriteOperation::UpsertByKey {
        filter,
        body: record,
    })
}

/// Map a batch of records into write operations.
///
/// With no key configured every record becomes an insert and no key
/// inspection occurs. With a key, each record independently maps or skips;
/// a skip never aborts the rest of the batch.
pub fn map_batch(records: Vec<Document>, key: Option<&KeyDescriptor>) -> MappedBatch {
    let mut mapped = MappedBatch {
        operations: Vec::with_capacity(records.len()),
        ..Default::default()
    };

    let Some(key) = key else {
        for record in records {
            mapped.operations.push(WriteOperation::Insert(record));
        }
        return mapped;
    };

    for record in records {
        match map_record(record, key) {
            Ok(op) => mapped.operations.push(op),
            Err(skip) => {
                warn!(
                    key_value = %skip.value,
                    "Malformed key, skipping record: {}", skip.error
                );
                mapped.skipped += 1;
                if mapped.skip_reasons.len() < MAX_SKIP_DIAGNOSTICS {
                    mapped.skip_reasons.push(skip);
                }
            }
        }
    }

    mapped
}
