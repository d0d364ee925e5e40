//! Search predicates over metadata records

use super::contract::MetadataRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators for field filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Equal
    Eq,
    /// Not equal; the field must be present
    Ne,
    /// Array field contains the value (a scalar field must equal it)
    Contains,
}

/// Filter expressions for [`search`](super::MetadataStore::search)
///
/// `Field` paths are dotted paths into the record payload (`"document_id"`,
/// `"source.path"`). Only backends advertising
/// [`Capabilities::FIELD_FILTERS`](super::Capabilities::FIELD_FILTERS) evaluate
/// them; others answer [`StoreError::Unsupported`](super::StoreError::Unsupported).
///
/// ```ignore
/// // every entity_ref edge for an entity, except one document's
/// let filter = RecordFilter::and(vec![
///     RecordFilter::keyspace("entity_ref"),
///     RecordFilter::field_eq("entity", json!(entity)),
///     RecordFilter::field_ne("document_id", json!(document_id)),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordFilter {
    /// Records in a keyspace
    Keyspace(String),

    /// Records whose id starts with a prefix
    IdPrefix(String),

    /// Payload field predicate
    Field(String, Op, Value),

    /// Logical AND of multiple filters
    And(Vec<RecordFilter>),

    /// Logical OR of multiple filters
    Or(Vec<RecordFilter>),
}

impl RecordFilter {
    /// Create a keyspace filter
    pub fn keyspace(keyspace: impl Into<String>) -> Self {
        RecordFilter::Keyspace(keyspace.into())
    }

    /// Create an id prefix filter
    pub fn id_prefix(prefix: impl Into<String>) -> Self {
        RecordFilter::IdPrefix(prefix.into())
    }

    /// Create a field equality filter
    pub fn field_eq(path: impl Into<String>, value: Value) -> Self {
        RecordFilter::Field(path.into(), Op::Eq, value)
    }

    /// Create a field inequality filter
    pub fn field_ne(path: impl Into<String>, value: Value) -> Self {
        RecordFilter::Field(path.into(), Op::Ne, value)
    }

    /// Create an AND filter
    pub fn and(filters: Vec<RecordFilter>) -> Self {
        RecordFilter::And(filters)
    }

    /// Create an OR filter
    pub fn or(filters: Vec<RecordFilter>) -> Self {
        RecordFilter::Or(filters)
    }

    /// Whether evaluating this filter needs field predicates anywhere in the tree
    pub fn requires_field_filters(&self) -> bool {
        match self {
            RecordFilter::Field(..) => true,
            RecordFilter::And(filters) | RecordFilter::Or(filters) => {
                filters.iter().any(RecordFilter::requires_field_filters)
            }
            RecordFilter::Keyspace(_) | RecordFilter::IdPrefix(_) => false,
        }
    }

    /// Evaluate against a record in memory
    ///
    /// An empty `And` matches everything, an empty `Or` matches nothing.
    pub fn matches(&self, record: &MetadataRecord) -> bool {
        match self {
            RecordFilter::Keyspace(keyspace) => record.keyspace == *keyspace,
            RecordFilter::IdPrefix(prefix) => record.id.starts_with(prefix.as_str()),
            RecordFilter::Field(path, op, expected) => match record.field(path) {
                None => false,
                Some(actual) => match op {
                    Op::Eq => actual == expected,
                    Op::Ne => actual != expected,
                    Op::Contains => match actual {
                        Value::Array(items) => items.contains(expected),
                        scalar => scalar == expected,
                    },
                },
            },
            RecordFilter::And(filters) => filters.iter().all(|f| f.matches(record)),
            RecordFilter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}
