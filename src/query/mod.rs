//! Query evaluation for relstore
//!
//! Interprets relql expressions against the cache. Evaluation only reads.

mod compare;
mod evaluator;

pub use evaluator::evaluate;

use crate::storage::{Record, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluation context
///
/// `base_path` is the cache path relative lookups such as `attribute` read
/// from. `records` sets it to `[type]`; `filter` and `sort` extend it with
/// each entry's id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    pub base_path: Vec<String>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn nested(&self, key: &str) -> Self {
        let mut base_path = self.base_path.clone();
        base_path.push(key.to_string());
        Self { base_path }
    }
}

/// Result of evaluating a query expression
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Plain value: attributes, literals, booleans, or null
    Value(Value),
    /// A single record
    Record(Arc<Record>),
    /// Records keyed by id (no order)
    Records(BTreeMap<String, Arc<Record>>),
    /// Ordered records, as produced by `sort` and `page`
    Sequence(Vec<Arc<Record>>),
}

impl QueryResult {
    /// `false` for false and null, `true` otherwise
    pub fn is_truthy(&self) -> bool {
        match self {
            QueryResult::Value(Value::Bool(b)) => *b,
            QueryResult::Value(Value::Null) => false,
            _ => true,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            QueryResult::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            QueryResult::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Records in result order: id order for mappings
    pub fn records(&self) -> Vec<&Record> {
        match self {
            QueryResult::Value(_) => Vec::new(),
            QueryResult::Record(record) => vec![record.as_ref()],
            QueryResult::Records(map) => map.values().map(|record| record.as_ref()).collect(),
            QueryResult::Sequence(seq) => seq.iter().map(|record| record.as_ref()).collect(),
        }
    }

    /// Ids of the records in result order
    pub fn ids(&self) -> Vec<&str> {
        self.records().into_iter().map(|record| record.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        match self {
            QueryResult::Value(Value::Null) => 0,
            QueryResult::Value(_) | QueryResult::Record(_) => 1,
            QueryResult::Records(map) => map.len(),
            QueryResult::Sequence(seq) => seq.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
