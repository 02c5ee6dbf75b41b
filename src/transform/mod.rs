//! Operations and transforms
//!
//! An [`Operation`] is one primitive edit to the record graph. A [`Transform`]
//! groups operations under an id and is the unit of history: it is appended to
//! the [`TransformLog`] once and never changes afterwards.

mod log;

pub use log::TransformLog;

use crate::storage::{Record, RecordIdentity, RecordSet, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One atomic edit, naming its primary record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    AddRecord {
        record: Record,
    },
    RemoveRecord {
        record: RecordIdentity,
    },
    ReplaceRecord {
        record: Record,
    },
    UpdateAttribute {
        record: RecordIdentity,
        attribute: String,
        value: Value,
    },
    ReplaceHasOne {
        record: RecordIdentity,
        relationship: String,
        #[serde(rename = "relatedRecord")]
        related_record: Option<RecordIdentity>,
    },
    ReplaceHasMany {
        record: RecordIdentity,
        relationship: String,
        #[serde(rename = "relatedRecords")]
        related_records: RecordSet,
    },
    AddToHasMany {
        record: RecordIdentity,
        relationship: String,
        #[serde(rename = "relatedRecord")]
        related_record: RecordIdentity,
    },
    RemoveFromHasMany {
        record: RecordIdentity,
        relationship: String,
        #[serde(rename = "relatedRecord")]
        related_record: RecordIdentity,
    },
}

impl Operation {
    pub fn add_record(record: Record) -> Self {
        Operation::AddRecord { record }
    }

    pub fn remove_record(record: RecordIdentity) -> Self {
        Operation::RemoveRecord { record }
    }

    pub fn replace_record(record: Record) -> Self {
        Operation::ReplaceRecord { record }
    }

    pub fn update_attribute(record: RecordIdentity, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Operation::UpdateAttribute {
            record,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn replace_has_one(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: Option<RecordIdentity>,
    ) -> Self {
        Operation::ReplaceHasOne {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn replace_has_many(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_records: impl IntoIterator<Item = RecordIdentity>,
    ) -> Self {
        Operation::ReplaceHasMany {
            record,
            relationship: relationship.into(),
            related_records: related_records.into_iter().collect(),
        }
    }

    pub fn add_to_has_many(record: RecordIdentity, relationship: impl Into<String>, related_record: RecordIdentity) -> Self {
        Operation::AddToHasMany {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn remove_from_has_many(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        Operation::RemoveFromHasMany {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    /// Identity of the primary record
    pub fn identity(&self) -> RecordIdentity {
        match self {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => record.identity(),
            Operation::RemoveRecord { record }
            | Operation::UpdateAttribute { record, .. }
            | Operation::ReplaceHasOne { record, .. }
            | Operation::ReplaceHasMany { record, .. }
            | Operation::AddToHasMany { record, .. }
            | Operation::RemoveFromHasMany { record, .. } => record.clone(),
        }
    }

    /// The relationship a relationship-level operation edits
    pub fn relationship(&self) -> Option<&str> {
        match self {
            Operation::ReplaceHasOne { relationship, .. }
            | Operation::ReplaceHasMany { relationship, .. }
            | Operation::AddToHasMany { relationship, .. }
            | Operation::RemoveFromHasMany { relationship, .. } => Some(relationship),
            _ => None,
        }
    }

    /// Operation name in its serialized form
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::AddRecord { .. } => "addRecord",
            Operation::RemoveRecord { .. } => "removeRecord",
            Operation::ReplaceRecord { .. } => "replaceRecord",
            Operation::UpdateAttribute { .. } => "updateAttribute",
            Operation::ReplaceHasOne { .. } => "replaceHasOne",
            Operation::ReplaceHasMany { .. } => "replaceHasMany",
            Operation::AddToHasMany { .. } => "addToHasMany",
            Operation::RemoveFromHasMany { .. } => "removeFromHasMany",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.kind(), self.identity())?;
        match self {
            Operation::UpdateAttribute { attribute, .. } => write!(f, ", {}", attribute)?,
            Operation::ReplaceHasOne {
                relationship,
                related_record,
                ..
            } => match related_record {
                Some(related) => write!(f, ", {}, {}", relationship, related)?,
                None => write!(f, ", {}, null", relationship)?,
            },
            Operation::ReplaceHasMany {
                relationship,
                related_records,
                ..
            } => write!(f, ", {}, [{} record(s)]", relationship, related_records.len())?,
            Operation::AddToHasMany {
                relationship,
                related_record,
                ..
            }
            | Operation::RemoveFromHasMany {
                relationship,
                related_record,
                ..
            } => write!(f, ", {}, {}", relationship, related_record)?,
            _ => {}
        }
        write!(f, ")")
    }
}

/// Opaque transform identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformId(String);

impl TransformId {
    /// A fresh random id
    pub fn generate() -> Self {
        TransformId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransformId {
    fn from(id: &str) -> Self {
        TransformId(id.to_string())
    }
}

impl From<String> for TransformId {
    fn from(id: String) -> Self {
        TransformId(id)
    }
}

/// An identified, ordered group of operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transform {
    pub id: TransformId,
    pub operations: Vec<Operation>,
}

impl Transform {
    /// Create a transform with a generated id
    pub fn new(operations: Vec<Operation>) -> Self {
        Self::with_id(TransformId::generate(), operations)
    }

    pub fn with_id(id: impl Into<TransformId>, operations: Vec<Operation>) -> Self {
        Self {
            id: id.into(),
            operations,
        }
    }
}

impl From<Operation> for Transform {
    fn from(operation: Operation) -> Self {
        Transform::new(vec![operation])
    }
}

// Transforms are identified by id alone
impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transform {}
