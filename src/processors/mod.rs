//! Operation processors
//!
//! A processor looks at a candidate operation and the cache state and returns
//! extra operations for the three pipeline stages:
//!
//! - `before`: applied ahead of the operation
//! - `after`: computed on the state *before* the operation is written,
//!   applied right after it
//! - `finally`: computed once every `after` cascade settled, given the
//!   primary record as it was before the operation
//!
//! Processors hold no state of their own. Every operation they return goes
//! back through the full pipeline.

mod cache_integrity;
mod schema_consistency;

pub use cache_integrity::CacheIntegrityProcessor;
pub use schema_consistency::SchemaConsistencyProcessor;

use crate::error::Result;
use crate::schema::{RelationshipDef, RelationshipKind};
use crate::storage::{Cache, Record, RecordIdentity, RelationshipData};
use crate::transform::Operation;

/// A stage hook in the cache pipeline
pub trait OperationProcessor {
    fn before(&self, _cache: &Cache, _operation: &Operation) -> Result<Vec<Operation>> {
        Ok(Vec::new())
    }

    fn after(&self, _cache: &Cache, _operation: &Operation) -> Result<Vec<Operation>> {
        Ok(Vec::new())
    }

    fn finally(&self, _cache: &Cache, _operation: &Operation, _prior: Option<&Record>) -> Result<Vec<Operation>> {
        Ok(Vec::new())
    }
}

/// Operation making `target.relationship` include `subject`
fn link(target: &RecordIdentity, relationship: &str, def: &RelationshipDef, subject: &RecordIdentity) -> Operation {
    match def.kind {
        RelationshipKind::HasMany => Operation::add_to_has_many(target.clone(), relationship, subject.clone()),
        RelationshipKind::HasOne => Operation::replace_has_one(target.clone(), relationship, Some(subject.clone())),
    }
}

/// Operation dropping `subject` from `target.relationship`, shaped after the
/// data actually stored there
fn unlink(target: &RecordIdentity, relationship: &str, data: Option<&RelationshipData>, subject: &RecordIdentity) -> Operation {
    match data {
        Some(RelationshipData::HasMany(_)) => Operation::remove_from_has_many(target.clone(), relationship, subject.clone()),
        _ => Operation::replace_has_one(target.clone(), relationship, None),
    }
}
