//! Cache integrity
//!
//! Removing a record clears every reference other records hold to it.
//! Records unlinked from a `dependent: remove` relationship are removed once
//! the unlinking settled and nothing links them any more.

use super::{unlink, OperationProcessor};
use crate::error::Result;
use crate::storage::{Cache, Record, RelationshipData};
use crate::transform::Operation;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheIntegrityProcessor;

impl OperationProcessor for CacheIntegrityProcessor {
    fn after(&self, cache: &Cache, operation: &Operation) -> Result<Vec<Operation>> {
        let Operation::RemoveRecord { record } = operation else {
            return Ok(Vec::new());
        };
        if !cache.contains(record) {
            return Ok(Vec::new());
        }

        let ops = cache
            .referrers(record)
            .into_iter()
            .filter(|(referrer, _)| referrer != record)
            .map(|(referrer, relationship)| {
                let data = cache.relationship_data(&referrer, &relationship);
                unlink(&referrer, &relationship, data, record)
            })
            .collect();
        Ok(ops)
    }

    fn finally(&self, cache: &Cache, operation: &Operation, prior: Option<&Record>) -> Result<Vec<Operation>> {
        let Some(prior) = prior else {
            return Ok(Vec::new());
        };
        let owner = operation.identity();
        let model = cache.schema().get_model(&owner.model)?;
        let current = cache.record(&owner);

        let mut ops = Vec::new();
        for (name, def) in model.relationships.iter() {
            if !def.is_dependent() {
                continue;
            }
            if operation.relationship().is_some_and(|edited| edited != name) {
                continue;
            }

            let remaining = current.map(|record| record.related(name)).unwrap_or_default();
            for target in prior.related(name) {
                if remaining.contains(&target) || !cache.contains(target) {
                    continue;
                }
                let orphaned = match &def.inverse {
                    Some(inverse) => is_unset(cache.relationship_data(target, inverse)),
                    None => !cache.is_referenced_by(target, &owner.model, name),
                };
                if orphaned {
                    tracing::debug!("Removing {} unlinked from dependent {}.{}", target, owner, name);
                    ops.push(Operation::remove_record(target.clone()));
                }
            }
        }
        Ok(ops)
    }
}

fn is_unset(data: Option<&RelationshipData>) -> bool {
    data.map(RelationshipData::is_empty).unwrap_or(true)
}
