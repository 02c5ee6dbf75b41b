//! Schema consistency
//!
//! Keeps both sides of every declared relationship pair in step: when `a`
//! gains or loses `b` through R, `b` gains or loses `a` through R's inverse.
//!
//! Every emitted operation is checked against the current state of its
//! target first. Nothing is emitted for a target that does not exist or that
//! already matches, which is what stops two inverse edits from bouncing off
//! each other forever.

use super::{link, unlink, OperationProcessor};
use crate::error::Result;
use crate::schema::RelationshipDef;
use crate::storage::{Cache, Record, RecordIdentity, RecordSet};
use crate::transform::Operation;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaConsistencyProcessor;

impl OperationProcessor for SchemaConsistencyProcessor {
    fn after(&self, cache: &Cache, operation: &Operation) -> Result<Vec<Operation>> {
        let mut ops = Vec::new();

        match operation {
            Operation::AddRecord { record } => record_diff(cache, record, false, &mut ops)?,
            Operation::ReplaceRecord { record } => record_diff(cache, record, true, &mut ops)?,
            Operation::RemoveRecord { .. } | Operation::UpdateAttribute { .. } => {}

            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                if let Some((inverse, def)) = cache.schema().inverse(&record.model, relationship)? {
                    add_inverse(cache, related_record, inverse, def, record, &mut ops);
                }
            }

            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                if let Some((inverse, _)) = cache.schema().inverse(&record.model, relationship)? {
                    remove_inverse(cache, related_record, inverse, record, &mut ops);
                }
            }

            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record,
            } => {
                if let Some(current) = cache.record(record) {
                    let next: RecordSet = related_record.iter().cloned().collect();
                    relationship_diff(cache, current, relationship, &next, &mut ops)?;
                }
            }

            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                if let Some(current) = cache.record(record) {
                    relationship_diff(cache, current, relationship, related_records, &mut ops)?;
                }
            }
        }

        Ok(ops)
    }
}

/// Diff `current.relationship` against `next`: inverse removals in prior
/// order, then inverse additions in `next` order.
fn relationship_diff(
    cache: &Cache,
    current: &Record,
    relationship: &str,
    next: &RecordSet,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let Some((inverse, def)) = cache.schema().inverse(&current.model, relationship)? else {
        return Ok(());
    };
    let subject = current.identity();
    let prior: RecordSet = current.related(relationship).into_iter().cloned().collect();

    for removed in prior.difference(next) {
        remove_inverse(cache, removed, inverse, &subject, ops);
    }
    for added in next.difference(&prior) {
        add_inverse(cache, added, inverse, def, &subject, ops);
    }
    Ok(())
}

/// Diff a whole record against its stored version, relationship by
/// relationship in declaration order.
///
/// `merge` leaves relationships the new record omits untouched; otherwise an
/// omitted relationship counts as empty.
fn record_diff(cache: &Cache, record: &Record, merge: bool, ops: &mut Vec<Operation>) -> Result<()> {
    let identity = record.identity();
    let model = cache.schema().get_model(&record.model)?;
    let empty = Record::new(&record.model, &record.id);
    let prior = cache.record(&identity);
    let current = prior.map(|prior| prior.as_ref()).unwrap_or(&empty);

    for (name, def) in model.relationships.iter() {
        if def.inverse.is_none() {
            continue;
        }
        let next: RecordSet = match record.relationship(name) {
            Some(data) => data.members().into_iter().cloned().collect(),
            None if merge => continue,
            None => RecordSet::new(),
        };
        relationship_diff(cache, current, name, &next, ops)?;
    }

    if prior.is_none() {
        reconcile_arrival(cache, record, ops);
    }
    Ok(())
}

/// A record that others already point at is being created. Where it leaves
/// the inverse unset it adopts those referrers; where it sets the inverse
/// explicitly, referrers it does not list are cleared.
fn reconcile_arrival(cache: &Cache, record: &Record, ops: &mut Vec<Operation>) {
    let identity = record.identity();

    for (referrer, relationship) in cache.referrers(&identity) {
        if referrer == identity {
            continue;
        }
        let Ok(Some((inverse, def))) = cache.schema().inverse(&referrer.model, &relationship) else {
            continue;
        };

        match record.relationship(inverse) {
            None => ops.push(link(&identity, inverse, def, &referrer)),
            Some(data) if !data.contains(&referrer) => ops.push(unlink(
                &referrer,
                &relationship,
                cache.relationship_data(&referrer, &relationship),
                &identity,
            )),
            Some(_) => {}
        }
    }
}

fn add_inverse(
    cache: &Cache,
    target: &RecordIdentity,
    inverse: &str,
    def: &RelationshipDef,
    subject: &RecordIdentity,
    ops: &mut Vec<Operation>,
) {
    match cache.record(target) {
        Some(record) if !record.references(inverse, subject) => ops.push(link(target, inverse, def, subject)),
        // A new record pointing at itself exists once its own write lands
        None if target == subject => ops.push(link(target, inverse, def, subject)),
        _ => {}
    }
}

fn remove_inverse(
    cache: &Cache,
    target: &RecordIdentity,
    inverse: &str,
    subject: &RecordIdentity,
    ops: &mut Vec<Operation>,
) {
    match cache.record(target) {
        Some(record) if record.references(inverse, subject) => {
            ops.push(unlink(target, inverse, record.relationship(inverse), subject))
        }
        _ => {}
    }
}
