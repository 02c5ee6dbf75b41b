//! Record cache
//!
//! The cache owns the record graph (`type -> id -> record`) and is the only
//! place it changes. Every edit goes through [`Cache::patch`]:
//!
//! ```text
//! Enter(op)     validate against the schema, queue `before` ops ahead of op
//! Apply(op)     compute `after` ops on the pre-mutation state, write op,
//!               notify, queue Finalize(op) behind the `after` ops
//! Finalize(op)  queue `finally` ops, computed once the cascades settled
//! ```
//!
//! The worklist is an explicit stack, so cascades run depth first in the
//! order the processors produced them without recursing. An operation that
//! changes nothing is not notified and produces no cascades.
//!
//! Records are stored behind `Arc` and replaced wholesale on every write, so
//! a fork copies the maps and shares the records.

use super::index::ReferenceIndex;
use super::record::{Record, RecordIdentity, RecordSet, RelationshipData};
use crate::error::{Error, Result};
use crate::processors::{CacheIntegrityProcessor, OperationProcessor, SchemaConsistencyProcessor};
use crate::query::{self, QueryContext, QueryResult};
use crate::schema::{RelationshipKind, Schema, SchemaError};
use crate::transform::Operation;
use relql::QueryExpression;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Records of one type, by id
pub type RecordMap = BTreeMap<String, Arc<Record>>;

/// Read-only view returned by [`Cache::get`]
#[derive(Debug, Clone, Copy)]
pub enum CacheEntry<'a> {
    Records(&'a RecordMap),
    Record(&'a Arc<Record>),
    Relationship(&'a RelationshipData),
}

/// Operations applied by one `patch` call, with the operation undoing each.
///
/// `inverse[i]` undoes `applied[i]`; undo runs them last to first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchResult {
    pub applied: Vec<Operation>,
    pub inverse: Vec<Operation>,
}

impl PatchResult {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    fn push(&mut self, applied: Operation, inverse: Operation) {
        self.applied.push(applied);
        self.inverse.push(inverse);
    }
}

/// Handle returned by [`Cache::on_patch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type PatchListener = Box<dyn FnMut(&Operation)>;

enum Step {
    Enter(Operation),
    Apply(Operation),
    Finalize(Operation, Option<Arc<Record>>),
}

/// The record graph plus its processor pipeline
pub struct Cache {
    schema: Arc<Schema>,
    records: BTreeMap<String, RecordMap>,
    index: ReferenceIndex,
    processors: Vec<Arc<dyn OperationProcessor>>,
    listeners: Vec<(ListenerId, PatchListener)>,
    next_listener: u64,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("records", &self.records)
            .field("processors", &self.processors.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Cache {
    /// Create an empty cache running the schema consistency and cache
    /// integrity processors
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_processors(
            schema,
            vec![
                Arc::new(SchemaConsistencyProcessor),
                Arc::new(CacheIntegrityProcessor),
            ],
        )
    }

    /// Create an empty cache with a custom processor pipeline
    pub fn with_processors(schema: Arc<Schema>, processors: Vec<Arc<dyn OperationProcessor>>) -> Self {
        Self {
            schema,
            records: BTreeMap::new(),
            index: ReferenceIndex::new(),
            processors,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up `[type]`, `[type, id]` or `[type, id, "relationships", name, "data"]`
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<CacheEntry<'_>> {
        match path {
            [model] => self.records.get(model.as_ref()).map(CacheEntry::Records),
            [model, id] => self
                .records
                .get(model.as_ref())?
                .get(id.as_ref())
                .map(CacheEntry::Record),
            [model, id, section, name, data] if section.as_ref() == "relationships" && data.as_ref() == "data" => self
                .records
                .get(model.as_ref())?
                .get(id.as_ref())?
                .relationship(name.as_ref())
                .map(CacheEntry::Relationship),
            _ => None,
        }
    }

    /// All records of a type
    pub fn records(&self, model: &str) -> Option<&RecordMap> {
        self.records.get(model)
    }

    pub fn record(&self, identity: &RecordIdentity) -> Option<&Arc<Record>> {
        self.records.get(&identity.model)?.get(&identity.id)
    }

    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.record(identity).is_some()
    }

    pub fn relationship_data(&self, identity: &RecordIdentity, relationship: &str) -> Option<&RelationshipData> {
        self.record(identity)?.relationship(relationship)
    }

    /// Records referencing `identity`, with the relationship they use
    pub fn referrers(&self, identity: &RecordIdentity) -> Vec<(RecordIdentity, String)> {
        self.index.referrers(identity)
    }

    /// Is `identity` referenced by any `model` record through `relationship`?
    pub fn is_referenced_by(&self, identity: &RecordIdentity, model: &str, relationship: &str) -> bool {
        self.index.is_referenced_by(identity, model, relationship)
    }

    /// Number of records of a type; 0 for unknown types
    pub fn length(&self, model: &str) -> usize {
        self.records.get(model).map(BTreeMap::len).unwrap_or(0)
    }

    /// Evaluate a query expression against the current graph
    pub fn query(&self, expression: &QueryExpression) -> Result<QueryResult> {
        query::evaluate(self, expression, &mut QueryContext::default())
    }

    /// Parse and evaluate a query in text form
    pub fn query_str(&self, input: &str) -> Result<QueryResult> {
        let expression = relql::parse(input)?;
        self.query(&expression)
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Replace the whole graph. Bypasses the processors and emits nothing.
    pub fn reset(&mut self, data: BTreeMap<String, BTreeMap<String, Record>>) {
        self.records.clear();
        self.index.clear();
        for (model, records) in data {
            self.records.entry(model).or_default();
            for record in records.into_values() {
                self.put(record);
            }
        }
        tracing::debug!("Cache reset with {} type(s)", self.records.len());
    }

    /// Replace the whole graph from `{ type: { id: record } }` JSON
    pub fn reset_from_json(&mut self, data: serde_json::Value) -> Result<()> {
        let data: BTreeMap<String, BTreeMap<String, Record>> = serde_json::from_value(data)?;
        self.reset(data);
        Ok(())
    }

    /// Export the graph as `{ type: { id: record } }` JSON
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let view: BTreeMap<&str, BTreeMap<&str, &Record>> = self
            .records
            .iter()
            .map(|(model, records)| {
                let records = records
                    .iter()
                    .map(|(id, record)| (id.as_str(), record.as_ref()))
                    .collect();
                (model.as_str(), records)
            })
            .collect();
        Ok(serde_json::to_value(view)?)
    }

    /// Independent copy of the graph sharing schema and processors. Listeners
    /// stay with the original.
    pub fn fork(&self) -> Cache {
        Cache {
            schema: Arc::clone(&self.schema),
            records: self.records.clone(),
            index: self.index.clone(),
            processors: self.processors.clone(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Register a callback invoked with every applied operation, in order
    pub fn on_patch<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Operation) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off_patch(&mut self, id: ListenerId) -> bool {
        let count = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != count
    }

    fn notify(&mut self, operation: &Operation) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(operation);
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Apply an operation and every cascade the processors derive from it
    pub fn patch(&mut self, operation: Operation) -> Result<PatchResult> {
        let mut result = PatchResult::default();
        self.patch_into(operation, &mut result)?;
        Ok(result)
    }

    /// Like `patch`, but records into `result` as it goes so a caller keeps
    /// what was applied before an error.
    pub(crate) fn patch_into(&mut self, operation: Operation, result: &mut PatchResult) -> Result<()> {
        let mut stack = vec![Step::Enter(operation)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(op) => {
                    self.validate(&op)?;
                    let before = self.collect(|processor| processor.before(self, &op))?;
                    stack.push(Step::Apply(op));
                    stack.extend(before.into_iter().rev().map(Step::Enter));
                }
                Step::Apply(op) => {
                    let prior = self.record(&op.identity()).cloned();
                    let after = self.collect(|processor| processor.after(self, &op))?;

                    let Some(inverse) = self.apply(&op)? else {
                        tracing::trace!("Skipping {}: no change", op);
                        continue;
                    };
                    tracing::trace!("Applied {}", op);
                    self.notify(&op);
                    result.push(op.clone(), inverse);

                    stack.push(Step::Finalize(op, prior));
                    stack.extend(after.into_iter().rev().map(Step::Enter));
                }
                Step::Finalize(op, prior) => {
                    let finally = self.collect(|processor| processor.finally(self, &op, prior.as_deref()))?;
                    stack.extend(finally.into_iter().rev().map(Step::Enter));
                }
            }
        }

        Ok(())
    }

    /// Apply inverse operations last to first, without processors. Each
    /// applied operation is notified.
    pub fn revert(&mut self, inverse: &[Operation]) -> Result<()> {
        for op in inverse.iter().rev() {
            if self.apply(op)?.is_some() {
                tracing::trace!("Reverted with {}", op);
                self.notify(op);
            }
        }
        Ok(())
    }

    fn collect<F>(&self, stage: F) -> Result<Vec<Operation>>
    where
        F: Fn(&dyn OperationProcessor) -> Result<Vec<Operation>>,
    {
        let mut ops = Vec::new();
        for processor in &self.processors {
            ops.extend(stage(processor.as_ref())?);
        }
        Ok(ops)
    }

    fn validate(&self, op: &Operation) -> Result<()> {
        let identity = op.identity();
        self.schema.get_model(&identity.model)?;

        match op {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                for (name, data) in &record.relationships {
                    let kind = match data {
                        RelationshipData::HasOne(_) => RelationshipKind::HasOne,
                        RelationshipData::HasMany(_) => RelationshipKind::HasMany,
                    };
                    self.check_relationship(&record.model, name, kind, data.members())?;
                }
            }
            Operation::RemoveRecord { .. } | Operation::UpdateAttribute { .. } => {}
            Operation::ReplaceHasOne {
                relationship,
                related_record,
                ..
            } => {
                self.check_relationship(&identity.model, relationship, RelationshipKind::HasOne, related_record.iter())?;
            }
            Operation::ReplaceHasMany {
                relationship,
                related_records,
                ..
            } => {
                self.check_relationship(&identity.model, relationship, RelationshipKind::HasMany, related_records.iter())?;
            }
            Operation::AddToHasMany {
                relationship,
                related_record,
                ..
            }
            | Operation::RemoveFromHasMany {
                relationship,
                related_record,
                ..
            } => {
                self.check_relationship(
                    &identity.model,
                    relationship,
                    RelationshipKind::HasMany,
                    std::iter::once(related_record),
                )?;
            }
        }
        Ok(())
    }

    fn check_relationship<'a>(
        &self,
        model: &str,
        relationship: &str,
        kind: RelationshipKind,
        related: impl IntoIterator<Item = &'a RecordIdentity>,
    ) -> std::result::Result<(), SchemaError> {
        let def = self.schema.relationship(model, relationship)?;
        if def.kind != kind {
            return Err(SchemaError::RelationshipKindMismatch {
                model: model.to_string(),
                relationship: relationship.to_string(),
                expected: def.kind,
                actual: kind,
            });
        }
        for identity in related {
            if identity.model != def.model {
                return Err(SchemaError::RelatedModelMismatch {
                    model: model.to_string(),
                    relationship: relationship.to_string(),
                    expected: def.model.clone(),
                    actual: identity.model.clone(),
                });
            }
        }
        Ok(())
    }

    /// Write one operation to storage. Returns the operation undoing it, or
    /// `None` when storage already held the result.
    fn apply(&mut self, op: &Operation) -> Result<Option<Operation>> {
        match op {
            Operation::AddRecord { record } => {
                let prior = self.record(&record.identity()).cloned();
                if prior.as_deref() == Some(record) {
                    return Ok(None);
                }
                self.put(record.clone());
                Ok(Some(restore(prior, record.identity())))
            }

            Operation::ReplaceRecord { record } => {
                let prior = self.record(&record.identity()).cloned();
                let next = match &prior {
                    Some(prior) => prior.merged_with(record),
                    None => record.clone(),
                };
                if prior.as_deref() == Some(&next) {
                    return Ok(None);
                }
                self.put(next);
                Ok(Some(restore(prior, record.identity())))
            }

            Operation::RemoveRecord { record } => Ok(self
                .take(record)
                .map(|prior| Operation::add_record(prior.as_ref().clone()))),

            Operation::UpdateAttribute {
                record,
                attribute,
                value,
            } => {
                let current = self.require(record)?;
                let inverse = match current.attribute(attribute) {
                    Some(prior) if prior == value => return Ok(None),
                    Some(prior) => Operation::update_attribute(record.clone(), attribute.clone(), prior.clone()),
                    None => Operation::add_record(current.as_ref().clone()),
                };
                let mut next = current.as_ref().clone();
                next.attributes.insert(attribute.clone(), value.clone());
                self.put(next);
                Ok(Some(inverse))
            }

            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record,
            } => {
                let current = self.require(record)?;
                let data = RelationshipData::HasOne(related_record.clone());
                let inverse = match current.relationship(relationship) {
                    Some(prior) if *prior == data => return Ok(None),
                    None if related_record.is_none() => return Ok(None),
                    Some(RelationshipData::HasOne(prior)) => {
                        Operation::replace_has_one(record.clone(), relationship.clone(), prior.clone())
                    }
                    _ => Operation::add_record(current.as_ref().clone()),
                };
                self.put_relationship(&current, relationship, data);
                Ok(Some(inverse))
            }

            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                let current = self.require(record)?;
                let data = RelationshipData::HasMany(related_records.clone());
                let inverse = match current.relationship(relationship) {
                    Some(prior) if *prior == data => return Ok(None),
                    None if related_records.is_empty() => return Ok(None),
                    Some(RelationshipData::HasMany(prior)) => {
                        Operation::replace_has_many(record.clone(), relationship.clone(), prior.iter().cloned())
                    }
                    _ => Operation::add_record(current.as_ref().clone()),
                };
                self.put_relationship(&current, relationship, data);
                Ok(Some(inverse))
            }

            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                let current = self.require(record)?;
                let (mut members, inverse) = match current.relationship(relationship) {
                    Some(RelationshipData::HasMany(set)) if set.contains(related_record) => return Ok(None),
                    Some(RelationshipData::HasMany(set)) => (
                        set.clone(),
                        Operation::remove_from_has_many(record.clone(), relationship.clone(), related_record.clone()),
                    ),
                    _ => (RecordSet::new(), Operation::add_record(current.as_ref().clone())),
                };
                members.insert(related_record.clone());
                self.put_relationship(&current, relationship, RelationshipData::HasMany(members));
                Ok(Some(inverse))
            }

            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                let current = self.require(record)?;
                let mut members = match current.relationship(relationship) {
                    Some(RelationshipData::HasMany(set)) if set.contains(related_record) => set.clone(),
                    _ => return Ok(None),
                };
                members.remove(related_record);
                self.put_relationship(&current, relationship, RelationshipData::HasMany(members));
                Ok(Some(Operation::add_to_has_many(
                    record.clone(),
                    relationship.clone(),
                    related_record.clone(),
                )))
            }
        }
    }

    fn require(&self, identity: &RecordIdentity) -> Result<Arc<Record>> {
        self.record(identity)
            .cloned()
            .ok_or_else(|| Error::record_not_found(identity))
    }

    fn put_relationship(&mut self, current: &Record, relationship: &str, data: RelationshipData) {
        let mut next = current.clone();
        next.relationships.insert(relationship.to_string(), data);
        self.put(next);
    }

    fn put(&mut self, record: Record) {
        let record = Arc::new(record);
        let previous = self
            .records
            .entry(record.model.clone())
            .or_default()
            .insert(record.id.clone(), Arc::clone(&record));
        if let Some(previous) = previous {
            self.index.remove(&previous);
        }
        self.index.insert(&record);
    }

    fn take(&mut self, identity: &RecordIdentity) -> Option<Arc<Record>> {
        let removed = self.records.get_mut(&identity.model)?.remove(&identity.id)?;
        self.index.remove(&removed);
        Some(removed)
    }
}

/// Undo for a whole-record write
fn restore(prior: Option<Arc<Record>>, identity: RecordIdentity) -> Operation {
    match prior {
        Some(prior) => Operation::add_record(prior.as_ref().clone()),
        None => Operation::remove_record(identity),
    }
}
