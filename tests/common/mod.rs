//! Shared helpers for the integration and property tests

#![allow(dead_code)]

use relstore::{Cache, Operation, Record, RecordIdentity, Schema, Store, Transform, TransformId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

pub const SOLAR_SYSTEM: &str = r#"
models:
  planet:
    attributes:
      name: { type: string }
      order: { type: number }
    relationships:
      moons: { type: hasMany, model: moon, inverse: planet }
      inhabitants: { type: hasMany, model: inhabitant, inverse: planet, dependent: remove }
      next: { type: hasOne, model: planet, inverse: previous }
      previous: { type: hasOne, model: planet, inverse: next }
  moon:
    attributes:
      name: { type: string }
    relationships:
      planet: { type: hasOne, model: planet, inverse: moons }
  inhabitant:
    attributes:
      name: { type: string }
    relationships:
      planet: { type: hasOne, model: planet, inverse: inhabitants }
"#;

/// Install a test-friendly tracing subscriber once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn schema() -> Arc<Schema> {
    Arc::new(Schema::from_yaml_str(SOLAR_SYSTEM).expect("Failed to parse schema"))
}

pub fn store() -> Store {
    init_tracing();
    Store::new(schema())
}

pub fn planet(id: &str) -> RecordIdentity {
    RecordIdentity::new("planet", id)
}

pub fn moon(id: &str) -> RecordIdentity {
    RecordIdentity::new("moon", id)
}

pub fn inhabitant(id: &str) -> RecordIdentity {
    RecordIdentity::new("inhabitant", id)
}

/// Seed the cache, bypassing the processors
pub fn seed(store: &mut Store, records: Vec<Record>) {
    let mut data: BTreeMap<String, BTreeMap<String, Record>> = BTreeMap::new();
    for record in records {
        data.entry(record.model.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }
    store.cache_mut().reset(data);
}

/// Sync a transform built from `operations`, returning its id
pub fn sync(store: &mut Store, operations: Vec<Operation>) -> TransformId {
    let transform = Transform::new(operations);
    let id = transform.id.clone();
    store
        .sync(transform)
        .unwrap_or_else(|err| panic!("Sync failed: {}", err));
    id
}

/// Record every notified operation
pub fn record_patches(store: &mut Store) -> Rc<RefCell<Vec<Operation>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    store.on_patch(move |op| sink.borrow_mut().push(op.clone()));
    seen
}

/// Graph contents compared by value. Empty type maps are left out and
/// collections compare as sets.
pub fn snapshot(cache: &Cache) -> BTreeMap<String, BTreeMap<String, Record>> {
    let mut snapshot = BTreeMap::new();
    for model in cache.schema().list() {
        let Some(records) = cache.records(model) else {
            continue;
        };
        if records.is_empty() {
            continue;
        }
        let records = records
            .iter()
            .map(|(id, record)| (id.clone(), record.as_ref().clone()))
            .collect();
        snapshot.insert(model.to_string(), records);
    }
    snapshot
}

/// Every reference between existing records is mirrored by the inverse
pub fn assert_symmetric(cache: &Cache) {
    let schema = cache.schema();
    for (model_name, model) in &schema.models {
        let Some(records) = cache.records(model_name) else {
            continue;
        };
        for record in records.values() {
            for (name, def) in model.relationships.iter() {
                let Some(inverse) = &def.inverse else {
                    continue;
                };
                for target in record.related(name) {
                    if let Some(target_record) = cache.record(target) {
                        assert!(
                            target_record.references(inverse, &record.identity()),
                            "{} references {} through '{}', but '{}' does not point back",
                            record.identity(),
                            target,
                            name,
                            inverse
                        );
                    }
                }
            }
        }
    }
}
