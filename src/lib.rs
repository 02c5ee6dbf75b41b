//! relstore - Schema-aware in-memory record store
//!
//! A graph of typed, identified records kept consistent under a stream of
//! fine-grained operations, with git-like history (fork, merge, rollback)
//! over an append-only log of transforms.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         relstore Store                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────────┐  ┌─────────────────────┐  │
//! │  │   RelQL     │  │  Transform Log  │  │  Schema (read-only) │  │
//! │  │   Parser    │  │  sync / fork /  │  │  models, inverses,  │  │
//! │  │             │  │  merge/rollback │  │  dependent: remove  │  │
//! │  └──────┬──────┘  └────────┬────────┘  └──────────┬──────────┘  │
//! │         │                  │                      │             │
//! │         ▼                  ▼                      ▼             │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                         Cache                               ││
//! │  │  patch: validate → before → apply → after → finally         ││
//! │  │  ┌──────────────────────┐  ┌─────────────────────────────┐  ││
//! │  │  │  Schema Consistency  │  │  Cache Integrity            │  ││
//! │  │  │  (inverse symmetry)  │  │  (dangling refs, cascades)  │  ││
//! │  │  └──────────────────────┘  └─────────────────────────────┘  ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             │                                   │
//! │                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │   type → id → Arc<Record>    + reverse reference index      ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use relstore::{Operation, Record, RecordIdentity, Schema, Store, Transform};
//! use std::sync::Arc;
//!
//! let schema = Schema::from_yaml_str(r#"
//! models:
//!   planet:
//!     relationships:
//!       moons: { type: hasMany, model: moon, inverse: planet }
//!   moon:
//!     relationships:
//!       planet: { type: hasOne, model: planet, inverse: moons }
//! "#).unwrap();
//!
//! let mut store = Store::new(Arc::new(schema));
//! store.sync(Transform::new(vec![
//!     Operation::add_record(Record::new("planet", "saturn")),
//!     Operation::add_record(
//!         Record::new("moon", "titan")
//!             .with_has_one("planet", Some(RecordIdentity::new("planet", "saturn"))),
//!     ),
//! ])).unwrap();
//!
//! let moons = store.query_str("relatedRecords('planet', 'saturn', 'moons')").unwrap();
//! assert_eq!(moons.ids(), vec!["titan"]);
//! ```

pub mod error;
pub mod processors;
pub mod query;
pub mod schema;
pub mod storage;
pub mod transform;

pub use error::{Error, Result};

pub use processors::{CacheIntegrityProcessor, OperationProcessor, SchemaConsistencyProcessor};
pub use query::{QueryContext, QueryResult};
pub use relql::{self, QueryExpression};
pub use schema::{ModelDef, RelationshipDef, RelationshipKind, Schema, SchemaError};
pub use storage::{Cache, CacheEntry, ListenerId, PatchResult, Record, RecordIdentity, RecordSet, RelationshipData, Value};
pub use transform::{Operation, Transform, TransformId, TransformLog};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// External id mapping service (external key <-> internal id).
///
/// The store only carries it so forks share the same instance.
pub trait KeyMap {
    fn key_to_id(&self, model: &str, key: &str, value: &str) -> Option<String>;

    fn id_to_key(&self, model: &str, key: &str, id: &str) -> Option<String>;
}

/// A transform kept for history, with the operations undoing it
#[derive(Clone)]
struct TrackedTransform {
    transform: Arc<Transform>,
    inverse: Vec<Operation>,
}

/// The main store handle: a cache plus the log of transforms applied to it
pub struct Store {
    schema: Arc<Schema>,
    key_map: Option<Arc<dyn KeyMap>>,
    cache: Cache,
    log: TransformLog,
    transforms: BTreeMap<TransformId, TrackedTransform>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("cache", &self.cache)
            .field("log", &self.log)
            .field("key_map", &self.key_map.is_some())
            .finish()
    }
}

impl Store {
    /// Create an empty store over a schema
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            cache: Cache::new(Arc::clone(&schema)),
            schema,
            key_map: None,
            log: TransformLog::new(),
            transforms: BTreeMap::new(),
        }
    }

    /// Attach a key mapping service, shared with every fork
    pub fn with_key_map(mut self, key_map: Arc<dyn KeyMap>) -> Self {
        self.key_map = Some(key_map);
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn key_map(&self) -> Option<&Arc<dyn KeyMap>> {
        self.key_map.as_ref()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Direct cache access, e.g. for seeding with `reset`. Edits made here
    /// are not tracked by the transform log.
    pub fn cache_mut(&mut self) -> &mut Cache {
        &mut self.cache
    }

    pub fn log(&self) -> &TransformLog {
        &self.log
    }

    /// Register a patch listener on the cache
    pub fn on_patch<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Operation) + 'static,
    {
        self.cache.on_patch(listener)
    }

    pub fn off_patch(&mut self, id: ListenerId) -> bool {
        self.cache.off_patch(id)
    }

    /// Apply a transform and track it.
    ///
    /// A duplicate id fails before anything is applied. When an operation
    /// fails, the operations before it stay applied and the transform stays
    /// in the log, so it can be rolled back.
    pub fn sync(&mut self, transform: impl Into<Arc<Transform>>) -> Result<PatchResult> {
        let transform = transform.into();
        self.log.append(transform.id.clone())?;

        let mut result = PatchResult::default();
        let outcome = transform
            .operations
            .iter()
            .try_for_each(|op| self.cache.patch_into(op.clone(), &mut result));

        self.transforms.insert(
            transform.id.clone(),
            TrackedTransform {
                transform: Arc::clone(&transform),
                inverse: result.inverse.clone(),
            },
        );

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    "Synced transform {}: {} operation(s) applied",
                    transform.id,
                    result.applied.len()
                );
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(
                    "Transform {} failed after {} applied operation(s): {}",
                    transform.id,
                    result.applied.len(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Transforms applied after `id`, in log order
    pub fn transforms_since(&self, id: &TransformId) -> Result<Vec<Arc<Transform>>> {
        Ok(self.tracked(self.log.after(id)?))
    }

    /// Every tracked transform, in log order
    pub fn all_transforms(&self) -> Vec<Arc<Transform>> {
        self.tracked(self.log.entries())
    }

    fn tracked(&self, ids: &[TransformId]) -> Vec<Arc<Transform>> {
        ids.iter()
            .filter_map(|id| self.transforms.get(id))
            .map(|tracked| Arc::clone(&tracked.transform))
            .collect()
    }

    /// Independent copy of this store. Schema and key map are shared; the
    /// graph, log and history are copied. Listeners are not.
    pub fn fork(&self) -> Store {
        tracing::info!("Forking store at {:?}", self.log.head().map(TransformId::as_str));
        Store {
            schema: Arc::clone(&self.schema),
            key_map: self.key_map.clone(),
            cache: self.cache.fork(),
            log: self.log.clone(),
            transforms: self.transforms.clone(),
        }
    }

    /// Sync, in order, every transform of `other` this store has not seen.
    /// Returns the merged ids.
    pub fn merge(&mut self, other: &Store) -> Result<Vec<TransformId>> {
        let mut merged = Vec::new();
        for transform in other.all_transforms() {
            if self.log.contains(&transform.id) {
                continue;
            }
            merged.push(transform.id.clone());
            self.sync(transform)?;
        }
        tracing::info!("Merged {} transform(s)", merged.len());
        Ok(merged)
    }

    /// Undo every transform applied after `id`, most recent first, and drop
    /// them from the log. Returns the undone ids in log order.
    pub fn rollback(&mut self, id: &TransformId) -> Result<Vec<TransformId>> {
        let undone = self.log.after(id)?.to_vec();

        for undone_id in undone.iter().rev() {
            if let Some(tracked) = self.transforms.get(undone_id) {
                self.cache.revert(&tracked.inverse)?;
            }
        }

        self.log.rollback(id)?;
        for undone_id in &undone {
            self.transforms.remove(undone_id);
        }

        tracing::info!("Rolled back {} transform(s) to {}", undone.len(), id);
        Ok(undone)
    }

    /// Forget history before `id`; the graph is untouched
    pub fn truncate_history(&mut self, id: &TransformId) -> Result<()> {
        for dropped in self.log.truncate(id)? {
            self.transforms.remove(&dropped);
        }
        Ok(())
    }

    /// Forget all history; the graph is untouched
    pub fn clear_history(&mut self) {
        self.log.clear();
        self.transforms.clear();
    }

    /// Evaluate a query expression
    pub fn query(&self, expression: &QueryExpression) -> Result<QueryResult> {
        self.cache.query(expression)
    }

    /// Parse and evaluate a query in text form
    pub fn query_str(&self, input: &str) -> Result<QueryResult> {
        self.cache.query_str(input)
    }
}
