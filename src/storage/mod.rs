//! Storage layer for relstore
//!
//! Holds the in-memory record graph and the pipeline that edits it.

pub mod cache;
mod index;
pub mod record;

pub use cache::{Cache, CacheEntry, ListenerId, PatchResult, RecordMap};
pub use record::{Record, RecordIdentity, RecordSet, RelationshipData, Value};
