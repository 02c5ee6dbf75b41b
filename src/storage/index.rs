//! Reverse reference index
//!
//! For every identity, the set of `(referrer, relationship)` pairs whose
//! relationship data names it. Kept in step with every storage write so that
//! integrity cleanup never scans the whole graph.

use super::record::{Record, RecordIdentity};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    referrers: BTreeMap<RecordIdentity, BTreeSet<(RecordIdentity, String)>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every reference held by `record`
    pub fn insert(&mut self, record: &Record) {
        let referrer = record.identity();
        for (name, data) in &record.relationships {
            for target in data.members() {
                self.referrers
                    .entry(target.clone())
                    .or_default()
                    .insert((referrer.clone(), name.clone()));
            }
        }
    }

    /// Forget every reference held by `record`
    pub fn remove(&mut self, record: &Record) {
        let referrer = record.identity();
        for (name, data) in &record.relationships {
            for target in data.members() {
                if let Some(set) = self.referrers.get_mut(target) {
                    set.remove(&(referrer.clone(), name.clone()));
                    if set.is_empty() {
                        self.referrers.remove(target);
                    }
                }
            }
        }
    }

    /// Records (and the relationship) referencing `target`, in identity order
    pub fn referrers(&self, target: &RecordIdentity) -> Vec<(RecordIdentity, String)> {
        self.referrers
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Is `target` referenced by any `model` record through `relationship`?
    pub fn is_referenced_by(&self, target: &RecordIdentity, model: &str, relationship: &str) -> bool {
        self.referrers
            .get(target)
            .map(|set| {
                set.iter()
                    .any(|(referrer, name)| referrer.model == model && name == relationship)
            })
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.referrers.clear();
    }
}
