//! Ordered log of applied transform ids

use super::TransformId;
use crate::error::{Error, Result};

/// Append-only sequence of transform ids. `head` is the last id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformLog {
    entries: Vec<TransformId>,
}

impl TransformLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing sequence of ids
    pub fn from_entries(entries: impl IntoIterator<Item = TransformId>) -> Result<Self> {
        let mut log = Self::new();
        for id in entries {
            log.append(id)?;
        }
        Ok(log)
    }

    /// Append an id; duplicates are rejected
    pub fn append(&mut self, id: TransformId) -> Result<()> {
        if self.contains(&id) {
            return Err(Error::DuplicateTransform { id: id.to_string() });
        }
        self.entries.push(id);
        Ok(())
    }

    pub fn contains(&self, id: &TransformId) -> bool {
        self.entries.contains(id)
    }

    /// Last id, or `None` when empty
    pub fn head(&self) -> Option<&TransformId> {
        self.entries.last()
    }

    /// Ids strictly before `id`
    pub fn before(&self, id: &TransformId) -> Result<&[TransformId]> {
        let index = self.position(id)?;
        Ok(&self.entries[..index])
    }

    /// Ids strictly after `id`
    pub fn after(&self, id: &TransformId) -> Result<&[TransformId]> {
        let index = self.position(id)?;
        Ok(&self.entries[index + 1..])
    }

    /// Drop every id strictly before `id`; returns the dropped ids
    pub fn truncate(&mut self, id: &TransformId) -> Result<Vec<TransformId>> {
        let index = self.position(id)?;
        Ok(self.entries.drain(..index).collect())
    }

    /// Drop every id strictly after `id`; returns the dropped ids
    pub fn rollback(&mut self, id: &TransformId) -> Result<Vec<TransformId>> {
        let index = self.position(id)?;
        Ok(self.entries.drain(index + 1..).collect())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TransformId] {
        &self.entries
    }

    fn position(&self, id: &TransformId) -> Result<usize> {
        self.entries
            .iter()
            .position(|entry| entry == id)
            .ok_or_else(|| Error::TransformNotFound { id: id.to_string() })
    }
}
