//! Relationship declarations in declaration order

use super::RelationshipDef;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Named relationship declarations of one model.
///
/// Serialized as a map; iteration follows the order the document declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationships(Vec<(String, RelationshipDef)>);

impl Relationships {
    pub fn get(&self, name: &str) -> Option<&RelationshipDef> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, def)| def)
    }

    /// Insert or replace; a replaced declaration keeps its position
    pub fn insert(&mut self, name: String, def: RelationshipDef) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = def,
            None => self.0.push((name, def)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RelationshipDef)> {
        self.0.iter().map(|(name, def)| (name, def))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Relationships {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, def) in &self.0 {
            map.serialize_entry(name, def)?;
        }
        map.end()
    }
}

struct RelationshipsVisitor;

impl<'de> Visitor<'de> for RelationshipsVisitor {
    type Value = Relationships;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of relationship declarations")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut relationships = Relationships::default();
        while let Some((name, def)) = access.next_entry::<String, RelationshipDef>()? {
            relationships.insert(name, def);
        }
        Ok(relationships)
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(Relationships::default())
    }
}

impl<'de> Deserialize<'de> for Relationships {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RelationshipsVisitor)
    }
}
