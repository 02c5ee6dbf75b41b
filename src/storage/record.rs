//! Record representation
//!
//! A Record is a typed, identified node of the graph: attributes hold plain
//! values, relationships hold references (identities) to other records.
//! Records are replace-only values; the cache swaps whole entries so older
//! versions can be shared by forks.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Lightweight reference to a record, resolved by lookup in the cache
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    #[serde(rename = "type")]
    pub model: String,
    pub id: String,
}

impl RecordIdentity {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

impl From<&relql::RecordRef> for RecordIdentity {
    fn from(r: &relql::RecordRef) -> Self {
        RecordIdentity::new(&r.model, &r.id)
    }
}

/// Attribute values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&relql::Literal> for Value {
    fn from(lit: &relql::Literal) -> Self {
        match lit {
            relql::Literal::Null => Value::Null,
            relql::Literal::Bool(b) => Value::Bool(*b),
            relql::Literal::Int(i) => Value::Int(*i),
            relql::Literal::Float(f) => Value::Float(*f),
            relql::Literal::String(s) => Value::String(s.clone()),
            relql::Literal::Array(arr) => Value::Array(arr.iter().map(Value::from).collect()),
        }
    }
}

/// Membership set of record identities.
///
/// Iteration follows insertion order; equality ignores it.
#[derive(Debug, Clone, Default)]
pub struct RecordSet(Vec<RecordIdentity>);

impl RecordSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.0.contains(identity)
    }

    /// Returns false if the identity was already a member
    pub fn insert(&mut self, identity: RecordIdentity) -> bool {
        if self.contains(&identity) {
            return false;
        }
        self.0.push(identity);
        true
    }

    /// Returns false if the identity was not a member
    pub fn remove(&mut self, identity: &RecordIdentity) -> bool {
        match self.0.iter().position(|member| member == identity) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordIdentity> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Members of `self` missing from `other`, in `self`'s order
    pub fn difference<'a>(&'a self, other: &'a RecordSet) -> impl Iterator<Item = &'a RecordIdentity> {
        self.0.iter().filter(move |member| !other.contains(member))
    }
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().all(|member| other.contains(member))
    }
}

impl FromIterator<RecordIdentity> for RecordSet {
    fn from_iter<I: IntoIterator<Item = RecordIdentity>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for identity in iter {
            set.insert(identity);
        }
        set
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a RecordIdentity;
    type IntoIter = std::slice::Iter<'a, RecordIdentity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for RecordSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let members = Vec::<RecordIdentity>::deserialize(deserializer)?;
        Ok(members.into_iter().collect())
    }
}

/// Data of one relationship. Serialized as `{ "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Linkage", into = "Linkage")]
pub enum RelationshipData {
    HasOne(Option<RecordIdentity>),
    HasMany(RecordSet),
}

#[derive(Serialize, Deserialize)]
struct Linkage {
    data: LinkageData,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LinkageData {
    Many(RecordSet),
    One(Option<RecordIdentity>),
}

impl From<Linkage> for RelationshipData {
    fn from(linkage: Linkage) -> Self {
        match linkage.data {
            LinkageData::Many(set) => RelationshipData::HasMany(set),
            LinkageData::One(one) => RelationshipData::HasOne(one),
        }
    }
}

impl From<RelationshipData> for Linkage {
    fn from(data: RelationshipData) -> Self {
        let data = match data {
            RelationshipData::HasOne(one) => LinkageData::One(one),
            RelationshipData::HasMany(set) => LinkageData::Many(set),
        };
        Linkage { data }
    }
}

impl RelationshipData {
    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        match self {
            RelationshipData::HasOne(one) => one.as_ref() == Some(identity),
            RelationshipData::HasMany(set) => set.contains(identity),
        }
    }

    /// Every referenced identity
    pub fn members(&self) -> Vec<&RecordIdentity> {
        match self {
            RelationshipData::HasOne(one) => one.iter().collect(),
            RelationshipData::HasMany(set) => set.iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RelationshipData::HasOne(one) => one.is_none(),
            RelationshipData::HasMany(set) => set.is_empty(),
        }
    }
}

/// A record in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub model: String,

    pub id: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipData>,
}

impl Record {
    /// Create a new record with no attributes or relationships
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(&self.model, &self.id)
    }

    pub fn is(&self, identity: &RecordIdentity) -> bool {
        self.model == identity.model && self.id == identity.id
    }

    /// Get an attribute value
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set an attribute value
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_has_one(mut self, name: impl Into<String>, related: Option<RecordIdentity>) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::HasOne(related));
        self
    }

    pub fn with_has_many(
        mut self,
        name: impl Into<String>,
        related: impl IntoIterator<Item = RecordIdentity>,
    ) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::HasMany(related.into_iter().collect()));
        self
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipData> {
        self.relationships.get(name)
    }

    /// Identities referenced through a relationship; empty when unset
    pub fn related(&self, name: &str) -> Vec<&RecordIdentity> {
        self.relationships
            .get(name)
            .map(RelationshipData::members)
            .unwrap_or_default()
    }

    /// Does the relationship reference `identity`?
    pub fn references(&self, name: &str, identity: &RecordIdentity) -> bool {
        self.relationships
            .get(name)
            .map(|data| data.contains(identity))
            .unwrap_or(false)
    }

    /// Overlay `update` on this record: keys present on `update` win, absent
    /// keys keep their current value.
    pub fn merged_with(&self, update: &Record) -> Record {
        let mut merged = self.clone();
        for (name, value) in &update.attributes {
            merged.attributes.insert(name.clone(), value.clone());
        }
        for (name, data) in &update.relationships {
            merged.relationships.insert(name.clone(), data.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet(id: &str) -> RecordIdentity {
        RecordIdentity::new("planet", id)
    }

    #[test]
    fn test_record_creation() {
        let record = Record::new("planet", "jupiter")
            .with_attribute("name", "Jupiter")
            .with_attribute("rank", 5i64)
            .with_has_one("next", Some(planet("saturn")));

        assert_eq!(record.identity(), planet("jupiter"));
        assert_eq!(record.attribute("name"), Some(&Value::String("Jupiter".into())));
        assert!(record.references("next", &planet("saturn")));
        assert_eq!(record.related("moons"), Vec::<&RecordIdentity>::new());
    }

    #[test]
    fn test_record_set_membership() {
        let mut set: RecordSet = vec![planet("a"), planet("b"), planet("a")].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(!set.insert(planet("b")));
        assert!(set.remove(&planet("a")));
        assert!(!set.remove(&planet("a")));

        let reordered: RecordSet = vec![planet("c"), planet("b")].into_iter().collect();
        set.insert(planet("c"));
        assert_eq!(set, reordered);
    }

    #[test]
    fn test_record_set_difference_keeps_order() {
        let prior: RecordSet = vec![planet("a"), planet("b"), planet("c")].into_iter().collect();
        let next: RecordSet = vec![planet("b")].into_iter().collect();
        let removed: Vec<_> = prior.difference(&next).cloned().collect();
        assert_eq!(removed, vec![planet("a"), planet("c")]);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::json!({
            "type": "planet",
            "id": "saturn",
            "attributes": { "name": "Saturn", "rings": true },
            "relationships": {
                "moons": { "data": [{ "type": "moon", "id": "titan" }] },
                "next": { "data": null }
            }
        });
        let record: Record = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(
            record.relationship("moons"),
            Some(&RelationshipData::HasMany(
                vec![RecordIdentity::new("moon", "titan")].into_iter().collect()
            ))
        );
        assert_eq!(record.relationship("next"), Some(&RelationshipData::HasOne(None)));
        assert_eq!(serde_json::to_value(&record).unwrap(), json);
    }

    #[test]
    fn test_merge_keeps_absent_keys() {
        let current = Record::new("planet", "earth")
            .with_attribute("name", "Earth")
            .with_attribute("classification", "terrestrial")
            .with_has_one("next", Some(planet("mars")));
        let update = Record::new("planet", "earth").with_attribute("name", "Terra");

        let merged = current.merged_with(&update);
        assert_eq!(merged.attribute("name").and_then(Value::as_str), Some("Terra"));
        assert_eq!(
            merged.attribute("classification").and_then(Value::as_str),
            Some("terrestrial")
        );
        assert!(merged.references("next", &planet("mars")));
    }
}
