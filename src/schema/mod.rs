//! Schema definitions for relstore
//!
//! A schema declares, per model (record type):
//! - attributes, optionally typed
//! - relationships: `hasOne`/`hasMany`, target model, named inverse,
//!   `dependent: remove` cascade, `actsAsSet`
//!
//! The store only reads the schema. Relationship declaration order is kept,
//! since record-level diffs are emitted in that order.
//!
//! ```yaml
//! models:
//!   planet:
//!     attributes:
//!       name: { type: string }
//!     relationships:
//!       moons: { type: hasMany, model: moon, inverse: planet, dependent: remove }
//!   moon:
//!     relationships:
//!       planet: { type: hasOne, model: planet, inverse: moons }
//! ```

mod relationships;

pub use relationships::Relationships;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Cardinality of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    HasOne,
    HasMany,
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationshipKind::HasOne => write!(f, "hasOne"),
            RelationshipKind::HasMany => write!(f, "hasMany"),
        }
    }
}

/// Cascade behaviour when a related record is unlinked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependent {
    /// Remove records unlinked from this relationship
    Remove,
}

/// Declaration of one relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    /// Target model
    pub model: String,
    /// Name of the inverse relationship on the target model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<Dependent>,
    /// hasMany only. Every collection already has membership semantics; the
    /// flag is carried so schemas round-trip unchanged.
    #[serde(default, rename = "actsAsSet", skip_serializing_if = "std::ops::Not::not")]
    pub acts_as_set: bool,
}

impl RelationshipDef {
    pub fn has_one(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasOne,
            model: model.into(),
            inverse: None,
            dependent: None,
            acts_as_set: false,
        }
    }

    pub fn has_many(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            ..Self::has_one(model)
        }
    }

    pub fn inverse(mut self, name: impl Into<String>) -> Self {
        self.inverse = Some(name.into());
        self
    }

    pub fn dependent_remove(mut self) -> Self {
        self.dependent = Some(Dependent::Remove);
        self
    }

    pub fn acts_as_set(mut self) -> Self {
        self.acts_as_set = true;
        self
    }

    pub fn is_dependent(&self) -> bool {
        self.dependent == Some(Dependent::Remove)
    }
}

/// Attribute value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    Array,
    Object,
}

/// Declaration of one attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<AttributeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declaration of one model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDef>,
    #[serde(default)]
    pub relationships: Relationships,
}

impl ModelDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an untyped attribute
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), AttributeDef::default());
        self
    }

    /// Add a relationship; declaration order is kept
    pub fn relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }
}

/// Schema errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Model '{model}' is not declared in the schema")]
    UnknownModel { model: String },

    #[error("Relationship '{relationship}' is not declared on model '{model}'")]
    UnknownRelationship { model: String, relationship: String },

    #[error("Relationship '{relationship}' on model '{model}' is {actual}, not {expected}")]
    RelationshipKindMismatch {
        model: String,
        relationship: String,
        expected: RelationshipKind,
        actual: RelationshipKind,
    },

    #[error("Relationship '{relationship}' on model '{model}' targets '{expected}', got a '{actual}' record")]
    RelatedModelMismatch {
        model: String,
        relationship: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid inverse for '{model}.{relationship}': {message}")]
    InvalidInverse {
        model: String,
        relationship: String,
        message: String,
    },
}

/// The full schema: every model the store accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub models: BTreeMap<String, ModelDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model definition
    pub fn model(mut self, name: impl Into<String>, def: ModelDef) -> Self {
        self.models.insert(name.into(), def);
        self
    }

    /// Parse a schema from YAML (JSON is valid YAML too)
    pub fn from_yaml_str(content: &str) -> crate::Result<Self> {
        let schema: Schema = serde_yaml::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema document from disk
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let schema = Self::from_yaml_str(&content)?;
        tracing::debug!("Loaded schema with {} model(s) from {:?}", schema.models.len(), path);
        Ok(schema)
    }

    /// Check that every declared inverse exists on its target model, targets
    /// the declaring model, and names the relationship back.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (model_name, model) in &self.models {
            for (name, def) in model.relationships.iter() {
                let invalid = |message: String| SchemaError::InvalidInverse {
                    model: model_name.clone(),
                    relationship: name.clone(),
                    message,
                };

                let target = self
                    .models
                    .get(&def.model)
                    .ok_or_else(|| invalid(format!("target model '{}' is not declared", def.model)))?;

                let Some(inverse_name) = &def.inverse else {
                    continue;
                };

                let inverse = target.relationships.get(inverse_name).ok_or_else(|| {
                    invalid(format!("'{}.{}' is not declared", def.model, inverse_name))
                })?;

                if inverse.model != *model_name {
                    return Err(invalid(format!(
                        "'{}.{}' targets '{}'",
                        def.model, inverse_name, inverse.model
                    )));
                }
                if inverse.inverse.as_deref() != Some(name.as_str()) {
                    return Err(invalid(format!(
                        "'{}.{}' does not name '{}' as its inverse",
                        def.model, inverse_name, name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Get a model definition
    pub fn get_model(&self, model: &str) -> Result<&ModelDef, SchemaError> {
        self.models.get(model).ok_or_else(|| SchemaError::UnknownModel {
            model: model.to_string(),
        })
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Get a relationship definition
    pub fn relationship(&self, model: &str, relationship: &str) -> Result<&RelationshipDef, SchemaError> {
        self.get_model(model)?
            .relationships
            .get(relationship)
            .ok_or_else(|| SchemaError::UnknownRelationship {
                model: model.to_string(),
                relationship: relationship.to_string(),
            })
    }

    /// The inverse of `model.relationship`, as (name, definition) on the target model
    pub fn inverse(&self, model: &str, relationship: &str) -> Result<Option<(&str, &RelationshipDef)>, SchemaError> {
        let def = self.relationship(model, relationship)?;
        match &def.inverse {
            Some(inverse) => {
                let inverse_def = self.relationship(&def.model, inverse)?;
                Ok(Some((inverse.as_str(), inverse_def)))
            }
            None => Ok(None),
        }
    }

    /// List all model names
    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
