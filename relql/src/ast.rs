//! Abstract Syntax Tree for query expressions

use serde::{Deserialize, Serialize};

/// A query expression, evaluated recursively against the record cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum QueryExpression {
    /// True if every operand is truthy
    And { operands: Vec<QueryExpression> },
    /// True if any operand is truthy
    Or { operands: Vec<QueryExpression> },
    /// True if every operand evaluates to the same value as the first
    Equal { operands: Vec<QueryExpression> },
    /// Keep the entries of `select` for which `predicate` holds
    Filter {
        select: Box<QueryExpression>,
        predicate: Box<QueryExpression>,
    },
    /// Order the entries of `select`, producing a sequence
    Sort {
        select: Box<QueryExpression>,
        by: Vec<SortSpecifier>,
    },
    /// Slice a sorted sequence
    Page {
        select: Box<QueryExpression>,
        options: PageOptions,
    },
    /// A single record by identity
    Record { record: RecordRef },
    /// Every record of a type
    Records {
        #[serde(rename = "type")]
        model: String,
    },
    /// Members of a hasMany relationship
    RelatedRecords {
        record: RecordRef,
        relationship: String,
    },
    /// Target of a hasOne relationship
    RelatedRecord {
        record: RecordRef,
        relationship: String,
    },
    /// An attribute of the record at the current base path
    Attribute { name: String },
    /// Literal value
    Literal { value: Literal },
}

/// Identity of a record referenced from a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    #[serde(rename = "type")]
    pub model: String,
    pub id: String,
}

impl RecordRef {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpecifier {
    pub field: QueryExpression,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageOptions {
    #[serde(default)]
    pub offset: usize,
    /// None = to the end
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Literal>),
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

// ============================================================================
// Builders
// ============================================================================

impl QueryExpression {
    pub fn records(model: impl Into<String>) -> Self {
        Self::Records { model: model.into() }
    }

    pub fn record(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Record {
            record: RecordRef::new(model, id),
        }
    }

    pub fn related_records(record: RecordRef, relationship: impl Into<String>) -> Self {
        Self::RelatedRecords {
            record,
            relationship: relationship.into(),
        }
    }

    pub fn related_record(record: RecordRef, relationship: impl Into<String>) -> Self {
        Self::RelatedRecord {
            record,
            relationship: relationship.into(),
        }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute { name: name.into() }
    }

    pub fn literal(value: impl Into<Literal>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn and(operands: Vec<QueryExpression>) -> Self {
        Self::And { operands }
    }

    pub fn or(operands: Vec<QueryExpression>) -> Self {
        Self::Or { operands }
    }

    pub fn equal(operands: Vec<QueryExpression>) -> Self {
        Self::Equal { operands }
    }

    /// Shorthand for `equal(attribute(name), literal(value))`
    pub fn attribute_eq(name: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::equal(vec![Self::attribute(name), Self::literal(value)])
    }

    pub fn filter(self, predicate: QueryExpression) -> Self {
        Self::Filter {
            select: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    pub fn sort(self, by: Vec<SortSpecifier>) -> Self {
        Self::Sort {
            select: Box::new(self),
            by,
        }
    }

    /// Sort ascending by a single attribute
    pub fn sort_by_attribute(self, name: impl Into<String>, order: SortOrder) -> Self {
        self.sort(vec![SortSpecifier {
            field: Self::attribute(name),
            order,
        }])
    }

    pub fn page(self, offset: usize, limit: Option<usize>) -> Self {
        Self::Page {
            select: Box::new(self),
            options: PageOptions { offset, limit },
        }
    }
}
