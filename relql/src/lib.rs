//! RelQL - Relational Query Language
//!
//! Query expressions for the relstore record graph, as a serde-friendly AST
//! plus a compact function-call text form.
//!
//! # Syntax Overview
//!
//! ```text
//! -- Every planet
//! records('planet')
//!
//! -- A single record
//! record('planet', 'jupiter')
//!
//! -- Filter on an attribute
//! filter(records('planet'), equal(attribute('name'), 'Jupiter'))
//!
//! -- Sort, then paginate (page must wrap a sort)
//! page(sort(records('planet'), attribute('name') desc), offset = 1, limit = 2)
//!
//! -- Relationships
//! relatedRecords('planet', 'saturn', 'moons')
//! relatedRecord('moon', 'titan', 'planet')
//! ```
//!
//! Bare words are read as strings, so `records(planet)` is the same as
//! `records('planet')`. Expression names are case-insensitive and accept
//! snake_case (`related_records`).

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::ParseError;

/// Parse a query expression from its text form
pub fn parse(input: &str) -> Result<QueryExpression, ParseError> {
    parser::parse_expression(input)
}
