//! RelQL parser using nom
//!
//! Parsing happens in two passes: nom turns the text into a generic call tree,
//! then each call is checked against the arity and argument shapes of the
//! expression it names.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, none_of},
    combinator::{map, not, opt, peek, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::ast::*;
use crate::error::ParseError;

/// Parse a complete query expression
pub fn parse_expression(input: &str) -> Result<QueryExpression, ParseError> {
    let input = input.trim();
    let (remaining, node) = node(input)?;

    let remaining = remaining.trim().trim_end_matches(';').trim();
    if !remaining.is_empty() {
        return Err(ParseError::new(format!(
            "Unexpected trailing content: {}",
            remaining
        ))
        .with_position(input.len() - remaining.len()));
    }

    build(node)
}

// ============================================================================
// Call tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Call { name: String, args: Vec<Arg> },
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Positional { node: Node, order: Option<SortOrder> },
    Named { name: String, value: Literal },
}

fn node(input: &str) -> IResult<&str, Node> {
    let (input, _) = multispace0(input)?;
    alt((call, map(literal, Node::Literal)))(input)
}

fn call(input: &str) -> IResult<&str, Node> {
    let (input, name) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, args) = delimited(
        tuple((char('('), multispace0)),
        separated_list0(tuple((multispace0, char(','), multispace0)), arg),
        tuple((multispace0, char(')'))),
    )(input)?;

    Ok((input, Node::Call {
        name: name.to_string(),
        args,
    }))
}

fn arg(input: &str) -> IResult<&str, Arg> {
    alt((named_arg, positional_arg))(input)
}

fn named_arg(input: &str) -> IResult<&str, Arg> {
    let (input, name) = identifier(input)?;
    let (input, _) = tuple((multispace0, char('='), multispace0))(input)?;
    let (input, value) = literal(input)?;
    Ok((input, Arg::Named {
        name: name.to_string(),
        value,
    }))
}

fn positional_arg(input: &str) -> IResult<&str, Arg> {
    let (input, node) = node(input)?;
    let (input, order) = opt(preceded(multispace1, sort_order))(input)?;
    Ok((input, Arg::Positional { node, order }))
}

fn sort_order(input: &str) -> IResult<&str, SortOrder> {
    let (input, order) = alt((
        value(SortOrder::Descending, tag_no_case("descending")),
        value(SortOrder::Ascending, tag_no_case("ascending")),
        value(SortOrder::Descending, tag_no_case("desc")),
        value(SortOrder::Ascending, tag_no_case("asc")),
    ))(input)?;
    let (input, _) = not(peek(take_while1(is_identifier_char)))(input)?;
    Ok((input, order))
}

// ============================================================================
// Semantic pass
// ============================================================================

fn build(node: Node) -> Result<QueryExpression, ParseError> {
    let (name, args) = match node {
        Node::Literal(value) => return Ok(QueryExpression::Literal { value }),
        Node::Call { name, args } => (name, args),
    };

    let normalized = name.to_ascii_lowercase().replace('_', "");
    let mut call = CallArgs::new(&name, args);

    let expr = match normalized.as_str() {
        "and" => QueryExpression::And {
            operands: call.rest_expressions()?,
        },
        "or" => QueryExpression::Or {
            operands: call.rest_expressions()?,
        },
        "equal" | "eq" => QueryExpression::Equal {
            operands: call.rest_expressions()?,
        },
        "filter" => QueryExpression::Filter {
            select: Box::new(call.expression()?),
            predicate: Box::new(call.expression()?),
        },
        "sort" => {
            let select = Box::new(call.expression()?);
            let by = call.sort_specifiers()?;
            if by.is_empty() {
                return Err(ParseError::new("sort requires at least one sort expression"));
            }
            QueryExpression::Sort { select, by }
        }
        "page" => {
            let select = Box::new(call.expression()?);
            let options = call.page_options()?;
            QueryExpression::Page { select, options }
        }
        "record" => QueryExpression::Record {
            record: RecordRef::new(call.string()?, call.string()?),
        },
        "records" => QueryExpression::Records {
            model: call.string()?,
        },
        "relatedrecords" => QueryExpression::RelatedRecords {
            record: RecordRef::new(call.string()?, call.string()?),
            relationship: call.string()?,
        },
        "relatedrecord" => QueryExpression::RelatedRecord {
            record: RecordRef::new(call.string()?, call.string()?),
            relationship: call.string()?,
        },
        "attribute" | "attr" => QueryExpression::Attribute {
            name: call.string()?,
        },
        _ => return Err(ParseError::new(format!("Unknown query expression '{}'", name))),
    };

    call.finish()?;
    Ok(expr)
}

/// Cursor over the arguments of one call
struct CallArgs<'a> {
    name: &'a str,
    positional: std::vec::IntoIter<(Node, Option<SortOrder>)>,
    named: Vec<(String, Literal)>,
}

impl<'a> CallArgs<'a> {
    fn new(name: &'a str, args: Vec<Arg>) -> Self {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        for arg in args {
            match arg {
                Arg::Positional { node, order } => positional.push((node, order)),
                Arg::Named { name, value } => named.push((name, value)),
            }
        }
        Self {
            name,
            positional: positional.into_iter(),
            named,
        }
    }

    fn next_positional(&mut self) -> Result<(Node, Option<SortOrder>), ParseError> {
        self.positional
            .next()
            .ok_or_else(|| ParseError::new(format!("{} is missing an argument", self.name)))
    }

    fn expression(&mut self) -> Result<QueryExpression, ParseError> {
        let (node, order) = self.next_positional()?;
        if order.is_some() {
            return Err(ParseError::new(format!(
                "sort direction is only allowed in sort expressions, not in {}",
                self.name
            )));
        }
        build(node)
    }

    fn rest_expressions(&mut self) -> Result<Vec<QueryExpression>, ParseError> {
        let mut operands = Vec::new();
        while self.positional.len() > 0 {
            operands.push(self.expression()?);
        }
        Ok(operands)
    }

    fn sort_specifiers(&mut self) -> Result<Vec<SortSpecifier>, ParseError> {
        let mut by = Vec::new();
        for (node, order) in self.positional.by_ref() {
            by.push(SortSpecifier {
                field: build(node)?,
                order: order.unwrap_or_default(),
            });
        }
        Ok(by)
    }

    fn string(&mut self) -> Result<String, ParseError> {
        match self.next_positional()? {
            (Node::Literal(Literal::String(s)), None) => Ok(s),
            _ => Err(ParseError::new(format!(
                "{} expects string arguments",
                self.name
            ))),
        }
    }

    fn page_options(&mut self) -> Result<PageOptions, ParseError> {
        let mut options = PageOptions::default();
        for (key, value) in self.named.drain(..) {
            let number = match value {
                Literal::Int(i) if i >= 0 => i as usize,
                other => {
                    return Err(ParseError::new(format!(
                        "page {} must be a non-negative integer, got {:?}",
                        key, other
                    )))
                }
            };
            match key.as_str() {
                "offset" => options.offset = number,
                "limit" => options.limit = Some(number),
                _ => return Err(ParseError::new(format!("Unknown page option '{}'", key))),
            }
        }
        Ok(options)
    }

    fn finish(mut self) -> Result<(), ParseError> {
        if self.positional.next().is_some() {
            return Err(ParseError::new(format!("Too many arguments to {}", self.name)));
        }
        if let Some((key, _)) = self.named.first() {
            return Err(ParseError::new(format!(
                "Unexpected named argument '{}' in {}",
                key, self.name
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Primitives
// ============================================================================

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(is_identifier_char)(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Null, keyword("null")),
        value(Literal::Bool(true), keyword("true")),
        value(Literal::Bool(false), keyword("false")),
        map(float_literal, Literal::Float),
        map(integer_literal, Literal::Int),
        map(string_literal, Literal::String),
        map(array_literal, Literal::Array),
        // Bare words read as strings: records(planet)
        map(identifier, |s: &str| Literal::String(s.to_string())),
    ))(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input| {
        let (input, matched) = tag_no_case(word)(input)?;
        let (input, _) = not(peek(take_while1(is_identifier_char)))(input)?;
        Ok((input, matched))
    }
}

fn integer_literal(input: &str) -> IResult<&str, i64> {
    let (rest, digits) = recognize(pair(opt(char('-')), digit1))(input)?;
    match digits.parse::<i64>() {
        Ok(value) => Ok((rest, value)),
        // Out of range: fail outright so the digits are not read as a bare word
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

fn float_literal(input: &str) -> IResult<&str, f64> {
    let (input, neg) = opt(char('-'))(input)?;
    let (input, int_part) = digit1(input)?;
    let (input, _) = char('.')(input)?;
    let (input, frac_part) = digit1(input)?;
    let val: f64 = format!("{}.{}", int_part, frac_part).parse().unwrap_or(0.0);
    Ok((input, if neg.is_some() { -val } else { val }))
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('\''),
            map(
                many0(alt((
                    map(tag("''"), |_| "'".to_string()),
                    map(none_of("'"), |c| c.to_string()),
                ))),
                |v| v.join(""),
            ),
            char('\''),
        ),
        delimited(
            char('"'),
            map(
                many0(alt((
                    map(tag("\\\""), |_| "\"".to_string()),
                    map(tag("\\n"), |_| "\n".to_string()),
                    map(tag("\\t"), |_| "\t".to_string()),
                    map(tag("\\\\"), |_| "\\".to_string()),
                    map(none_of("\"\\"), |c| c.to_string()),
                ))),
                |v| v.join(""),
            ),
            char('"'),
        ),
    ))(input)
}

fn array_literal(input: &str) -> IResult<&str, Vec<Literal>> {
    delimited(
        tuple((char('['), multispace0)),
        separated_list0(tuple((multispace0, char(','), multispace0)), literal),
        tuple((multispace0, char(']'))),
    )(input)
}
