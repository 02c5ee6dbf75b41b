//! Query expression interpreter

use super::compare::{compare_values, results_equal};
use super::{QueryContext, QueryResult};
use crate::error::{Error, Result};
use crate::storage::{Cache, CacheEntry, Record, RecordIdentity, Value};
use relql::{PageOptions, QueryExpression, RecordRef, SortOrder, SortSpecifier};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluate an expression against the cache
pub fn evaluate(cache: &Cache, expression: &QueryExpression, context: &mut QueryContext) -> Result<QueryResult> {
    match expression {
        QueryExpression::And { operands } => {
            let mut all = true;
            for operand in operands {
                all &= evaluate(cache, operand, context)?.is_truthy();
            }
            Ok(QueryResult::Value(Value::Bool(all)))
        }

        QueryExpression::Or { operands } => {
            let mut any = false;
            for operand in operands {
                any |= evaluate(cache, operand, context)?.is_truthy();
            }
            Ok(QueryResult::Value(Value::Bool(any)))
        }

        QueryExpression::Equal { operands } => {
            let mut results = Vec::with_capacity(operands.len());
            for operand in operands {
                results.push(evaluate(cache, operand, context)?);
            }
            let equal = match results.split_first() {
                Some((first, rest)) => rest.iter().all(|result| results_equal(first, result)),
                None => true,
            };
            Ok(QueryResult::Value(Value::Bool(equal)))
        }

        QueryExpression::Filter { select, predicate } => {
            let selected = evaluate(cache, select, context)?;
            let ordered = matches!(selected, QueryResult::Sequence(_));

            let mut kept = Vec::new();
            for (mut entry_context, record) in entries(selected, context, "filter")? {
                if evaluate(cache, predicate, &mut entry_context)?.is_truthy() {
                    kept.push(record);
                }
            }
            // Sorted input stays in order
            Ok(if ordered {
                QueryResult::Sequence(kept)
            } else {
                QueryResult::Records(by_id(kept))
            })
        }

        QueryExpression::Sort { select, by } => {
            let selected = evaluate(cache, select, context)?;
            sort(cache, entries(selected, context, "sort")?, by)
        }

        QueryExpression::Page { select, options } => match evaluate(cache, select, context)? {
            QueryResult::Sequence(records) => Ok(QueryResult::Sequence(page(records, options))),
            _ => Err(Error::QueryExpressionParse {
                message: "page() requires a sorted sequence; wrap its selection in sort()".to_string(),
            }),
        },

        QueryExpression::Record { record } => {
            let identity = RecordIdentity::from(record);
            cache
                .record(&identity)
                .cloned()
                .map(QueryResult::Record)
                .ok_or_else(|| Error::record_not_found(&identity))
        }

        QueryExpression::Records { model } => {
            context.base_path = vec![model.clone()];
            let records = cache.records(model).cloned().unwrap_or_default();
            Ok(QueryResult::Records(records))
        }

        QueryExpression::RelatedRecords { record, relationship } => {
            let (owner, target_model) = related_owner(cache, record, relationship)?;
            context.base_path = vec![target_model];

            let related = owner
                .related(relationship)
                .into_iter()
                .filter_map(|identity| cache.record(identity).cloned())
                .map(|record| (record.id.clone(), record))
                .collect();
            Ok(QueryResult::Records(related))
        }

        QueryExpression::RelatedRecord { record, relationship } => {
            let (owner, target_model) = related_owner(cache, record, relationship)?;
            context.base_path = vec![target_model];

            let related = owner
                .related(relationship)
                .first()
                .and_then(|identity| cache.record(identity).cloned());
            Ok(match related {
                Some(record) => QueryResult::Record(record),
                None => QueryResult::Value(Value::Null),
            })
        }

        QueryExpression::Attribute { name } => {
            let value = match cache.get(context.base_path.as_slice()) {
                Some(CacheEntry::Record(record)) => record.attribute(name).cloned(),
                _ => None,
            };
            Ok(QueryResult::Value(value.unwrap_or(Value::Null)))
        }

        QueryExpression::Literal { value } => Ok(QueryResult::Value(Value::from(value))),
    }
}

/// Split a collection result into per-entry contexts with `base_path`
/// extended by each entry's id.
fn entries(selected: QueryResult, context: &QueryContext, operation: &str) -> Result<Vec<(QueryContext, Arc<Record>)>> {
    match selected {
        QueryResult::Records(map) => Ok(map
            .into_values()
            .map(|record| (context.nested(&record.id), record))
            .collect()),
        QueryResult::Sequence(records) => Ok(records
            .into_iter()
            .map(|record| {
                let entry_context = QueryContext {
                    base_path: vec![record.model.clone(), record.id.clone()],
                };
                (entry_context, record)
            })
            .collect()),
        _ => Err(Error::QueryExpressionParse {
            message: format!("{}() requires a collection of records", operation),
        }),
    }
}

fn sort(cache: &Cache, entries: Vec<(QueryContext, Arc<Record>)>, by: &[SortSpecifier]) -> Result<QueryResult> {
    let mut keyed = Vec::with_capacity(entries.len());
    for (entry_context, record) in entries {
        let mut keys = Vec::with_capacity(by.len());
        for specifier in by {
            let key = evaluate(cache, &specifier.field, &mut entry_context.clone())?;
            keys.push(key.as_value().cloned());
        }
        keyed.push((keys, record));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for (index, specifier) in by.iter().enumerate() {
            let cmp = compare_values(a[index].as_ref(), b[index].as_ref());
            if cmp != Ordering::Equal {
                return match specifier.order {
                    SortOrder::Ascending => cmp,
                    SortOrder::Descending => cmp.reverse(),
                };
            }
        }
        Ordering::Equal
    });

    Ok(QueryResult::Sequence(keyed.into_iter().map(|(_, record)| record).collect()))
}

fn page(records: Vec<Arc<Record>>, options: &PageOptions) -> Vec<Arc<Record>> {
    let mut records: Vec<_> = records.into_iter().skip(options.offset).collect();
    if let Some(limit) = options.limit {
        records.truncate(limit);
    }
    records
}

fn by_id(records: Vec<Arc<Record>>) -> BTreeMap<String, Arc<Record>> {
    records.into_iter().map(|record| (record.id.clone(), record)).collect()
}

fn related_owner(cache: &Cache, record: &RecordRef, relationship: &str) -> Result<(Arc<Record>, String)> {
    let identity = RecordIdentity::from(record);
    let target_model = cache.schema().relationship(&identity.model, relationship)?.model.clone();
    let owner = cache
        .record(&identity)
        .cloned()
        .ok_or_else(|| Error::record_not_found(&identity))?;
    Ok((owner, target_model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelDef, RelationshipDef, Schema};
    use relql::Literal;

    fn cache() -> Cache {
        let schema = Schema::new()
            .model(
                "planet",
                ModelDef::new()
                    .attribute("name")
                    .relationship("moons", RelationshipDef::has_many("moon").inverse("planet")),
            )
            .model(
                "moon",
                ModelDef::new()
                    .attribute("name")
                    .relationship("planet", RelationshipDef::has_one("planet").inverse("moons")),
            );
        let mut cache = Cache::new(Arc::new(schema));
        cache
            .reset_from_json(serde_json::json!({
                "planet": {
                    "jupiter": {
                        "type": "planet", "id": "jupiter",
                        "attributes": { "name": "Jupiter", "order": 5 },
                        "relationships": { "moons": { "data": [
                            { "type": "moon", "id": "io" },
                            { "type": "moon", "id": "europa" },
                            { "type": "moon", "id": "ghost" }
                        ] } }
                    },
                    "pluto": {
                        "type": "planet", "id": "pluto",
                        "attributes": { "name": "Pluto", "order": 9 }
                    },
                    "earth": {
                        "type": "planet", "id": "earth",
                        "attributes": { "name": "Earth", "order": 3 }
                    }
                },
                "moon": {
                    "io": {
                        "type": "moon", "id": "io",
                        "attributes": { "name": "Io" },
                        "relationships": { "planet": { "data": { "type": "planet", "id": "jupiter" } } }
                    },
                    "europa": {
                        "type": "moon", "id": "europa",
                        "attributes": { "name": "Europa" },
                        "relationships": { "planet": { "data": { "type": "planet", "id": "jupiter" } } }
                    }
                }
            }))
            .unwrap();
        cache
    }

    fn run(cache: &Cache, expression: QueryExpression) -> Result<QueryResult> {
        evaluate(cache, &expression, &mut QueryContext::new())
    }

    #[test]
    fn test_records_sets_base_path() {
        let cache = cache();
        let mut context = QueryContext::new();
        let result = evaluate(&cache, &QueryExpression::records("planet"), &mut context).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(context.base_path, vec!["planet".to_string()]);

        let result = run(&cache, QueryExpression::records("comet")).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_filter_by_attribute() {
        let cache = cache();
        let result = run(
            &cache,
            QueryExpression::records("planet").filter(QueryExpression::attribute_eq("name", "Pluto")),
        )
        .unwrap();
        assert_eq!(result.ids(), vec!["pluto"]);
    }

    #[test]
    fn test_filter_with_or() {
        let cache = cache();
        let result = run(
            &cache,
            QueryExpression::records("planet").filter(QueryExpression::or(vec![
                QueryExpression::attribute_eq("name", "Pluto"),
                QueryExpression::attribute_eq("order", 3i64),
            ])),
        )
        .unwrap();
        assert_eq!(result.ids(), vec!["earth", "pluto"]);
    }

    #[test]
    fn test_sort_and_page() {
        let cache = cache();
        let sorted = QueryExpression::records("planet").sort_by_attribute("order", SortOrder::Descending);
        assert_eq!(run(&cache, sorted.clone()).unwrap().ids(), vec!["pluto", "jupiter", "earth"]);

        let paged = run(&cache, sorted.page(1, Some(1))).unwrap();
        assert_eq!(paged.ids(), vec!["jupiter"]);
    }

    #[test]
    fn test_sort_mixed_attribute_types() {
        let mut cache = Cache::new(Arc::new(
            Schema::new().model("planet", ModelDef::new().attribute("name")),
        ));
        let planets: BTreeMap<String, Record> = (0..50i64)
            .map(|i| {
                let id = format!("p{:02}", i);
                let record = match i % 3 {
                    0 => Record::new("planet", &id).with_attribute("name", i),
                    1 => Record::new("planet", &id).with_attribute("name", format!("planet {}", i)),
                    _ => Record::new("planet", &id).with_attribute("name", f64::NAN),
                };
                (id, record)
            })
            .collect();
        cache.reset(BTreeMap::from([("planet".to_string(), planets)]));

        let sorted = run(
            &cache,
            QueryExpression::records("planet").sort_by_attribute("name", SortOrder::Ascending),
        )
        .unwrap();
        let records = sorted.records();
        assert_eq!(records.len(), 50);

        // numbers (NaN last among them) before strings
        let first_string = records
            .iter()
            .position(|r| matches!(r.attribute("name"), Some(Value::String(_))))
            .unwrap();
        assert!(records[..first_string]
            .iter()
            .all(|r| !matches!(r.attribute("name"), Some(Value::String(_)))));
        assert!(records[first_string..]
            .iter()
            .all(|r| matches!(r.attribute("name"), Some(Value::String(_)))));
        assert_eq!(records[0].attribute("name"), Some(&Value::Int(0)));
    }

    #[test]
    fn test_page_requires_sort() {
        let cache = cache();
        let err = run(&cache, QueryExpression::records("planet").page(0, Some(1))).unwrap_err();
        assert!(matches!(err, Error::QueryExpressionParse { .. }));
    }

    #[test]
    fn test_record_not_found() {
        let cache = cache();
        let found = run(&cache, QueryExpression::record("planet", "jupiter")).unwrap();
        assert_eq!(found.as_record().map(|r| r.id.as_str()), Some("jupiter"));

        let err = run(&cache, QueryExpression::record("planet", "vulcan")).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }));
    }

    #[test]
    fn test_related_records_skip_unresolved() {
        let cache = cache();
        let result = run(
            &cache,
            QueryExpression::related_records(RecordRef::new("planet", "jupiter"), "moons"),
        )
        .unwrap();
        assert_eq!(result.ids(), vec!["europa", "io"]);
    }

    #[test]
    fn test_related_records_filter_uses_target_type() {
        let cache = cache();
        let result = run(
            &cache,
            QueryExpression::related_records(RecordRef::new("planet", "jupiter"), "moons")
                .filter(QueryExpression::attribute_eq("name", "Io")),
        )
        .unwrap();
        assert_eq!(result.ids(), vec!["io"]);
    }

    #[test]
    fn test_related_record() {
        let cache = cache();
        let result = run(
            &cache,
            QueryExpression::related_record(RecordRef::new("moon", "io"), "planet"),
        )
        .unwrap();
        assert_eq!(result.as_record().map(|r| r.id.as_str()), Some("jupiter"));

        let mut cache = cache;
        cache
            .patch(crate::Operation::replace_has_one(RecordIdentity::new("moon", "io"), "planet", None))
            .unwrap();
        let result = run(
            &cache,
            QueryExpression::related_record(RecordRef::new("moon", "io"), "planet"),
        )
        .unwrap();
        assert_eq!(result, QueryResult::Value(Value::Null));
    }

    #[test]
    fn test_equal_and_truthiness() {
        let cache = cache();
        let result = run(
            &cache,
            QueryExpression::and(vec![
                QueryExpression::equal(vec![QueryExpression::literal(2i64), QueryExpression::literal(2i64)]),
                QueryExpression::literal("non-empty"),
            ]),
        )
        .unwrap();
        assert!(result.is_truthy());

        let result = run(
            &cache,
            QueryExpression::and(vec![QueryExpression::literal(true), QueryExpression::literal(Literal::Null)]),
        )
        .unwrap();
        assert!(!result.is_truthy());
    }
}
