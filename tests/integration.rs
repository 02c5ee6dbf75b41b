//! Integration tests for relstore
//!
//! Full flows through the store: transforms in, cascades and notifications
//! out, history operations and queries on top.

mod common;

use common::*;
use relstore::{
    Error, Operation, QueryExpression, QueryResult, Record, RecordIdentity, Store, Transform, TransformId,
};
use relql::SortOrder;
use std::sync::Arc;

fn solar_system(store: &mut Store) {
    seed(
        store,
        vec![
            Record::new("planet", "saturn")
                .with_attribute("name", "Saturn")
                .with_has_many("moons", vec![moon("titan")]),
            Record::new("planet", "jupiter")
                .with_attribute("name", "Jupiter")
                .with_has_many("moons", vec![moon("europa")]),
            Record::new("moon", "titan")
                .with_attribute("name", "Titan")
                .with_has_one("planet", Some(planet("saturn"))),
            Record::new("moon", "europa")
                .with_attribute("name", "Europa")
                .with_has_one("planet", Some(planet("jupiter"))),
        ],
    );
}

// =============================================================================
// Relationship Consistency Tests
// =============================================================================

#[test]
fn test_new_moon_joins_planet() {
    let mut store = store();
    solar_system(&mut store);

    sync(
        &mut store,
        vec![Operation::add_record(
            Record::new("moon", "enceladus").with_has_one("planet", Some(planet("saturn"))),
        )],
    );

    let saturn = store.cache().record(&planet("saturn")).unwrap();
    assert!(saturn.references("moons", &moon("enceladus")));
    assert!(saturn.references("moons", &moon("titan")));
    assert_symmetric(store.cache());
}

#[test]
fn test_moving_a_moon_updates_both_planets() {
    let mut store = store();
    solar_system(&mut store);
    let seen = record_patches(&mut store);

    sync(
        &mut store,
        vec![Operation::replace_has_one(moon("europa"), "planet", Some(planet("saturn")))],
    );

    assert_eq!(
        *seen.borrow(),
        vec![
            Operation::replace_has_one(moon("europa"), "planet", Some(planet("saturn"))),
            Operation::remove_from_has_many(planet("jupiter"), "moons", moon("europa")),
            Operation::add_to_has_many(planet("saturn"), "moons", moon("europa")),
        ]
    );
    assert_symmetric(store.cache());
}

#[test]
fn test_replace_has_many_to_empty() {
    let mut store = store();
    solar_system(&mut store);
    let seen = record_patches(&mut store);

    sync(
        &mut store,
        vec![Operation::replace_has_many(planet("saturn"), "moons", vec![])],
    );

    assert_eq!(
        *seen.borrow(),
        vec![
            Operation::replace_has_many(planet("saturn"), "moons", vec![]),
            Operation::replace_has_one(moon("titan"), "planet", None),
        ]
    );
    // moons are not dependent
    assert!(store.cache().contains(&moon("titan")));
}

#[test]
fn test_replace_record_cascade_order() {
    let mut store = store();
    seed(
        &mut store,
        vec![
            Record::new("planet", "earth")
                .with_has_many("inhabitants", vec![inhabitant("human")])
                .with_has_many("moons", vec![])
                .with_has_one("next", Some(planet("jupiter"))),
            Record::new("planet", "jupiter").with_has_one("previous", Some(planet("earth"))),
            Record::new("planet", "saturn"),
            Record::new("moon", "themoon"),
            Record::new("inhabitant", "human").with_has_one("planet", Some(planet("earth"))),
            Record::new("inhabitant", "cat"),
            Record::new("inhabitant", "dog"),
        ],
    );
    let seen = record_patches(&mut store);

    let earth = Record::new("planet", "earth")
        .with_has_many("inhabitants", vec![inhabitant("human"), inhabitant("cat"), inhabitant("dog")])
        .with_has_many("moons", vec![moon("themoon")])
        .with_has_one("next", Some(planet("saturn")));
    sync(&mut store, vec![Operation::replace_record(earth.clone())]);

    assert_eq!(
        *seen.borrow(),
        vec![
            Operation::replace_record(earth),
            Operation::replace_has_one(moon("themoon"), "planet", Some(planet("earth"))),
            Operation::replace_has_one(inhabitant("cat"), "planet", Some(planet("earth"))),
            Operation::replace_has_one(inhabitant("dog"), "planet", Some(planet("earth"))),
            Operation::replace_has_one(planet("jupiter"), "previous", None),
            Operation::replace_has_one(planet("saturn"), "previous", Some(planet("earth"))),
        ]
    );
    assert_symmetric(store.cache());
}

#[test]
fn test_late_arrival_adopts_referrers() {
    let mut store = store();
    sync(
        &mut store,
        vec![
            Operation::add_record(Record::new("planet", "mars").with_has_many("moons", vec![moon("phobos")])),
            Operation::add_record(Record::new("moon", "phobos").with_attribute("name", "Phobos")),
        ],
    );

    let phobos = store.cache().record(&moon("phobos")).unwrap();
    assert!(phobos.references("planet", &planet("mars")));
    assert_symmetric(store.cache());
}

#[test]
fn test_new_record_pointing_at_itself() {
    let mut store = store();
    sync(
        &mut store,
        vec![
            Operation::add_record(Record::new("planet", "earth").with_has_one("next", Some(planet("earth")))),
            Operation::replace_record(Record::new("planet", "mars").with_has_one("previous", Some(planet("mars")))),
        ],
    );

    let earth = store.cache().record(&planet("earth")).unwrap();
    assert!(earth.references("previous", &planet("earth")));
    let mars = store.cache().record(&planet("mars")).unwrap();
    assert!(mars.references("next", &planet("mars")));
    assert_symmetric(store.cache());

    sync(
        &mut store,
        vec![Operation::replace_has_one(planet("earth"), "next", Some(planet("mars")))],
    );
    assert_symmetric(store.cache());
    assert!(store
        .cache()
        .record(&planet("mars"))
        .unwrap()
        .references("previous", &planet("earth")));
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_remove_record_clears_references() {
    let mut store = store();
    solar_system(&mut store);
    let seen = record_patches(&mut store);

    sync(&mut store, vec![Operation::remove_record(planet("saturn"))]);

    assert_eq!(
        *seen.borrow(),
        vec![
            Operation::remove_record(planet("saturn")),
            Operation::replace_has_one(moon("titan"), "planet", None),
        ]
    );
    assert_eq!(store.cache().length("planet"), 1);
}

#[test]
fn test_remove_absent_record_is_silent() {
    let mut store = store();
    solar_system(&mut store);
    let seen = record_patches(&mut store);

    let result = store
        .sync(Transform::new(vec![Operation::remove_record(planet("vulcan"))]))
        .unwrap();

    assert!(result.applied.is_empty());
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_dependent_records_are_removed() {
    let mut store = store();
    sync(
        &mut store,
        vec![
            Operation::add_record(Record::new("planet", "earth")),
            Operation::add_record(Record::new("inhabitant", "human").with_has_one("planet", Some(planet("earth")))),
            Operation::add_record(Record::new("inhabitant", "cat").with_has_one("planet", Some(planet("earth")))),
        ],
    );
    assert_eq!(store.cache().length("inhabitant"), 2);

    sync(
        &mut store,
        vec![Operation::remove_from_has_many(planet("earth"), "inhabitants", inhabitant("cat"))],
    );
    assert!(!store.cache().contains(&inhabitant("cat")));
    assert!(store.cache().contains(&inhabitant("human")));

    sync(&mut store, vec![Operation::remove_record(planet("earth"))]);
    assert_eq!(store.cache().length("inhabitant"), 0);
}

#[test]
fn test_edits_on_absent_records_fail() {
    let mut store = store();
    solar_system(&mut store);

    let edits = vec![
        Operation::update_attribute(planet("vulcan"), "name", "Vulcan"),
        Operation::replace_has_one(moon("charon"), "planet", None),
        Operation::replace_has_many(planet("vulcan"), "moons", vec![]),
        Operation::add_to_has_many(planet("vulcan"), "moons", moon("titan")),
        Operation::remove_from_has_many(planet("vulcan"), "moons", moon("titan")),
    ];
    for edit in edits {
        let err = store.sync(Transform::new(vec![edit])).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound { .. }), "unexpected error: {}", err);
    }
    assert_symmetric(store.cache());
}

#[test]
fn test_undeclared_model_is_schema_error() {
    let mut store = store();
    let err = store
        .sync(Transform::new(vec![Operation::add_record(Record::new("comet", "halley"))]))
        .unwrap_err();
    assert!(matches!(err, Error::Schema(_)));
    assert!(err.suggestion().is_some());
}

// =============================================================================
// History Tests
// =============================================================================

#[test]
fn test_duplicate_transform_rejected_before_apply() {
    let mut store = store();
    store
        .sync(Transform::with_id("t1", vec![Operation::add_record(Record::new("planet", "mars"))]))
        .unwrap();

    let err = store
        .sync(Transform::with_id("t1", vec![Operation::add_record(Record::new("planet", "venus"))]))
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateTransform { .. }));
    assert!(!store.cache().contains(&planet("venus")));
    assert_eq!(store.log().len(), 1);
}

#[test]
fn test_transforms_since() {
    let mut store = store();
    let t1 = sync(&mut store, vec![Operation::add_record(Record::new("planet", "mercury"))]);
    let t2 = sync(&mut store, vec![Operation::add_record(Record::new("planet", "venus"))]);
    let t3 = sync(&mut store, vec![Operation::add_record(Record::new("planet", "earth"))]);

    let since: Vec<_> = store
        .transforms_since(&t1)
        .unwrap()
        .iter()
        .map(|t| t.id.clone())
        .collect();
    assert_eq!(since, vec![t2.clone(), t3.clone()]);

    let all: Vec<_> = store.all_transforms().iter().map(|t| t.id.clone()).collect();
    assert_eq!(all, vec![t1, t2, t3.clone()]);
    assert_eq!(store.log().head(), Some(&t3));

    assert!(matches!(
        store.transforms_since(&TransformId::from("missing")),
        Err(Error::TransformNotFound { .. })
    ));
}

#[test]
fn test_rollback_restores_each_point() {
    let mut store = store();
    solar_system(&mut store);

    let t1 = sync(&mut store, vec![Operation::update_attribute(planet("saturn"), "name", "Cronus")]);
    let after_t1 = snapshot(store.cache());

    let t2 = sync(
        &mut store,
        vec![
            Operation::add_record(Record::new("moon", "rhea").with_has_one("planet", Some(planet("saturn")))),
            Operation::replace_has_one(moon("europa"), "planet", Some(planet("saturn"))),
        ],
    );
    let after_t2 = snapshot(store.cache());

    sync(
        &mut store,
        vec![
            Operation::remove_record(planet("saturn")),
            Operation::replace_record(Record::new("planet", "jupiter").with_attribute("rings", true)),
        ],
    );

    let undone = store.rollback(&t2).unwrap();
    assert_eq!(undone.len(), 1);
    assert_eq!(snapshot(store.cache()), after_t2);
    assert_eq!(store.log().head(), Some(&t2));

    store.rollback(&t1).unwrap();
    assert_eq!(snapshot(store.cache()), after_t1);
    assert_eq!(store.all_transforms().len(), 1);
    assert_symmetric(store.cache());
}

#[test]
fn test_rollback_notifies_inverse_operations() {
    let mut store = store();
    solar_system(&mut store);
    let t1 = sync(&mut store, vec![Operation::update_attribute(planet("saturn"), "name", "Cronus")]);
    sync(&mut store, vec![Operation::add_to_has_many(planet("saturn"), "moons", moon("europa"))]);

    let seen = record_patches(&mut store);
    store.rollback(&t1).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            Operation::add_to_has_many(planet("jupiter"), "moons", moon("europa")),
            Operation::replace_has_one(moon("europa"), "planet", Some(planet("jupiter"))),
            Operation::remove_from_has_many(planet("saturn"), "moons", moon("europa")),
        ]
    );
}

#[test]
fn test_rollback_unknown_transform() {
    let mut store = store();
    let err = store.rollback(&TransformId::from("nope")).unwrap_err();
    assert!(matches!(err, Error::TransformNotFound { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_failed_sync_can_be_rolled_back() {
    let mut store = store();
    solar_system(&mut store);
    let t1 = sync(&mut store, vec![Operation::update_attribute(planet("saturn"), "name", "Cronus")]);
    let before = snapshot(store.cache());

    let err = store
        .sync(Transform::new(vec![
            Operation::add_record(Record::new("moon", "rhea").with_has_one("planet", Some(planet("saturn")))),
            Operation::update_attribute(planet("vulcan"), "name", "Vulcan"),
        ]))
        .unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }));

    // the first operation stays applied until rolled back
    assert!(store.cache().contains(&moon("rhea")));
    assert_eq!(store.log().len(), 2);

    store.rollback(&t1).unwrap();
    assert_eq!(snapshot(store.cache()), before);
}

#[test]
fn test_truncate_and_clear_history() {
    let mut store = store();
    let t1 = sync(&mut store, vec![Operation::add_record(Record::new("planet", "mercury"))]);
    let t2 = sync(&mut store, vec![Operation::add_record(Record::new("planet", "venus"))]);
    let t3 = sync(&mut store, vec![Operation::add_record(Record::new("planet", "earth"))]);

    store.truncate_history(&t2).unwrap();
    assert_eq!(store.log().entries(), &[t2.clone(), t3]);
    assert!(matches!(store.rollback(&t1), Err(Error::TransformNotFound { .. })));
    assert_eq!(store.cache().length("planet"), 3);

    store.clear_history();
    assert!(store.log().is_empty());
    assert!(store.all_transforms().is_empty());
    assert_eq!(store.cache().length("planet"), 3);
}

// =============================================================================
// Fork / Merge Tests
// =============================================================================

#[test]
fn test_fork_independence() {
    let mut store = store();
    solar_system(&mut store);
    let base = sync(&mut store, vec![Operation::update_attribute(planet("saturn"), "name", "Cronus")]);

    let mut fork = store.fork();
    let fork_before = snapshot(fork.cache());
    assert_eq!(fork.log().head(), Some(&base));

    sync(&mut store, vec![Operation::remove_record(moon("titan"))]);
    assert_eq!(snapshot(fork.cache()), fork_before);

    let store_before = snapshot(store.cache());
    sync(&mut fork, vec![Operation::add_record(Record::new("planet", "neptune"))]);
    assert_eq!(snapshot(store.cache()), store_before);
    assert!(!store.cache().contains(&planet("neptune")));
}

#[test]
fn test_merge_replays_fork_transforms() {
    let mut store = store();
    solar_system(&mut store);
    sync(&mut store, vec![Operation::update_attribute(planet("saturn"), "name", "Cronus")]);

    let mut fork = store.fork();
    let f1 = sync(&mut fork, vec![Operation::add_record(Record::new("planet", "neptune"))]);
    let f2 = sync(
        &mut fork,
        vec![Operation::add_record(Record::new("moon", "triton").with_has_one("planet", Some(planet("neptune"))))],
    );
    sync(&mut store, vec![Operation::add_record(Record::new("planet", "uranus"))]);

    let merged = store.merge(&fork).unwrap();
    assert_eq!(merged, vec![f1.clone(), f2.clone()]);

    let ids: Vec<_> = store.all_transforms().iter().map(|t| t.id.clone()).collect();
    assert_eq!(&ids[ids.len() - 2..], &[f1, f2]);
    assert!(store
        .cache()
        .record(&planet("neptune"))
        .unwrap()
        .references("moons", &moon("triton")));
    assert!(store.cache().contains(&planet("uranus")));

    // merging again is a no-op
    assert!(store.merge(&fork).unwrap().is_empty());
}

#[derive(Debug)]
struct IdentityKeys;

impl relstore::KeyMap for IdentityKeys {
    fn key_to_id(&self, _model: &str, _key: &str, value: &str) -> Option<String> {
        Some(value.to_string())
    }

    fn id_to_key(&self, _model: &str, _key: &str, id: &str) -> Option<String> {
        Some(id.to_string())
    }
}

#[test]
fn test_fork_shares_schema_and_key_map() {
    let store = Store::new(schema()).with_key_map(Arc::new(IdentityKeys));
    let fork = store.fork();

    assert!(Arc::ptr_eq(store.schema(), fork.schema()));
    assert!(Arc::ptr_eq(store.key_map().unwrap(), fork.key_map().unwrap()));
    assert_eq!(
        fork.key_map().unwrap().key_to_id("planet", "remoteId", "p-1"),
        Some("p-1".to_string())
    );
}

// =============================================================================
// Query Tests
// =============================================================================

fn planets(store: &mut Store) {
    seed(
        store,
        vec![
            Record::new("planet", "pluto").with_attribute("name", "Pluto").with_attribute("order", 9i64),
            Record::new("planet", "jupiter").with_attribute("name", "Jupiter").with_attribute("order", 5i64),
        ],
    );
}

#[test]
fn test_query_round_trip() {
    let mut store = store();
    planets(&mut store);

    let result = store
        .query(&QueryExpression::records("planet").sort_by_attribute("name", SortOrder::Ascending))
        .unwrap();
    assert!(matches!(result, QueryResult::Sequence(_)));
    assert_eq!(result.ids(), vec!["jupiter", "pluto"]);

    let result = store
        .query(&QueryExpression::records("planet").filter(QueryExpression::attribute_eq("name", "Jupiter")))
        .unwrap();
    assert_eq!(result.ids(), vec!["jupiter"]);
}

#[test]
fn test_query_text_form() {
    let mut store = store();
    planets(&mut store);

    let result = store
        .query_str("page(sort(records('planet'), attribute('order') desc), offset = 0, limit = 1)")
        .unwrap();
    assert_eq!(result.ids(), vec!["pluto"]);

    let result = store
        .query_str("filter(records(planet), equal(attribute(name), 'Pluto'))")
        .unwrap();
    assert_eq!(result.ids(), vec!["pluto"]);
}

#[test]
fn test_query_errors() {
    let mut store = store();
    planets(&mut store);

    let err = store.query_str("page(records('planet'), limit = 1)").unwrap_err();
    assert!(matches!(err, Error::QueryExpressionParse { .. }));

    let err = store.query_str("record('planet', 'vulcan')").unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }));

    let err = store.query_str("select * from planets").unwrap_err();
    assert!(matches!(err, Error::QueryExpressionParse { .. }));
}

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_transform_from_json() {
    let mut store = store();
    solar_system(&mut store);

    let transform: Transform = serde_json::from_value(serde_json::json!({
        "id": "from-json",
        "operations": [
            {
                "op": "addRecord",
                "record": {
                    "type": "moon",
                    "id": "io",
                    "attributes": { "name": "Io" },
                    "relationships": { "planet": { "data": { "type": "planet", "id": "jupiter" } } }
                }
            },
            {
                "op": "removeFromHasMany",
                "record": { "type": "planet", "id": "saturn" },
                "relationship": "moons",
                "relatedRecord": { "type": "moon", "id": "titan" }
            }
        ]
    }))
    .unwrap();

    let result = store.sync(transform).unwrap();
    assert_eq!(result.applied.len(), 4);
    assert!(store
        .cache()
        .record(&planet("jupiter"))
        .unwrap()
        .references("moons", &RecordIdentity::new("moon", "io")));
    assert_eq!(store.log().head().map(TransformId::as_str), Some("from-json"));
    assert_symmetric(store.cache());
}
