// 링크 / 집계 통합 테스트

use gnx_core::query::{AggSpec, Query, Serializer, count, field, max, min, sum};
use gnx_core::{Database, EngineConfig, GnxResult, ModelBuilder, SchemaManager, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

fn open(root: &Path) -> GnxResult<Database> {
    SchemaManager::new(EngineConfig::new().with_root(root)).create(
        "rel",
        [
            ModelBuilder::new("Country")
                .string("code", 2)
                .virtual_link("cities", "country"),
            ModelBuilder::new("City")
                .string("name", 16)
                .int("population")
                .link("country"),
        ],
        true,
    )
}

#[test]
fn test_ungrouped_sum() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    let db = open(dir.path())?;
    for (name, pop) in [("a", 100), ("b", 200), ("c", 300)] {
        db.add("City", vec![Value::from(name), Value::Int(pop), Value::Link(None)])?;
    }

    let rows = db.aggregate(&Query::new("City").agg(AggSpec::new().with("total", sum("population"))))?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("total"), Some(&Value::Int(600)));
    Ok(())
}

#[test]
fn test_grouped_by_link() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    let db = open(dir.path())?;
    let nl = db.add("Country", vec![Value::from("nl")])?;
    let be = db.add("Country", vec![Value::from("be")])?;
    for (name, pop, country) in [
        ("ams", 900, nl),
        ("rot", 650, nl),
        ("ant", 530, be),
        ("utr", 360, nl),
    ] {
        db.add("City", vec![Value::from(name), Value::Int(pop), Value::link(country)])?;
    }

    let q = Query::new("City")
        .filter(field("population").greater(400))
        .agg(
            AggSpec::new()
                .by("country")
                .with("n", count())
                .with("smallest", min("population"))
                .with("largest", max("population")),
        );
    let mut rows = db.aggregate(&q)?;
    rows.sort_by(|a, b| {
        let key = |r: &gnx_core::AggRow| r.group_value().and_then(Value::as_link);
        key(a).cmp(&key(b))
    });
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("country"), Some(&Value::link(nl)));
    assert_eq!(rows[0].get("n"), Some(&Value::Int(2)));
    assert_eq!(rows[0].get("smallest"), Some(&Value::Int(650)));
    assert_eq!(rows[1].get("largest"), Some(&Value::Int(530)));

    let json = gnx_core::query::aggregate_to_json(&rows);
    assert_eq!(json[0]["country"], serde_json::json!(nl));
    Ok(())
}

#[test]
fn test_virtual_link_serialized() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    let db = open(dir.path())?;
    let nl = db.add("Country", vec![Value::from("nl")])?;
    db.add("Country", vec![Value::from("be")])?;
    db.add("City", vec![Value::from("ams"), Value::Int(900), Value::link(nl)])?;
    db.add("City", vec![Value::from("rot"), Value::Int(650), Value::link(nl)])?;

    let view = db.all(&Query::new("Country").link(
        "cities",
        Query::new("City").order_by(field("population")).limit(1),
    ))?;
    let s = Serializer::fields(["code", "cities"]).nest("cities", Serializer::fields(["name"]));
    assert_eq!(
        s.view(&view),
        serde_json::json!({
            "total": 2,
            "rows": [
                {"code": "nl", "cities": [{"name": "rot"}]},
                {"code": "be", "cities": []},
            ]
        })
    );
    Ok(())
}

fn populated(root: &Path, cities: &[(i64, Option<u64>)], countries: u64) -> Database {
    let db = open(root).unwrap();
    for c in 0..countries {
        db.add("Country", vec![Value::from(format!("c{c}"))]).unwrap();
    }
    for (i, (pop, country)) in cities.iter().enumerate() {
        db.add(
            "City",
            vec![Value::from(format!("city{i}")), Value::Int(*pop), Value::Link(*country)],
        )
        .unwrap();
    }
    db
}

fn cities_strategy() -> impl Strategy<Value = Vec<(i64, Option<u64>)>> {
    proptest::collection::vec((0i64..1000, proptest::option::of(0u64..4)), 0..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_link_inverse(cities in cities_strategy(), threshold in 0i64..1000) {
        let dir = tempfile::tempdir().unwrap();
        let db = populated(dir.path(), &cities, 4);

        let view = db
            .all(&Query::new("Country").link(
                "cities",
                Query::new("City").filter(field("population").greater_or_equal(threshold)),
            ))
            .unwrap();
        for country in view.rows() {
            let got: Vec<u64> = country
                .linked_many("cities")
                .iter()
                .filter_map(|c| c.id())
                .collect();
            let expected: Vec<u64> = cities
                .iter()
                .enumerate()
                .filter(|(_, (pop, fk))| *fk == country.id() && *pop >= threshold)
                .map(|(i, _)| i as u64)
                .collect();
            prop_assert_eq!(got, expected);
        }
    }

    #[test]
    fn prop_aggregation_matches_reference(cities in cities_strategy()) {
        let dir = tempfile::tempdir().unwrap();
        let db = populated(dir.path(), &cities, 4);

        let rows = db
            .aggregate(&Query::new("City").agg(
                AggSpec::new()
                    .by("country")
                    .with("n", count())
                    .with("total", sum("population"))
                    .with("low", min("population"))
                    .with("high", max("population")),
            ))
            .unwrap();

        let mut reference: BTreeMap<Option<u64>, Vec<i64>> = BTreeMap::new();
        for (pop, fk) in &cities {
            reference.entry(*fk).or_default().push(*pop);
        }
        prop_assert_eq!(rows.len(), reference.len());

        let mut counted = 0;
        for row in &rows {
            let fk = row.group_value().and_then(Value::as_link);
            let pops = &reference[&fk];
            counted += pops.len();
            prop_assert_eq!(row.get("n"), Some(&Value::Int(pops.len() as i64)));
            prop_assert_eq!(row.get("total"), Some(&Value::Int(pops.iter().sum())));
            prop_assert_eq!(row.get("low"), Some(&Value::Int(*pops.iter().min().unwrap())));
            prop_assert_eq!(row.get("high"), Some(&Value::Int(*pops.iter().max().unwrap())));
        }
        prop_assert_eq!(counted, cities.len());
    }
}
