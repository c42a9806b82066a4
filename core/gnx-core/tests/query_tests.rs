// 쿼리 통합 테스트
//
// 필터 / 정렬 / 페이징 시나리오와 proptest 기반 속성 검증

use gnx_core::query::{Query, every, field, pk, some};
use gnx_core::{Database, EngineConfig, GnxError, GnxResult, ModelBuilder, SchemaManager, Value};
use proptest::prelude::*;
use std::path::Path;

fn open(root: &Path, models: Vec<ModelBuilder>) -> GnxResult<Database> {
    SchemaManager::new(EngineConfig::new().with_root(root)).create("q", models, true)
}

#[test]
fn test_admin_parity() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    let db = open(
        dir.path(),
        vec![ModelBuilder::new("User").string("name", 8).bool("is_admin")],
    )?;
    let n = 11;
    for i in 0..n {
        db.add("User", vec![Value::from(format!("u{i}")), Value::Bool(i % 2 == 0)])?;
    }

    let admins = db.all(&Query::new("User").filter(field("is_admin").equals(true)))?;
    assert_eq!(admins.len(), (n + 1) / 2);
    assert!(admins.ids().iter().all(|id| id % 2 == 0));
    Ok(())
}

#[test]
fn test_string_between() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    for indexed in [false, true] {
        let mut model = ModelBuilder::new("SubTask").string("name", 16);
        if indexed {
            model = model.indexed();
        }
        let db = open(dir.path(), vec![model])?;
        for i in 1..=5 {
            db.add("SubTask", vec![Value::from(format!("SubTask {i}"))])?;
        }

        let names = db.pick(
            &Query::new("SubTask")
                .filter(field("name").between("SubTask 2", "SubTask 3"))
                .pick("name"),
        )?;
        assert_eq!(names, vec![Value::from("SubTask 2"), Value::from("SubTask 3")]);
    }
    Ok(())
}

#[test]
fn test_over_length_operands() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    let db = open(
        dir.path(),
        vec![ModelBuilder::new("Code").string("tag", 3).indexed()],
    )?;
    for tag in ["aaa", "abc", "abd", "b"] {
        db.add("Code", vec![Value::from(tag)])?;
    }

    let eq = db.count(&Query::new("Code").filter(field("tag").equals("abcd")))?;
    assert_eq!(eq, 0);

    let range = db.all(&Query::new("Code").filter(field("tag").between("aaaa", "abcz")))?;
    assert_eq!(range.ids(), vec![1]);
    Ok(())
}

#[test]
fn test_regex_and_or() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    let db = open(
        dir.path(),
        vec![ModelBuilder::new("P").string("name", 12).int("age").indexed()],
    )?;
    for (name, age) in [("Alice", 30), ("alfred", 41), ("Bob", 25), ("carol", 30)] {
        db.add("P", vec![Value::from(name), Value::Int(age)])?;
    }

    let q = Query::new("P").filter(some([
        field("name").iregex("al.*"),
        every([field("age").equals(30), field("name").regex("[a-z]+")]),
    ]));
    assert_eq!(db.all(&q)?.ids(), vec![0, 1, 3]);

    let bad = Query::new("P").filter(field("age").regex("3.*"));
    assert!(matches!(db.all(&bad), Err(GnxError::Validation(_))));
    Ok(())
}

#[test]
fn test_empty_table_queries() -> GnxResult<()> {
    let dir = tempfile::tempdir()?;
    let db = open(dir.path(), vec![ModelBuilder::new("E").int("x").indexed()])?;
    let q = Query::new("E").filter(field("x").greater(1)).order_by(field("x")).limit(3);
    assert!(db.all(&q)?.is_empty());
    assert!(db.first(&q)?.is_none());
    assert_eq!(db.count(&q)?, 0);
    Ok(())
}

#[test]
fn test_datetime_and_double_filters() -> GnxResult<()> {
    use chrono::{TimeZone, Utc};

    let dir = tempfile::tempdir()?;
    let db = open(
        dir.path(),
        vec![ModelBuilder::new("Ev").datetime("at").indexed().double("score")],
    )?;
    for day in 1..=4 {
        let at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).single().unwrap_or_default();
        db.add("Ev", vec![Value::from(at), Value::Double(day as f64 / 2.0)])?;
    }

    let from = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).single().unwrap_or_default();
    let to = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).single().unwrap_or_default();
    let q = Query::new("Ev").filter(field("at").between(from, to));
    assert_eq!(db.all(&q)?.ids(), vec![1, 2]);

    let q = Query::new("Ev").filter(field("score").greater_or_equal(1));
    assert_eq!(db.all(&q)?.ids(), vec![1, 2, 3]);
    Ok(())
}

fn scored_db(root: &Path, scores: &[i64]) -> Database {
    let db = open(
        root,
        vec![
            ModelBuilder::new("Plain").int("score"),
            ModelBuilder::new("Indexed").int("score").indexed().pk_indexed(true),
        ],
    )
    .unwrap();
    let rows: Vec<Vec<Value>> = scores.iter().map(|s| vec![Value::Int(*s)]).collect();
    db.bulk_create("Plain", rows.clone()).unwrap();
    db.bulk_create("Indexed", rows).unwrap();
    db
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_index_transparency(
        scores in proptest::collection::vec(-20i64..20, 0..60),
        probe in -25i64..25,
        lo in -25i64..25,
        span in 0i64..15,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let db = scored_db(dir.path(), &scores);
        let conds = [
            field("score").equals(probe),
            field("score").is_in([probe, lo]),
            field("score").between(lo, lo + span),
            every([field("score").between(lo, lo + span), pk().greater(2)]),
            every([pk().is_in([0, 3, 5]), field("score").is_not(probe)]),
        ];
        for cond in conds {
            let plain = db.all(&Query::new("Plain").filter(cond.clone())).unwrap().ids();
            let indexed = db.all(&Query::new("Indexed").filter(cond)).unwrap().ids();
            prop_assert_eq!(plain, indexed);
        }
    }

    #[test]
    fn prop_order_symmetry(scores in proptest::collection::hash_set(-1000i64..1000, 0..50)) {
        let scores: Vec<i64> = scores.into_iter().collect();
        let dir = tempfile::tempdir().unwrap();
        let db = scored_db(dir.path(), &scores);

        let asc = db.all(&Query::new("Plain").order_by(field("score"))).unwrap().ids();
        let mut desc = db.all(&Query::new("Plain").order_by(field("score").desc())).unwrap().ids();
        desc.reverse();
        prop_assert_eq!(asc, desc);
    }

    #[test]
    fn prop_paging_tiles(
        scores in proptest::collection::vec(0i64..10, 0..40),
        page in 1usize..7,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let db = scored_db(dir.path(), &scores);
        let ordered = Query::new("Indexed").order([field("score").desc(), pk().asc()]);
        let full = db.all(&ordered).unwrap().ids();

        let mut tiled = Vec::new();
        let mut k = 0;
        loop {
            let window = db.all(&ordered.clone().limit(page).offset(k * page)).unwrap();
            let expected = page.min(full.len().saturating_sub(k * page));
            prop_assert_eq!(window.len(), expected);
            prop_assert_eq!(window.total(), full.len());
            if window.is_empty() {
                break;
            }
            tiled.extend(window.ids());
            k += 1;
        }
        prop_assert_eq!(tiled, full);
    }
}
