//! 중첩 링크 / 집계 / JSON 직렬화 예제
//!
//! 실행: cargo run --example nested_links

use gnx_core::query::{AggSpec, Query, Serializer, aggregate_to_json, count, field, sum};
use gnx_core::{EngineConfig, ModelBuilder, SchemaManager, Value};

fn main() -> gnx_core::GnxResult<()> {
    println!("=== GNX 링크 예제 ===\n");

    let dir = std::env::temp_dir().join("gnx_nested_links");
    let manager = SchemaManager::new(EngineConfig::new().with_root(&dir));
    let db = manager.create(
        "projects",
        [
            ModelBuilder::new("User")
                .string("name", 16)
                .virtual_link("tasks", "owner"),
            ModelBuilder::new("Task")
                .string("title", 24)
                .int("hours")
                .link("owner")
                .virtual_link("subtasks", "task"),
            ModelBuilder::new("SubTask")
                .string("name", 24)
                .indexed()
                .link("task"),
        ],
        true,
    )?;

    let ann = db.add("User", vec![Value::from("ann")])?;
    let bob = db.add("User", vec![Value::from("bob")])?;
    let design = db.add("Task", vec![Value::from("design"), Value::Int(5), Value::link(ann)])?;
    let build = db.add("Task", vec![Value::from("build"), Value::Int(13), Value::link(ann)])?;
    db.add("Task", vec![Value::from("review"), Value::Int(2), Value::link(bob)])?;
    for (i, task) in [design, design, build].into_iter().enumerate() {
        db.add("SubTask", vec![Value::from(format!("SubTask {}", i + 1)), Value::link(task)])?;
    }

    // User → tasks (가장 긴 작업 1개) → subtasks
    let query = Query::new("User").link(
        "tasks",
        Query::new("Task")
            .order_by(field("hours").desc())
            .limit(1)
            .link("subtasks", Query::new("SubTask")),
    );
    let view = db.all(&query)?;
    let serializer = Serializer::fields(["id", "name", "tasks"]).nest(
        "tasks",
        Serializer::fields(["title", "hours", "subtasks"])
            .nest("subtasks", Serializer::fields(["name"])),
    );
    println!("{:#}\n", serializer.view(&view));

    // 사용자별 작업 시간 합계
    let totals = db.aggregate(
        &Query::new("Task").agg(
            AggSpec::new()
                .by("owner")
                .with("tasks", count())
                .with("hours", sum("hours")),
        ),
    )?;
    println!("{:#}", aggregate_to_json(&totals));

    drop(db);
    manager.delete("projects")?;
    Ok(())
}
