//! 기본 CRUD 작업 예제
//!
//! 실행: RUST_LOG=debug cargo run --example basic_crud --features logging

use gnx_core::query::{Query, field};
use gnx_core::{EngineConfig, ModelBuilder, SchemaManager, Value};

fn main() -> gnx_core::GnxResult<()> {
    #[cfg(feature = "logging")]
    gnx_core::logging::init();

    println!("=== GNX 기본 CRUD 예제 ===\n");

    // 1. 스키마 생성
    println!("1. 스키마 생성...");
    let dir = std::env::temp_dir().join("gnx_basic_crud");
    let manager = SchemaManager::new(EngineConfig::new().with_root(&dir));
    let db = manager.create(
        "people",
        [ModelBuilder::new("User")
            .string("first_name", 16)
            .string("last_name", 16)
            .indexed()
            .int("age")],
        true,
    )?;
    println!("   ✓ {} 에 스키마 생성 완료\n", db.path().display());

    // 2. 데이터 삽입 (Create)
    println!("2. 데이터 삽입...");
    for (first, last, age) in [("Alice", "Kim", 31), ("Bob", "Lee", 27), ("Charlie", "Kim", 45)] {
        let id = db.add("User", vec![Value::from(first), Value::from(last), Value::Int(age)])?;
        println!("   user {id} = {first} {last}");
    }
    println!();

    // 3. 데이터 조회 (Read)
    println!("3. 데이터 조회...");
    println!("   get(0)  = {:?}", db.get("User", 0)?);
    println!("   get(-1) = {:?}\n", db.get("User", -1)?);

    // 4. 데이터 수정 (Update)
    println!("4. 데이터 수정...");
    db.update("User", 1, vec![Value::from("Bob"), Value::from("Park"), Value::Int(28)])?;
    println!("   user 1 = {:?} (수정됨)\n", db.get("User", 1)?);

    // 5. 필터 조회
    println!("5. 인덱스 필터 조회...");
    let kims = db.all(&Query::new("User").filter(field("last_name").equals("Kim")))?;
    println!("   last_name = Kim → ids {:?}\n", kims.ids());

    // 6. 데이터 삭제 (Delete)
    println!("6. 데이터 삭제...");
    db.delete("User", 2, false)?;
    if db.get("User", 2).is_err() {
        println!("   ✓ user 2가 존재하지 않음 확인");
    }
    println!("   남은 레코드: {}\n", db.record_count("User")?);

    drop(db);
    manager.delete("people")?;
    println!("=== 완료 ===");
    Ok(())
}
