//! # GNX — Embedded Schema-Defined Record Store
//!
//! GNX는 스키마로 정의된 고정 폭 레코드를 모델별 바이너리 파일에 저장하는
//! 임베디드 레코드 스토어입니다. 인덱스 필드는 sled B-tree로 관리되며,
//! 조건 트리 필터, 다중 키 정렬, 페이징, 링크(조인), 집계를 지원합니다.
//!
//! ## 주요 특징
//!
//! - **고정 폭 레코드**: 모델 선언에서 필드 오프셋/크기를 한 번 계산
//! - **안정적인 id**: 0부터 순서대로 할당, 삭제 후에도 재사용하지 않음
//! - **B-tree 인덱스**: EQUAL / IS_IN / BETWEEN 필터를 인덱스로 가속
//! - **링크**: 직접 링크(외래 키)와 가상 링크(역방향 1:N), 중첩 조인
//! - **집계**: GROUP BY + COUNT / SUM / MIN / MAX
//!
//! ## 빠른 시작
//!
//! ```rust
//! use gnx_core::query::{field, Query};
//! use gnx_core::{EngineConfig, ModelBuilder, SchemaManager, Value};
//!
//! # fn main() -> gnx_core::GnxResult<()> {
//! let dir = tempfile::tempdir()?;
//! let manager = SchemaManager::new(EngineConfig::new().with_root(dir.path()));
//!
//! // 스키마 생성
//! let db = manager.create(
//!     "shop",
//!     [ModelBuilder::new("Product").string("name", 16).int("stock").indexed()],
//!     false,
//! )?;
//!
//! // 레코드 추가
//! db.add("Product", vec![Value::from("pen"), Value::Int(3)])?;
//! db.add("Product", vec![Value::from("ink"), Value::Int(0)])?;
//!
//! // 조회
//! let in_stock = db.all(&Query::new("Product").filter(field("stock").greater(0)))?;
//! assert_eq!(in_stock.len(), 1);
//! assert_eq!(db.get("Product", -1)?, vec![Value::from("ink"), Value::Int(0)]);
//! # Ok(())
//! # }
//! ```
//!
//! ## 모듈 구조
//!
//! - [`schema`] — 모델 선언, 등록, 카탈로그 ([`SchemaManager`])
//! - [`engine`] — 데이터베이스 엔진 ([`Database`])
//! - [`storage`] — 값 모델, 레코드 코덱, 레코드 파일, 인덱스
//! - [`query`] — 조건 트리, 쿼리 빌더, 링크, 집계, 직렬화
//! - [`config`] — 엔진 설정 ([`EngineConfig`])

pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod schema;
pub mod storage;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use config::{DurabilityLevel, EngineConfig, StringOverflow};
pub use engine::{Database, ParallelExecutionEngine, ParallelizationPolicy};
pub use error::{GnxError, GnxResult};
pub use query::{AggRow, AggSpec, Query, Row, Serializer, View};
pub use schema::{FieldType, ModelBuilder, ModelDef, SchemaManager};
pub use storage::{RecordId, Value};
