//! Storage module — value model, fixed-width record codec, per-model record
//! files and the sled-backed secondary indexes.
//!
//! 모델 하나당:
//!
//! - `<model>.dat` — 슬롯 배열 (8바이트 소유 id + 고정 크기 레코드)
//! - `<model>.ix` — id → 슬롯 오프셋 테이블 (-1 = 삭제됨)
//! - `indexes/` 아래 sled 트리 — 인덱스 필드마다 하나

pub mod codec;
pub mod index;
pub mod record_file;
pub mod value;

pub use codec::RecordCodec;
pub use index::{IndexColumn, ModelIndexes};
pub use record_file::RecordFile;
pub use value::{RecordId, Value};
