//! Engine configuration — storage root, durability, codec and parallelism knobs
//!
//! 설정은 세 가지 경로로 구성할 수 있습니다:
//! 빌더 메서드, 환경 변수 (`GNX_*`), JSON 파일.

use crate::engine::parallel_engine::ParallelizationPolicy;
use crate::error::{GnxError, GnxResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 기본 저장소 루트 디렉토리
pub const DEFAULT_ROOT: &str = "gnx_db";

/// 병렬 스캔을 고려하기 시작하는 기본 행 수
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// 내구성 수준 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityLevel {
    /// 모든 변경 작업 후 레코드 파일과 인덱스를 fsync (최대 안전)
    Full,
    /// OS 버퍼에 맡기고 flush()/drop 시점에 동기화
    #[default]
    Lazy,
}

/// STRING(n) 필드에 n 바이트를 초과하는 값이 들어왔을 때의 처리 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringOverflow {
    /// TypeMismatch 에러 반환
    #[default]
    Reject,
    /// UTF-8 문자 경계에서 잘라서 저장
    Truncate,
}

/// Engine-wide configuration shared by every schema opened through a
/// [`SchemaManager`](crate::schema::SchemaManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one sub-directory per schema
    pub root: PathBuf,
    pub durability: DurabilityLevel,
    pub string_overflow: StringOverflow,
    pub parallelism: ParallelizationPolicy,
    /// Minimum number of rows before scans and aggregations go parallel
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            durability: DurabilityLevel::default(),
            string_overflow: StringOverflow::default(),
            parallelism: ParallelizationPolicy::default(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_durability(mut self, durability: DurabilityLevel) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_string_overflow(mut self, policy: StringOverflow) -> Self {
        self.string_overflow = policy;
        self
    }

    pub fn with_parallelism(mut self, policy: ParallelizationPolicy) -> Self {
        self.parallelism = policy;
        self
    }

    pub fn with_parallel_threshold(mut self, rows: usize) -> Self {
        self.parallel_threshold = rows.max(1);
        self
    }

    /// 환경 변수에서 설정을 덮어씁니다.
    ///
    /// # Environment Variables
    /// - `GNX_ROOT` - 저장소 루트 디렉토리
    /// - `GNX_DURABILITY` - `full` | `lazy`
    /// - `GNX_THREADS` - 고정 스레드 수 (`0`이면 Auto)
    /// - `GNX_STRING_OVERFLOW` - `reject` | `truncate`
    pub fn load_from_env(self) -> GnxResult<Self> {
        let vars = ["GNX_ROOT", "GNX_DURABILITY", "GNX_THREADS", "GNX_STRING_OVERFLOW"]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key, value)));
        self.apply_vars(vars)
    }

    fn apply_vars<'a>(
        mut self,
        vars: impl IntoIterator<Item = (&'a str, String)>,
    ) -> GnxResult<Self> {
        for (key, value) in vars {
            let value = value.trim();
            match key {
                "GNX_ROOT" => self.root = PathBuf::from(value),
                "GNX_DURABILITY" => {
                    self.durability = match value.to_ascii_lowercase().as_str() {
                        "full" => DurabilityLevel::Full,
                        "lazy" => DurabilityLevel::Lazy,
                        other => return Err(invalid_var(key, other)),
                    }
                }
                "GNX_THREADS" => {
                    let threads: usize = value.parse().map_err(|_| invalid_var(key, value))?;
                    self.parallelism = if threads == 0 {
                        ParallelizationPolicy::Auto
                    } else {
                        ParallelizationPolicy::Fixed(threads)
                    };
                }
                "GNX_STRING_OVERFLOW" => {
                    self.string_overflow = match value.to_ascii_lowercase().as_str() {
                        "reject" => StringOverflow::Reject,
                        "truncate" => StringOverflow::Truncate,
                        other => return Err(invalid_var(key, other)),
                    }
                }
                _ => {}
            }
        }
        Ok(self)
    }

    /// JSON 파일에서 설정을 읽습니다. 누락된 키는 기본값을 사용합니다.
    pub fn from_json_file(path: &Path) -> GnxResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn invalid_var(key: &str, value: &str) -> GnxError {
    GnxError::InvalidArguments(format!("{key}={value:?} is not a valid setting"))
}
