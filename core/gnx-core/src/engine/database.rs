//! Database struct definition — the core data structure

use crate::config::EngineConfig;
use crate::engine::model_store::ModelStore;
use crate::engine::parallel_engine::ParallelExecutionEngine;
use crate::error::{GnxError, GnxResult};
use crate::schema::{ModelDef, SchemaDef};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// sled 인덱스 디렉토리 이름
pub const INDEX_DIR: &str = "indexes";

/// GNX 데이터베이스 핸들
///
/// 하나의 스키마에 속한 모든 모델의 레코드 파일과 인덱스를 소유합니다.
/// [`SchemaManager`](crate::SchemaManager)의 `create`/`open`으로 얻습니다.
///
/// # 동시성
///
/// - 모델마다 `RwLock<ModelStore>` 하나: 변경은 write lock, 조회는 read lock
/// - 하나의 쿼리는 동시에 최대 하나의 모델 락만 보유
/// - `Database`는 `Send + Sync`이므로 `Arc<Database>`로 스레드 간 공유 가능
///
/// # 예제
///
/// ```rust
/// use gnx_core::{EngineConfig, ModelBuilder, SchemaManager, Value};
///
/// # fn main() -> gnx_core::GnxResult<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let manager = SchemaManager::new(EngineConfig::new().with_root(dir.path()));
/// let db = manager.create("app", [ModelBuilder::new("Note").string("text", 64)], false)?;
///
/// let id = db.add("Note", vec![Value::from("hello")])?;
/// assert_eq!(db.get("Note", id as i64)?, vec![Value::from("hello")]);
/// # Ok(())
/// # }
/// ```
pub struct Database {
    /// Schema name
    pub(crate) name: String,

    /// Schema directory (`<root>/<name>`)
    pub(crate) dir: PathBuf,

    /// Immutable model descriptors
    pub(crate) schema: Arc<SchemaDef>,

    pub(crate) config: EngineConfig,

    /// Per-model storage: model_name → RwLock<ModelStore>
    pub(crate) stores: AHashMap<String, RwLock<ModelStore>>,

    /// sled database holding every index tree of the schema
    pub(crate) index_db: sled::Db,

    /// Scan / aggregation worker pool
    pub(crate) parallel: ParallelExecutionEngine,
}

impl Database {
    /// Create empty model files for every model of `schema`.
    #[instrument(skip(schema, config))]
    pub(crate) fn create(
        dir: PathBuf,
        schema: Arc<SchemaDef>,
        config: &EngineConfig,
    ) -> GnxResult<Self> {
        Self::assemble(dir, schema, config, true)
    }

    /// Open existing model files of `schema`.
    #[instrument(skip(schema, config))]
    pub(crate) fn open(dir: PathBuf, schema: Arc<SchemaDef>, config: &EngineConfig) -> GnxResult<Self> {
        Self::assemble(dir, schema, config, false)
    }

    fn assemble(
        dir: PathBuf,
        schema: Arc<SchemaDef>,
        config: &EngineConfig,
        fresh: bool,
    ) -> GnxResult<Self> {
        let index_db = sled::open(dir.join(INDEX_DIR))?;

        let mut stores = AHashMap::with_capacity(schema.models.len());
        for def in &schema.models {
            let store = if fresh {
                ModelStore::create(&dir, Arc::clone(def), &index_db, config)?
            } else {
                ModelStore::open(&dir, Arc::clone(def), &index_db, config)?
            };
            debug!(model = %def.name, records = store.live_count(), "model ready");
            stores.insert(def.name.clone(), RwLock::new(store));
        }

        let parallel = ParallelExecutionEngine::new(config.parallelism, config.parallel_threshold)?;

        Ok(Self {
            name: schema.name.clone(),
            dir,
            schema,
            config: config.clone(),
            stores,
            index_db,
            parallel,
        })
    }

    /// Schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn schema(&self) -> &Arc<SchemaDef> {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Descriptor of a model.
    pub fn model(&self, name: &str) -> GnxResult<Arc<ModelDef>> {
        self.schema.model(name).map(Arc::clone)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.schema.models.iter().map(|m| m.name.as_str())
    }

    pub(crate) fn store(&self, model: &str) -> GnxResult<&RwLock<ModelStore>> {
        self.stores
            .get(model)
            .ok_or_else(|| GnxError::ModelNotFound(model.to_string()))
    }

    pub(crate) fn parallel(&self) -> &ParallelExecutionEngine {
        &self.parallel
    }

    /// 모든 레코드 파일과 인덱스를 디스크에 동기화합니다.
    pub fn flush(&self) -> GnxResult<()> {
        for store in self.stores.values() {
            store.read().flush()?;
        }
        self.index_db.flush()?;
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("flush on close of '{}' failed: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("models", &self.schema.models.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelBuilder;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_database_is_send_sync() {
        assert_send_sync::<Database>();
    }

    #[test]
    fn test_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let schema = Arc::new(
            SchemaDef::register("s", vec![ModelBuilder::new("A").int("x").build()]).unwrap(),
        );
        let db = Database::create(dir.path().to_path_buf(), schema, &EngineConfig::default())
            .unwrap();
        assert!(db.store("A").is_ok());
        assert!(matches!(db.store("B"), Err(GnxError::ModelNotFound(_))));
        assert_eq!(db.model_names().collect::<Vec<_>>(), vec!["A"]);
    }
}
