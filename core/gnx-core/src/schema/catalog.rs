//! Schema Catalog — named databases and their persisted model layouts
//!
//! 스키마 하나는 `<root>/<schema>/` 디렉토리 하나에 대응합니다:
//!
//! ```text
//! <root>/<schema>/
//!   catalog.json      모델/필드 레이아웃 (serde_json)
//!   <Model>.dat       레코드 슬롯
//!   <Model>.ix        id → 슬롯 오프셋 테이블
//!   indexes/          sled B-tree 인덱스
//! ```

use crate::config::EngineConfig;
use crate::engine::Database;
use crate::error::{GnxError, GnxResult};
use crate::schema::types::{FieldType, ModelDef, ModelLayout, validate_name};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Catalog file name inside a schema directory.
pub const CATALOG_FILE: &str = "catalog.json";

const CATALOG_FORMAT: u32 = 1;

/// Serialized catalog
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    format: u32,
    name: String,
    models: Vec<ModelDef>,
}

/// A registered schema: a name and its immutable model descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDef {
    pub name: String,
    pub models: Vec<Arc<ModelDef>>,
}

impl SchemaDef {
    /// Register every layout and check schema-wide consistency.
    pub fn register(name: &str, layouts: Vec<ModelLayout>) -> GnxResult<Self> {
        validate_name("schema", name)?;
        let mut models: Vec<Arc<ModelDef>> = Vec::with_capacity(layouts.len());
        for layout in layouts {
            // 대소문자만 다른 이름은 대소문자를 구분하지 않는 파일시스템에서 같은 파일이 됩니다
            if models.iter().any(|m| m.name.eq_ignore_ascii_case(&layout.name)) {
                return Err(GnxError::Validation(format!(
                    "model '{}' declared twice in schema '{name}'",
                    layout.name
                )));
            }
            models.push(ModelDef::register(layout)?);
        }

        // every virtual link must have a LINK field it can invert
        for model in &models {
            for field in model.fields.iter().filter(|f| f.is_virtual()) {
                let reverse = field.reverse.as_deref().unwrap_or_default();
                let found = models.iter().any(|m| {
                    m.fields
                        .iter()
                        .any(|f| f.name == reverse && f.field_type == FieldType::Link)
                });
                if !found {
                    return Err(GnxError::Validation(format!(
                        "virtual link '{}.{}' refers to LINK field '{reverse}', which no model declares",
                        model.name, field.name
                    )));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            models,
        })
    }

    pub fn model(&self, name: &str) -> GnxResult<&Arc<ModelDef>> {
        self.models
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| GnxError::ModelNotFound(name.to_string()))
    }

    fn write(&self, dir: &Path) -> GnxResult<()> {
        let file = CatalogFile {
            format: CATALOG_FORMAT,
            name: self.name.clone(),
            models: self.models.iter().map(|m| m.as_ref().clone()).collect(),
        };
        let tmp = dir.join(format!("{CATALOG_FILE}.tmp"));
        std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        std::fs::rename(&tmp, dir.join(CATALOG_FILE))?;
        Ok(())
    }

    fn read(dir: &Path) -> GnxResult<Self> {
        let raw = std::fs::read(dir.join(CATALOG_FILE))?;
        let file: CatalogFile = serde_json::from_slice(&raw)
            .map_err(|e| GnxError::Schema(format!("unreadable catalog in {}: {e}", dir.display())))?;
        if file.format != CATALOG_FORMAT {
            return Err(GnxError::Schema(format!(
                "catalog format {} is not supported",
                file.format
            )));
        }

        // Offsets are recomputed rather than trusted.
        let layouts = file.models.iter().map(ModelDef::layout).collect();
        let schema = Self::register(&file.name, layouts)?;
        for (stored, computed) in file.models.iter().zip(&schema.models) {
            if stored != computed.as_ref() {
                return Err(GnxError::Schema(format!(
                    "catalog entry for '{}' does not match its own layout",
                    stored.name
                )));
            }
        }
        Ok(schema)
    }
}

/// Schema lifecycle manager: exists / create / delete / open.
///
/// Loaded descriptors are memoized per schema name, so re-opening a schema
/// does not re-parse its catalog.
pub struct SchemaManager {
    config: EngineConfig,
    loaded: DashMap<String, Arc<SchemaDef>>,
}

impl SchemaManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loaded: DashMap::new(),
        }
    }

    /// `EngineConfig::default()` overridden by `GNX_*` environment variables.
    pub fn from_env() -> GnxResult<Self> {
        Ok(Self::new(EngineConfig::default().load_from_env()?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema_dir(&self, name: &str) -> PathBuf {
        self.config.root.join(name)
    }

    /// Memoized descriptor of a schema opened or created through this manager.
    pub fn descriptor(&self, name: &str) -> Option<Arc<SchemaDef>> {
        self.loaded.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.schema_dir(name).join(CATALOG_FILE).is_file()
    }

    /// 스키마를 생성합니다.
    ///
    /// # 인자
    ///
    /// * `name` - 스키마 이름 (디렉토리 이름으로 사용)
    /// * `models` - 모델 레이아웃 목록
    /// * `delete_old` - 이미 존재하면 삭제 후 재생성
    ///
    /// # 예제
    ///
    /// ```rust
    /// use gnx_core::{EngineConfig, ModelBuilder, SchemaManager};
    ///
    /// # fn main() -> gnx_core::GnxResult<()> {
    /// let dir = tempfile::tempdir().unwrap();
    /// let manager = SchemaManager::new(EngineConfig::new().with_root(dir.path()));
    /// let db = manager.create(
    ///     "shop",
    ///     [ModelBuilder::new("Item").string("name", 32).int("qty")],
    ///     false,
    /// )?;
    /// assert!(manager.exists("shop"));
    /// # drop(db);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, models))]
    pub fn create<I, L>(&self, name: &str, models: I, delete_old: bool) -> GnxResult<Database>
    where
        I: IntoIterator<Item = L>,
        L: Into<ModelLayout>,
    {
        let schema = Arc::new(SchemaDef::register(
            name,
            models.into_iter().map(Into::into).collect(),
        )?);

        let dir = self.schema_dir(name);
        if self.exists(name) {
            if !delete_old {
                return Err(GnxError::Schema(format!("schema '{name}' already exists")));
            }
            info!("Replacing existing schema '{}'", name);
            self.loaded.remove(name);
            std::fs::remove_dir_all(&dir)?;
        } else if dir.exists() {
            // leftovers of an interrupted create
            std::fs::remove_dir_all(&dir)?;
        }

        std::fs::create_dir_all(&dir)?;
        let db = Database::create(dir.clone(), Arc::clone(&schema), &self.config)?;
        // catalog last: a schema only "exists" once all of its files do
        schema.write(&dir)?;
        self.loaded.insert(name.to_string(), schema);

        info!("Created schema '{}' at {:?}", name, dir);
        Ok(db)
    }

    /// Remove a schema and all of its files.
    #[instrument(skip(self))]
    pub fn delete(&self, name: &str) -> GnxResult<()> {
        if !self.exists(name) {
            return Err(GnxError::Schema(format!("schema '{name}' does not exist")));
        }
        self.loaded.remove(name);
        std::fs::remove_dir_all(self.schema_dir(name))?;
        info!("Deleted schema '{}'", name);
        Ok(())
    }

    /// Open a schema from its persisted catalog.
    #[instrument(skip(self))]
    pub fn open(&self, name: &str) -> GnxResult<Database> {
        if !self.exists(name) {
            return Err(GnxError::Schema(format!("schema '{name}' does not exist")));
        }
        let dir = self.schema_dir(name);
        let schema = match self.descriptor(name) {
            Some(schema) => schema,
            None => {
                let schema = Arc::new(SchemaDef::read(&dir)?);
                self.loaded.insert(name.to_string(), Arc::clone(&schema));
                schema
            }
        };
        info!("Opening schema '{}' ({} models)", name, schema.models.len());
        Database::open(dir, schema, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelBuilder;

    fn manager(dir: &Path) -> SchemaManager {
        SchemaManager::new(EngineConfig::new().with_root(dir))
    }

    fn models() -> Vec<ModelLayout> {
        vec![
            ModelBuilder::new("User")
                .string("name", 10)
                .virtual_link("tasks", "owner")
                .build(),
            ModelBuilder::new("Task").string("title", 20).link("owner").build(),
        ]
    }

    #[test]
    fn test_create_exists_delete() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        assert!(!m.exists("s"));

        drop(m.create("s", models(), false).unwrap());
        assert!(m.exists("s"));
        assert!(m.descriptor("s").is_some());

        m.delete("s").unwrap();
        assert!(!m.exists("s"));
        assert!(m.descriptor("s").is_none());
    }

    #[test]
    fn test_create_twice_requires_delete_old() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        drop(m.create("s", models(), false).unwrap());

        let again = m.create("s", models(), false);
        assert!(matches!(again, Err(GnxError::Schema(_))));
        drop(m.create("s", models(), true).unwrap());
    }

    #[test]
    fn test_missing_schema_errors() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        assert!(matches!(m.delete("nope"), Err(GnxError::Schema(_))));
        assert!(matches!(m.open("nope"), Err(GnxError::Schema(_))));
    }

    #[test]
    fn test_catalog_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        drop(m.create("s", models(), false).unwrap());

        let read = SchemaDef::read(&m.schema_dir("s")).unwrap();
        assert_eq!(read, *m.descriptor("s").unwrap());
    }

    #[test]
    fn test_dangling_virtual_link_rejected() {
        let result = SchemaDef::register(
            "s",
            vec![ModelBuilder::new("User")
                .string("name", 10)
                .virtual_link("tasks", "owner")
                .build()],
        );
        assert!(matches!(result, Err(GnxError::Validation(_))));
    }

    #[test]
    fn test_unknown_model() {
        let schema = SchemaDef::register("s", models()).unwrap();
        assert!(matches!(schema.model("Nope"), Err(GnxError::ModelNotFound(_))));
    }

    #[test]
    fn test_case_only_duplicate_rejected() {
        let result = SchemaDef::register(
            "s",
            vec![
                ModelBuilder::new("Item").int("x").build(),
                ModelBuilder::new("item").int("y").build(),
            ],
        );
        assert!(matches!(result, Err(GnxError::Validation(_))));
    }
}
