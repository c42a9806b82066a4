//! Model Store — record file + codec + indexes of one model
//!
//! Every mutation updates the record file and all of its index entries as one
//! step; if the second half fails the first half is undone before the error
//! is returned. Callers hold the model's write lock around every `&mut self`
//! method.

use crate::config::{DurabilityLevel, EngineConfig};
use crate::error::{GnxError, GnxResult};
use crate::schema::ModelDef;
use crate::storage::codec::RecordCodec;
use crate::storage::index::ModelIndexes;
use crate::storage::record_file::{RecordFile, SlotScan};
use crate::storage::value::{RecordId, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub struct ModelStore {
    codec: RecordCodec,
    file: RecordFile,
    indexes: ModelIndexes,
    index_db: sled::Db,
    durability: DurabilityLevel,
}

impl ModelStore {
    pub(crate) fn create(
        dir: &Path,
        def: Arc<ModelDef>,
        index_db: &sled::Db,
        config: &EngineConfig,
    ) -> GnxResult<Self> {
        let file = RecordFile::create(dir, &def.name, def.record_size, config.durability)?;
        let store = Self::assemble(def, file, index_db, config)?;
        // stale trees from an earlier schema of the same name
        store.indexes.rebuild(std::iter::empty::<(RecordId, Vec<Value>)>())?;
        Ok(store)
    }

    pub(crate) fn open(
        dir: &Path,
        def: Arc<ModelDef>,
        index_db: &sled::Db,
        config: &EngineConfig,
    ) -> GnxResult<Self> {
        let file = RecordFile::open(dir, &def.name, def.record_size, config.durability)?;
        let store = Self::assemble(def, file, index_db, config)?;

        if !store.indexes.is_empty() && store.indexes.entry_count() == 0 && store.file.live_count() > 0
        {
            warn!(model = %store.def().name, "index trees are empty, rebuilding from records");
            let rebuilt = store.rebuild_indexes()?;
            info!(model = %store.def().name, rebuilt, "indexes rebuilt");
        }
        Ok(store)
    }

    fn assemble(
        def: Arc<ModelDef>,
        file: RecordFile,
        index_db: &sled::Db,
        config: &EngineConfig,
    ) -> GnxResult<Self> {
        let indexes = ModelIndexes::open(index_db, &def)?;
        Ok(Self {
            codec: RecordCodec::new(def, config.string_overflow),
            file,
            indexes,
            index_db: index_db.clone(),
            durability: config.durability,
        })
    }

    pub fn def(&self) -> &Arc<ModelDef> {
        self.codec.def()
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    pub fn indexes(&self) -> &ModelIndexes {
        &self.indexes
    }

    pub fn next_id(&self) -> RecordId {
        self.file.next_id()
    }

    pub fn live_count(&self) -> usize {
        self.file.live_count()
    }

    pub fn is_live(&self, id: RecordId) -> bool {
        self.file.is_live(id)
    }

    /// Resolve a possibly negative index (`-1` = last assigned id).
    pub fn resolve_index(&self, index: i64) -> GnxResult<RecordId> {
        let resolved = if index < 0 {
            self.next_id() as i64 + index
        } else {
            index
        };
        if resolved < 0 {
            return Err(GnxError::not_found(&self.def().name, index));
        }
        Ok(resolved as RecordId)
    }

    fn not_found(&self, id: RecordId) -> GnxError {
        GnxError::not_found(&self.def().name, id as i64)
    }

    /// 파일 쓰기 실패 후 인덱스 되돌리기 결과를 합칩니다.
    /// 되돌리기까지 실패하면 인덱스와 레코드 파일이 어긋난 상태입니다.
    fn rolled_back(&self, id: RecordId, err: GnxError, undo: GnxResult<()>) -> GnxError {
        match undo {
            Ok(()) => err,
            Err(undo_err) => {
                warn!(
                    model = %self.def().name,
                    id,
                    error = %err,
                    rollback_error = %undo_err,
                    "index rollback failed"
                );
                GnxError::Corrupted(format!(
                    "index of '{}' no longer matches record {id}: write failed ({err}), rollback failed ({undo_err})",
                    self.def().name
                ))
            }
        }
    }

    fn sync_indexes(&self) -> GnxResult<()> {
        if self.durability == DurabilityLevel::Full {
            self.index_db.flush()?;
        }
        Ok(())
    }

    /// Normalize and encode without touching storage.
    pub(crate) fn prepare(&self, values: Vec<Value>) -> GnxResult<(Vec<Value>, Vec<u8>)> {
        let values = self.codec.normalize(values)?;
        let bytes = self.codec.encode(&values)?;
        Ok((values, bytes))
    }

    pub fn insert(&mut self, values: Vec<Value>) -> GnxResult<RecordId> {
        let (values, bytes) = self.prepare(values)?;
        self.insert_prepared(&values, &bytes)
    }

    pub(crate) fn insert_prepared(&mut self, values: &[Value], bytes: &[u8]) -> GnxResult<RecordId> {
        let id = self.file.next_id();
        self.indexes.update_on_insert(id, values)?;
        if let Err(err) = self.file.append(bytes) {
            let undo = self.indexes.update_on_delete(id, values);
            return Err(self.rolled_back(id, err, undo));
        }
        self.sync_indexes()?;
        trace!(model = %self.def().name, id, "record inserted");
        Ok(id)
    }

    pub fn read_raw(&self, id: RecordId) -> GnxResult<Option<Vec<u8>>> {
        self.file.read(id)
    }

    pub fn read(&self, id: RecordId) -> GnxResult<Vec<Value>> {
        let bytes = self.file.read(id)?.ok_or_else(|| self.not_found(id))?;
        self.codec.decode(&bytes)
    }

    pub fn replace(&mut self, id: RecordId, values: Vec<Value>) -> GnxResult<()> {
        let old = self.read(id)?;
        let (new, bytes) = self.prepare(values)?;
        self.indexes.update_on_change(id, &old, &new)?;
        if let Err(err) = self.file.write(id, &bytes) {
            let undo = self.indexes.update_on_change(id, &new, &old);
            return Err(self.rolled_back(id, err, undo));
        }
        self.sync_indexes()?;
        trace!(model = %self.def().name, id, "record updated");
        Ok(())
    }

    pub fn remove(&mut self, id: RecordId, lazy: bool) -> GnxResult<()> {
        let old = self.read(id)?;
        self.indexes.update_on_delete(id, &old)?;
        let result = if lazy {
            self.file.tombstone(id)
        } else {
            self.file.remove(id)
        };
        if let Err(err) = result {
            let undo = self.indexes.update_on_insert(id, &old);
            return Err(self.rolled_back(id, err, undo));
        }
        self.sync_indexes()?;
        trace!(model = %self.def().name, id, lazy, "record deleted");
        Ok(())
    }

    pub fn scan(&self) -> GnxResult<SlotScan> {
        self.file.scan()
    }

    pub fn vacuum(&mut self) -> GnxResult<usize> {
        self.file.vacuum()
    }

    pub fn rebuild_indexes(&self) -> GnxResult<usize> {
        let scan = self.file.scan()?;
        let rows = scan
            .iter()
            .map(|(id, bytes)| Ok((id, self.codec.decode(bytes)?)))
            .collect::<GnxResult<Vec<_>>>()?;
        let count = self.indexes.rebuild(rows)?;
        self.sync_indexes()?;
        debug!(model = %self.def().name, count, "index rebuild");
        Ok(count)
    }

    pub fn flush(&self) -> GnxResult<()> {
        self.file.flush()
    }
}
