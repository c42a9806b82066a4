//! Database CRUD Operations — add, get, update, delete and their bulk/row forms

use crate::engine::Database;
use crate::error::GnxResult;
use crate::query::view::Row;
use crate::storage::value::{RecordId, Value};
use tracing::{debug, instrument};

impl Database {
    // ════════════════════════════════════════════
    // Single-record operations
    // ════════════════════════════════════════════

    /// 레코드를 추가하고 새 id를 반환합니다.
    ///
    /// # 인자
    ///
    /// * `model` - 모델 이름
    /// * `values` - 저장 필드 순서대로의 값 (가상 링크 제외)
    ///
    /// id는 0부터 순서대로 할당되며 삭제 후에도 재사용되지 않습니다.
    #[instrument(skip(self, values))]
    pub fn add(&self, model: &str, values: Vec<Value>) -> GnxResult<RecordId> {
        self.store(model)?.write().insert(values)
    }

    /// 레코드를 조회합니다.
    ///
    /// 음수 인덱스는 끝에서부터 셉니다 (`-1` = 마지막으로 할당된 id).
    pub fn get(&self, model: &str, index: i64) -> GnxResult<Vec<Value>> {
        let store = self.store(model)?.read();
        let id = store.resolve_index(index)?;
        store.read(id)
    }

    /// Row form of [`get`](Self::get).
    pub fn get_row(&self, model: &str, index: i64) -> GnxResult<Row> {
        let store = self.store(model)?.read();
        let id = store.resolve_index(index)?;
        let values = store.read(id)?;
        Ok(Row::loaded(std::sync::Arc::clone(store.def()), id, values))
    }

    /// Overwrite every field of a live record. The id is unchanged.
    #[instrument(skip(self, values))]
    pub fn update(&self, model: &str, id: RecordId, values: Vec<Value>) -> GnxResult<()> {
        self.store(model)?.write().replace(id, values)
    }

    /// Delete a record.
    ///
    /// `lazy = true` tombstones the slot (reclaimed by [`vacuum`](Self::vacuum));
    /// `lazy = false` frees the slot immediately. Either way the id is retired.
    #[instrument(skip(self))]
    pub fn delete(&self, model: &str, id: RecordId, lazy: bool) -> GnxResult<()> {
        self.store(model)?.write().remove(id, lazy)
    }

    // ════════════════════════════════════════════
    // Bulk operations
    // ════════════════════════════════════════════

    /// Insert many records under one lock. All rows are validated before the
    /// first one is written.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub fn bulk_create(&self, model: &str, rows: Vec<Vec<Value>>) -> GnxResult<Vec<RecordId>> {
        let mut store = self.store(model)?.write();
        let prepared = rows
            .into_iter()
            .map(|values| store.prepare(values))
            .collect::<GnxResult<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(prepared.len());
        for (values, bytes) in &prepared {
            ids.push(store.insert_prepared(values, bytes)?);
        }
        debug!(model, count = ids.len(), "bulk insert");
        Ok(ids)
    }

    /// Delete many records under one lock. Every id must be live.
    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    pub fn bulk_delete(&self, model: &str, ids: &[RecordId], lazy: bool) -> GnxResult<()> {
        let mut store = self.store(model)?.write();
        if let Some(&missing) = ids.iter().find(|&&id| !store.is_live(id)) {
            return Err(crate::GnxError::not_found(model, missing as i64));
        }
        for &id in ids {
            // duplicates in `ids` were deleted by an earlier iteration
            if store.is_live(id) {
                store.remove(id, lazy)?;
            }
        }
        Ok(())
    }

    // ════════════════════════════════════════════
    // Row-level operations
    // ════════════════════════════════════════════

    /// Insert a new row or update a saved one. Returns the row's id.
    pub fn save(&self, row: &mut Row) -> GnxResult<RecordId> {
        let model = row.model().name.clone();
        let mut store = self.store(&model)?.write();
        let (values, bytes) = store.prepare(row.values().to_vec())?;
        let id = match row.id() {
            Some(id) => {
                store.replace(id, values.clone())?;
                id
            }
            None => store.insert_prepared(&values, &bytes)?,
        };
        row.replace_values(values);
        row.mark_saved(id);
        Ok(id)
    }

    /// Delete a saved row using its model's default delete mode.
    pub fn delete_row(&self, row: &Row) -> GnxResult<()> {
        let def = row.model();
        let id = row.id().ok_or_else(|| {
            crate::GnxError::Validation(format!("cannot delete an unsaved '{}' row", def.name))
        })?;
        self.delete(&def.name, id, def.lazy_delete)
    }

    // ════════════════════════════════════════════
    // Maintenance
    // ════════════════════════════════════════════

    /// Number of live records of a model.
    pub fn record_count(&self, model: &str) -> GnxResult<usize> {
        Ok(self.store(model)?.read().live_count())
    }

    /// Reclaim the slots of lazily deleted records. Returns reclaimed slots.
    #[instrument(skip(self))]
    pub fn vacuum(&self, model: &str) -> GnxResult<usize> {
        self.store(model)?.write().vacuum()
    }
}
