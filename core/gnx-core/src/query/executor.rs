//! Query Executor — runs a [`Query`] against a [`Database`]
//!
//! 실행 순서: 필터 → 정렬 → offset/limit → 링크 해석 → (pick이면) 단일 필드 투영.
//! 한 쿼리는 한 번에 하나의 모델 락만 잡습니다. 링크 해석은 부모 쿼리의 락을
//! 놓은 뒤 대상 모델의 락을 따로 잡습니다.

use crate::engine::Database;
use crate::error::{GnxError, GnxResult};
use crate::query::aggregate::{self, AggRow};
use crate::query::builder::Query;
use crate::query::condition::{Condition, FieldRef, OrderKey};
use crate::query::evaluator::{Compiled, select};
use crate::query::link;
use crate::query::view::{Row, View};
use crate::schema::ModelDef;
use crate::storage::value::{RecordId, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy)]
enum SortColumn {
    Pk,
    Column(usize),
}

/// Stable multi-key sort; earlier keys win, each key has its own direction.
pub(crate) fn sort_rows(def: &ModelDef, rows: &mut [Row], order: &[OrderKey]) -> GnxResult<()> {
    let keys = order
        .iter()
        .map(|key| {
            let column = match &key.field {
                FieldRef::Pk => SortColumn::Pk,
                FieldRef::Field(name) => SortColumn::Column(def.stored_field(name)?.1),
            };
            Ok((column, key.descending))
        })
        .collect::<GnxResult<Vec<_>>>()?;
    if keys.is_empty() {
        return Ok(());
    }

    rows.sort_by(|a, b| {
        for &(column, descending) in &keys {
            let ord = match column {
                SortColumn::Pk => a.id().cmp(&b.id()),
                SortColumn::Column(i) => a.values()[i].sort_cmp(&b.values()[i]),
            };
            let ord = if descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Skip `offset`, then take `limit` (0 = everything left).
pub(crate) fn window<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let rest = items.into_iter().skip(offset);
    if limit == 0 {
        rest.collect()
    } else {
        rest.take(limit).collect()
    }
}

impl Database {
    /// Filter, decode and sort one model's records. The read lock is released
    /// before sorting.
    pub(crate) fn select_rows(
        &self,
        model: &str,
        filter: &Condition,
        order: &[OrderKey],
    ) -> GnxResult<Vec<Row>> {
        let store = self.store(model)?.read();
        let def = Arc::clone(store.def());
        let compiled = Compiled::compile(&def, filter)?;
        let records = select(&store, &compiled, self.parallel())?;
        let codec = store.codec();
        let decoded = self.parallel().map_chunks(&records, |chunk| {
            chunk
                .iter()
                .map(|(id, bytes)| Ok(Row::loaded(Arc::clone(&def), *id, codec.decode(bytes)?)))
                .collect::<GnxResult<Vec<_>>>()
        });
        drop(store);

        let mut rows = Vec::with_capacity(records.len());
        for chunk in decoded {
            rows.extend(chunk?);
        }
        sort_rows(&def, &mut rows, order)?;
        Ok(rows)
    }

    /// 쿼리에 맞는 행들을 반환합니다.
    ///
    /// [`View::total`]은 페이징 전 전체 매칭 수입니다.
    ///
    /// # 예제
    ///
    /// ```rust
    /// use gnx_core::query::{field, Query};
    /// use gnx_core::{EngineConfig, ModelBuilder, SchemaManager, Value};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let manager = SchemaManager::new(EngineConfig::new().with_root(dir.path()));
    /// let db = manager
    ///     .create("demo", [ModelBuilder::new("Item").int("price")], false)
    ///     .unwrap();
    /// for price in [30, 10, 20] {
    ///     db.add("Item", vec![Value::Int(price)]).unwrap();
    /// }
    ///
    /// let view = db
    ///     .all(&Query::new("Item").filter(field("price").greater(15)).order_by(field("price")))
    ///     .unwrap();
    /// assert_eq!(view.ids(), vec![2, 0]);
    /// assert_eq!(view.total(), 2);
    /// ```
    #[instrument(skip(self, query), fields(model = %query.model))]
    pub fn all(&self, query: &Query) -> GnxResult<View> {
        let def = self.model(&query.model)?;
        let rows = self.select_rows(&query.model, &query.filter, &query.order)?;
        let total = rows.len();
        let mut rows = window(rows, query.offset, query.limit);
        link::resolve(self, &def, &mut rows, &query.links)?;
        debug!(total, returned = rows.len(), "query executed");
        Ok(View::new(rows, total))
    }

    /// `limit(1)`: the first row, or `None`.
    pub fn first(&self, query: &Query) -> GnxResult<Option<Row>> {
        let view = self.all(&query.clone().limit(1))?;
        Ok(view.into_rows().into_iter().next())
    }

    /// Values of the picked field (or ids for the PK) in result order.
    #[instrument(skip(self, query), fields(model = %query.model))]
    pub fn pick(&self, query: &Query) -> GnxResult<Vec<Value>> {
        let picked = query.pick.as_ref().ok_or_else(|| {
            GnxError::Validation(format!(
                "query on '{}' has no picked field",
                query.model
            ))
        })?;
        let def = self.model(&query.model)?;
        let column = match picked {
            FieldRef::Pk => None,
            FieldRef::Field(name) => Some(def.stored_field(name)?.1),
        };

        let rows = self.select_rows(&query.model, &query.filter, &query.order)?;
        Ok(window(rows, query.offset, query.limit)
            .into_iter()
            .map(|row| match column {
                None => Value::Int(row.id().map_or(-1, |id| id as i64)),
                Some(i) => row.into_values().swap_remove(i),
            })
            .collect())
    }

    /// Number of records matching the filter. Paging is ignored.
    pub fn count(&self, query: &Query) -> GnxResult<usize> {
        let store = self.store(&query.model)?.read();
        let compiled = Compiled::compile(store.def(), &query.filter)?;
        if compiled.is_always() {
            return Ok(store.live_count());
        }
        Ok(select(&store, &compiled, self.parallel())?.len())
    }

    /// Run the query's [`AggSpec`](crate::query::AggSpec) over the filtered
    /// records. Order, offset and limit are not applied.
    #[instrument(skip(self, query), fields(model = %query.model))]
    pub fn aggregate(&self, query: &Query) -> GnxResult<Vec<AggRow>> {
        let spec = query.agg.as_ref().ok_or_else(|| {
            GnxError::Validation(format!(
                "query on '{}' has no aggregation",
                query.model
            ))
        })?;
        let store = self.store(&query.model)?.read();
        let compiled = Compiled::compile(store.def(), &query.filter)?;
        let records = select(&store, &compiled, self.parallel())?;
        let rows = aggregate::aggregate(store.codec(), spec, &records, self.parallel())?;
        debug!(input = records.len(), groups = rows.len(), "aggregated");
        Ok(rows)
    }

    /// Delete every record matching the filter under one write lock. Returns
    /// the number of deleted records.
    #[instrument(skip(self, query), fields(model = %query.model))]
    pub fn delete_where(&self, query: &Query, lazy: bool) -> GnxResult<usize> {
        let mut store = self.store(&query.model)?.write();
        let compiled = Compiled::compile(store.def(), &query.filter)?;
        let ids: Vec<RecordId> = select(&store, &compiled, self.parallel())?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for &id in &ids {
            store.remove(id, lazy)?;
        }
        debug!(deleted = ids.len(), lazy, "delete_where");
        Ok(ids.len())
    }
}
