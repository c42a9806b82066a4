//! Link Resolver — joins direct and virtual links onto query results
//!
//! Resolution is batched per level: a direct link reads each distinct parent
//! once, a virtual link runs a single child query for every parent of the
//! level. Nested links of the sub-query are resolved on the joined rows.
//! Link graphs must be acyclic; no cycle detection is done.

use crate::engine::Database;
use crate::error::{GnxError, GnxResult};
use crate::query::builder::{LinkKind, LinkSpec};
use crate::query::condition::field;
use crate::query::evaluator::Compiled;
use crate::query::executor::window;
use crate::query::view::{Linked, Row};
use crate::schema::{FieldType, ModelDef};
use crate::storage::value::{RecordId, Value};
use ahash::AHashMap;
use std::sync::Arc;
use tracing::debug;

/// Attach every requested relation to `rows`.
pub(crate) fn resolve(
    db: &Database,
    def: &ModelDef,
    rows: &mut [Row],
    links: &[LinkSpec],
) -> GnxResult<()> {
    for spec in links {
        match spec.kind(def)? {
            LinkKind::Direct => resolve_direct(db, rows, spec)?,
            LinkKind::Virtual { reverse } => resolve_virtual(db, rows, spec, &reverse)?,
        }
    }
    Ok(())
}

/// Live parents among `ids` that satisfy `spec`'s filter.
fn fetch_parents(db: &Database, spec: &LinkSpec, ids: &[RecordId]) -> GnxResult<(Arc<ModelDef>, Vec<Row>)> {
    let store = db.store(&spec.query.model)?.read();
    let def = Arc::clone(store.def());
    let compiled = Compiled::compile(&def, &spec.query.filter)?;
    let codec = store.codec();

    let mut parents = Vec::with_capacity(ids.len());
    for &id in ids {
        let Some(bytes) = store.read_raw(id)? else { continue };
        if compiled.matches(codec, id, &bytes)? {
            parents.push(Row::loaded(Arc::clone(&def), id, codec.decode(&bytes)?));
        }
    }
    Ok((def, parents))
}

fn resolve_direct(db: &Database, rows: &mut [Row], spec: &LinkSpec) -> GnxResult<()> {
    let mut wanted = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        wanted.extend(row.link_id(&spec.field)?);
    }
    wanted.sort_unstable();
    wanted.dedup();

    let (parent_def, mut parents) = fetch_parents(db, spec, &wanted)?;
    resolve(db, &parent_def, &mut parents, &spec.query.links)?;
    debug!(
        field = %spec.field,
        requested = wanted.len(),
        found = parents.len(),
        "direct link resolved"
    );

    let by_id: AHashMap<RecordId, Row> = parents
        .into_iter()
        .filter_map(|p| Some((p.id()?, p)))
        .collect();
    for row in rows.iter_mut() {
        let parent = row
            .link_id(&spec.field)?
            .and_then(|id| by_id.get(&id))
            .cloned()
            .map(Box::new);
        row.attach(&spec.field, Linked::One(parent));
    }
    Ok(())
}

fn resolve_virtual(db: &Database, rows: &mut [Row], spec: &LinkSpec, reverse: &str) -> GnxResult<()> {
    let child_def = db.model(&spec.query.model)?;
    let fk = child_def.field(reverse)?;
    if fk.field_type != FieldType::Link {
        return Err(GnxError::Validation(format!(
            "'{}.{}' must be a LINK field to back the virtual link '{}'",
            child_def.name, reverse, spec.field
        )));
    }

    let parent_ids: Vec<RecordId> = rows.iter().filter_map(Row::id).collect();
    let mut grouped: AHashMap<RecordId, Vec<Row>> = AHashMap::new();
    if !parent_ids.is_empty() {
        let filter = spec
            .query
            .filter
            .clone()
            .and(field(reverse).is_in(parent_ids.iter().map(|&id| Value::link(id))));
        let children = db.select_rows(&spec.query.model, &filter, &spec.query.order)?;
        debug!(
            field = %spec.field,
            parents = parent_ids.len(),
            children = children.len(),
            "virtual link resolved"
        );
        for child in children {
            if let Some(owner) = child.link_id(reverse)? {
                grouped.entry(owner).or_default().push(child);
            }
        }
    }

    // per-parent window, then nested links over the kept children in one batch
    let mut owners = Vec::new();
    let mut kept = Vec::new();
    for id in &parent_ids {
        if let Some(children) = grouped.remove(id) {
            for child in window(children, spec.offset, spec.limit) {
                owners.push(*id);
                kept.push(child);
            }
        }
    }
    resolve(db, &child_def, &mut kept, &spec.query.links)?;

    let mut by_owner: AHashMap<RecordId, Vec<Row>> = AHashMap::new();
    for (owner, child) in owners.into_iter().zip(kept) {
        by_owner.entry(owner).or_default().push(child);
    }
    for row in rows.iter_mut() {
        let children = row
            .id()
            .and_then(|id| by_owner.remove(&id))
            .unwrap_or_default();
        row.attach(&spec.field, Linked::Many(children));
    }
    Ok(())
}
