//! B-tree Index — one sled tree per indexed field
//!
//! Keys are `order-preserving value encoding ++ big-endian id`, so a prefix
//! scan answers EQUAL and a key range answers BETWEEN. Duplicate values are
//! naturally supported because the id makes every key unique.
//!
//! | Type | Key encoding |
//! |---|---|
//! | INT / DATETIME / PK | i64 with flipped sign bit, big-endian |
//! | DOUBLE | IEEE bits, negatives inverted, positives with sign bit set |
//! | STRING(n) | raw bytes NUL padded to n |

use crate::error::{GnxError, GnxResult};
use crate::schema::{FieldDef, FieldType, ModelDef};
use crate::storage::value::{RecordId, Value};
use smallvec::SmallVec;
use std::ops::Bound;

const ID_LEN: usize = 8;
const ID_MAX: [u8; ID_LEN] = [0xFF; ID_LEN];

/// Which column an index lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexColumn<'a> {
    Pk,
    Field(&'a str),
}

/// sled tree name of a field index.
pub fn tree_name(model: &str, column: IndexColumn<'_>) -> String {
    match column {
        IndexColumn::Pk => format!("{model}.#pk"),
        IndexColumn::Field(field) => format!("{model}.{field}"),
    }
}

/// Order-preserving encoding. The flag reports that a STRING operand was
/// longer than the field and had to be cut to fit.
fn encode_value(field_type: FieldType, size: usize, value: &Value) -> GnxResult<(Vec<u8>, bool)> {
    let unsupported = || {
        GnxError::Validation(format!(
            "{} value cannot be used as a {} index key",
            value.type_name(),
            field_type
        ))
    };
    match field_type {
        FieldType::Int | FieldType::DateTime => {
            let v = value.as_int().ok_or_else(unsupported)?;
            Ok((((v as u64) ^ (1 << 63)).to_be_bytes().to_vec(), false))
        }
        FieldType::Double => {
            let v = value.as_f64().ok_or_else(unsupported)?;
            let v = if v == 0.0 { 0.0 } else { v };
            let bits = v.to_bits();
            let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
            Ok((ordered.to_be_bytes().to_vec(), false))
        }
        FieldType::String => {
            let s = value.as_str().ok_or_else(unsupported)?.as_bytes();
            let truncated = s.len() > size;
            let mut key = s[..s.len().min(size)].to_vec();
            key.resize(size, 0);
            Ok((key, truncated))
        }
        other => Err(GnxError::Validation(format!("{other} fields are not indexable"))),
    }
}

fn with_id(mut key: Vec<u8>, id: RecordId) -> Vec<u8> {
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn with_max_id(mut key: Vec<u8>) -> Vec<u8> {
    key.extend_from_slice(&ID_MAX);
    key
}

fn id_of(key: &[u8]) -> GnxResult<RecordId> {
    if key.len() < ID_LEN {
        return Err(GnxError::Corrupted("index key shorter than an id".to_string()));
    }
    let mut raw = [0u8; ID_LEN];
    raw.copy_from_slice(&key[key.len() - ID_LEN..]);
    Ok(RecordId::from_be_bytes(raw))
}

/// Index of one column (a stored field or the primary key).
struct ColumnIndex {
    name: Option<String>,
    field_type: FieldType,
    size: usize,
    column: Option<usize>,
    tree: sled::Tree,
}

impl ColumnIndex {
    fn key(&self, value: &Value) -> GnxResult<(Vec<u8>, bool)> {
        encode_value(self.field_type, self.size, value)
    }

    fn value_of<'v>(&self, id: RecordId, values: &'v [Value], pk: &'v mut Value) -> &'v Value {
        match self.column {
            Some(col) => &values[col],
            None => {
                *pk = Value::Int(id as i64);
                pk
            }
        }
    }
}

/// All indexes of one model.
pub struct ModelIndexes {
    model: String,
    columns: SmallVec<[ColumnIndex; 4]>,
}

impl ModelIndexes {
    /// Open (or create) the trees for every indexed column of `def`.
    pub fn open(db: &sled::Db, def: &ModelDef) -> GnxResult<Self> {
        let mut columns = SmallVec::new();
        if def.pk_indexed {
            columns.push(ColumnIndex {
                name: None,
                field_type: FieldType::Int,
                size: 8,
                column: None,
                tree: db.open_tree(tree_name(&def.name, IndexColumn::Pk))?,
            });
        }
        for field in def.indexed_fields() {
            columns.push(Self::field_index(db, &def.name, field)?);
        }
        Ok(Self {
            model: def.name.clone(),
            columns,
        })
    }

    fn field_index(db: &sled::Db, model: &str, field: &FieldDef) -> GnxResult<ColumnIndex> {
        Ok(ColumnIndex {
            name: Some(field.name.clone()),
            field_type: field.field_type,
            size: field.size,
            column: field.column,
            tree: db.open_tree(tree_name(model, IndexColumn::Field(&field.name)))?,
        })
    }

    fn find(&self, column: IndexColumn<'_>) -> Option<&ColumnIndex> {
        self.columns.iter().find(|c| match column {
            IndexColumn::Pk => c.name.is_none(),
            IndexColumn::Field(name) => c.name.as_deref() == Some(name),
        })
    }

    fn require(&self, column: IndexColumn<'_>) -> GnxResult<&ColumnIndex> {
        self.find(column).ok_or_else(|| {
            GnxError::Validation(format!(
                "no index on {}",
                tree_name(&self.model, column)
            ))
        })
    }

    pub fn has_index(&self, column: IndexColumn<'_>) -> bool {
        self.find(column).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Total entries across every tree (used to detect a missing index dir).
    pub fn entry_count(&self) -> usize {
        self.columns.iter().map(|c| c.tree.len()).sum()
    }

    /// Add the keys of a freshly inserted record.
    pub fn update_on_insert(&self, id: RecordId, values: &[Value]) -> GnxResult<()> {
        let mut pk = Value::Null;
        for col in &self.columns {
            let (key, _) = col.key(col.value_of(id, values, &mut pk))?;
            col.tree.insert(with_id(key, id), Vec::<u8>::new())?;
        }
        Ok(())
    }

    /// Remove the keys of a deleted record.
    pub fn update_on_delete(&self, id: RecordId, values: &[Value]) -> GnxResult<()> {
        let mut pk = Value::Null;
        for col in &self.columns {
            let (key, _) = col.key(col.value_of(id, values, &mut pk))?;
            col.tree.remove(with_id(key, id))?;
        }
        Ok(())
    }

    /// Re-key the columns whose value changed.
    pub fn update_on_change(&self, id: RecordId, old: &[Value], new: &[Value]) -> GnxResult<()> {
        for col in &self.columns {
            let Some(c) = col.column else { continue };
            if old[c] == new[c] {
                continue;
            }
            let (old_key, _) = col.key(&old[c])?;
            let (new_key, _) = col.key(&new[c])?;
            col.tree.remove(with_id(old_key, id))?;
            col.tree.insert(with_id(new_key, id), Vec::<u8>::new())?;
        }
        Ok(())
    }

    /// Ids whose column value equals `value`, ascending.
    pub fn lookup_eq(&self, column: IndexColumn<'_>, value: &Value) -> GnxResult<Vec<RecordId>> {
        let col = self.require(column)?;
        let (key, truncated) = col.key(value)?;
        if truncated {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in col.tree.scan_prefix(&key) {
            let (k, _) = entry?;
            ids.push(id_of(&k)?);
        }
        Ok(ids)
    }

    /// Ids whose column value lies within the bounds, in key order.
    pub fn lookup_range(
        &self,
        column: IndexColumn<'_>,
        lo: Bound<&Value>,
        hi: Bound<&Value>,
    ) -> GnxResult<Vec<RecordId>> {
        let col = self.require(column)?;

        // A cut string operand no longer equals any stored value, so the
        // inclusive/exclusive sense flips on the side where that matters.
        let start: Bound<Vec<u8>> = match lo {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(v) => match col.key(v)? {
                (k, false) => Bound::Included(k),
                (k, true) => Bound::Excluded(with_max_id(k)),
            },
            Bound::Excluded(v) => Bound::Excluded(with_max_id(col.key(v)?.0)),
        };
        let end: Bound<Vec<u8>> = match hi {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(v) => Bound::Included(with_max_id(col.key(v)?.0)),
            Bound::Excluded(v) => match col.key(v)? {
                (k, false) => Bound::Excluded(k),
                (k, true) => Bound::Included(with_max_id(k)),
            },
        };

        let empty = match (&start, &end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
                s >= e
            }
            _ => false,
        };
        if empty {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in col.tree.range((start, end)) {
            let (k, _) = entry?;
            ids.push(id_of(&k)?);
        }
        Ok(ids)
    }

    /// Drop every entry and re-insert from `rows`.
    pub fn rebuild<I>(&self, rows: I) -> GnxResult<usize>
    where
        I: IntoIterator<Item = (RecordId, Vec<Value>)>,
    {
        for col in &self.columns {
            col.tree.clear()?;
        }
        let mut count = 0;
        for (id, values) in rows {
            self.update_on_insert(id, &values)?;
            count += 1;
        }
        Ok(count)
    }
}
