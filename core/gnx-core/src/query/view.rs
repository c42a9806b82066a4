//! View — in-memory rows returned by queries
//!
//! A [`Row`] always knows its model. LINK fields keep their raw id in the value
//! vector; the joined parent (or, for virtual links, the joined children) is
//! only attached when a query asked for that relation.

use crate::error::{GnxError, GnxResult};
use crate::schema::{FieldType, ModelDef};
use crate::storage::codec::{coerce, default_value};
use crate::storage::value::{RecordId, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resolved relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Linked {
    /// Direct link: the parent, or `None` when absent or filtered out
    One(Option<Box<Row>>),
    /// Virtual link: matching children, already paged
    Many(Vec<Row>),
}

/// One record of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    def: Arc<ModelDef>,
    id: Option<RecordId>,
    values: Vec<Value>,
    links: BTreeMap<String, Linked>,
}

impl Row {
    /// New unsaved row with every field at its default.
    pub fn new(def: Arc<ModelDef>) -> Self {
        let values = def.stored_fields().map(|f| default_value(f.field_type)).collect();
        Self {
            def,
            id: None,
            values,
            links: BTreeMap::new(),
        }
    }

    /// New unsaved row from a full value vector.
    pub fn from_values(def: Arc<ModelDef>, values: Vec<Value>) -> GnxResult<Self> {
        if values.len() != def.column_count() {
            return Err(GnxError::Validation(format!(
                "model '{}' expects {} values, got {}",
                def.name,
                def.column_count(),
                values.len()
            )));
        }
        Ok(Self {
            def,
            id: None,
            values,
            links: BTreeMap::new(),
        })
    }

    pub(crate) fn loaded(def: Arc<ModelDef>, id: RecordId, values: Vec<Value>) -> Self {
        Self {
            def,
            id: Some(id),
            values,
            links: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> &Arc<ModelDef> {
        &self.def
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    /// `true` until the row has been saved.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, field: &str) -> GnxResult<&Value> {
        let (_, col) = self.def.stored_field(field)?;
        Ok(&self.values[col])
    }

    /// Assign a declared field. Undeclared fields are a validation error.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> GnxResult<()> {
        let (def, col) = self.def.stored_field(field)?;
        let value = coerce(def, value.into())?;
        if def.field_type == FieldType::Link {
            self.links.remove(field);
        }
        self.values[col] = value;
        Ok(())
    }

    /// Chainable [`set`](Self::set).
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> GnxResult<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Point the LINK field `field` at `parent`, which must already be saved.
    pub fn set_link(&mut self, field: &str, parent: &Row) -> GnxResult<()> {
        self.set(field, parent.as_link()?)
    }

    /// This row as a LINK value.
    pub fn as_link(&self) -> GnxResult<Value> {
        self.id.map(Value::link).ok_or_else(|| {
            GnxError::Validation(format!(
                "cannot link to an unsaved '{}' row",
                self.def.name
            ))
        })
    }

    /// Raw id stored in a LINK field.
    pub fn link_id(&self, field: &str) -> GnxResult<Option<RecordId>> {
        let (def, col) = self.def.stored_field(field)?;
        if def.field_type != FieldType::Link {
            return Err(GnxError::Validation(format!(
                "'{}.{}' is not a LINK field",
                self.def.name, field
            )));
        }
        Ok(self.values[col].as_link())
    }

    /// Joined parent of a direct link, if the query resolved it.
    pub fn link_object(&self, field: &str) -> Option<&Row> {
        match self.links.get(field) {
            Some(Linked::One(Some(row))) => Some(row),
            _ => None,
        }
    }

    /// Joined children of a virtual link (empty when not resolved).
    pub fn linked_many(&self, field: &str) -> &[Row] {
        match self.links.get(field) {
            Some(Linked::Many(rows)) => rows,
            _ => &[],
        }
    }

    /// Raw relation entry, distinguishing "not joined" from "joined, empty".
    pub fn linked(&self, field: &str) -> Option<&Linked> {
        self.links.get(field)
    }

    pub(crate) fn mark_saved(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    pub(crate) fn replace_values(&mut self, values: Vec<Value>) {
        self.values = values;
    }

    pub(crate) fn attach(&mut self, field: &str, linked: Linked) {
        self.links.insert(field.to_string(), linked);
    }
}

/// Result of [`Database::all`](crate::Database::all).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct View {
    rows: Vec<Row>,
    total: usize,
}

impl View {
    pub(crate) fn new(rows: Vec<Row>, total: usize) -> Self {
        Self { rows, total }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Matches before offset/limit were applied.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Ids of the rows, in result order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.rows.iter().filter_map(Row::id).collect()
    }
}

impl IntoIterator for View {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a View {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
