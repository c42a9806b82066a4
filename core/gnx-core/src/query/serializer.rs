//! View Serializer — renders rows and views as `serde_json::Value`, or as
//! `;`-delimited CSV
//!
//! ```rust
//! use gnx_core::query::Serializer;
//!
//! // id, name, and the joined owner rendered with only its name
//! let s = Serializer::fields(["id", "name", "owner"])
//!     .nest("owner", Serializer::fields(["name"]));
//! assert!(s.nested("owner").is_some());
//! ```

use crate::error::GnxResult;
use crate::query::aggregate::AggRow;
use crate::query::view::{Linked, Row, View};
use crate::schema::{FieldType, PK_NAME};
use crate::storage::value::Value;
use serde_json::{Map, Number, Value as Json, json};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// CSV column delimiter.
pub const CSV_DELIMITER: u8 = b';';

/// Field selection plus per-link nested serializers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Serializer {
    /// `None` = id + every declared field
    fields: Option<Vec<String>>,
    nested: BTreeMap<String, Serializer>,
}

impl Serializer {
    /// `*`: the id followed by every declared field.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the listed fields, in this order. `"id"` selects the record id.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Some(fields.into_iter().map(Into::into).collect()),
            nested: BTreeMap::new(),
        }
    }

    /// Serializer used for a joined link field.
    pub fn nest(mut self, field: impl Into<String>, serializer: Serializer) -> Self {
        self.nested.insert(field.into(), serializer);
        self
    }

    pub fn nested(&self, field: &str) -> Option<&Serializer> {
        self.nested.get(field)
    }

    fn child(&self, field: &str) -> Serializer {
        self.nested.get(field).cloned().unwrap_or_default()
    }

    /// Render one row as a JSON object.
    pub fn row(&self, row: &Row) -> Json {
        let def = row.model();
        let mut out = Map::new();
        match &self.fields {
            None => {
                out.insert(PK_NAME.to_string(), id_json(row));
                for field in &def.fields {
                    out.insert(field.name.clone(), self.field(row, &field.name));
                }
            }
            Some(names) => {
                for name in names {
                    let value = if name == PK_NAME {
                        id_json(row)
                    } else {
                        self.field(row, name)
                    };
                    out.insert(name.clone(), value);
                }
            }
        }
        Json::Object(out)
    }

    fn field(&self, row: &Row, name: &str) -> Json {
        let Ok(field) = row.model().field(name) else {
            return Json::Null;
        };
        match field.field_type {
            FieldType::VirtualLink => match row.linked(name) {
                Some(Linked::Many(children)) => self.child(name).rows(children),
                _ => Json::Array(Vec::new()),
            },
            FieldType::Link => match row.linked(name) {
                Some(Linked::One(Some(parent))) => self.child(name).row(parent),
                _ => row.get(name).map(value_to_json).unwrap_or(Json::Null),
            },
            _ => row.get(name).map(value_to_json).unwrap_or(Json::Null),
        }
    }

    /// Render rows as a JSON array.
    pub fn rows(&self, rows: &[Row]) -> Json {
        Json::Array(rows.iter().map(|r| self.row(r)).collect())
    }

    /// Render a view as `{"total": n, "rows": [...]}`.
    pub fn view(&self, view: &View) -> Json {
        json!({
            "total": view.total(),
            "rows": self.rows(view.rows()),
        })
    }

    // ════════════════════════════════════════════
    // CSV export
    // ════════════════════════════════════════════

    /// 뷰의 행을 `;` 구분 CSV 파일로 기록합니다.
    ///
    /// 헤더는 첫 행의 열 이름이며, 조인된 링크는 JSON 텍스트로 들어갑니다.
    /// 행이 없으면 파일을 만들지 않고 0을 반환합니다.
    pub fn to_csv(&self, view: &View, path: impl AsRef<Path>) -> GnxResult<usize> {
        if view.is_empty() {
            return Ok(0);
        }
        let path = path.as_ref();
        let written = self.write_csv(view.rows(), std::fs::File::create(path)?)?;
        debug!(path = %path.display(), rows = written, "csv export");
        Ok(written)
    }

    /// Write `rows` as CSV to any writer; returns the number of data rows.
    pub fn write_csv<W: Write>(&self, rows: &[Row], out: W) -> GnxResult<usize> {
        let rendered: Vec<Json> = rows.iter().map(|r| self.row(r)).collect();
        let Some(Json::Object(first)) = rendered.first() else {
            return Ok(0);
        };
        let header: Vec<String> = first.keys().cloned().collect();

        let mut writer = csv::WriterBuilder::new()
            .delimiter(CSV_DELIMITER)
            .from_writer(out);
        writer.write_record(&header)?;
        for row in &rendered {
            writer.write_record(header.iter().map(|name| csv_cell(row.get(name))))?;
        }
        writer.flush()?;
        Ok(rendered.len())
    }
}

fn csv_cell(value: Option<&Json>) -> String {
    match value {
        None | Some(Json::Null) => String::new(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn id_json(row: &Row) -> Json {
    row.id().map_or(Json::Null, |id| json!(id))
}

/// Scalar value as JSON. DATETIME renders as RFC 3339 text, non-finite
/// doubles as null.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null | Value::Link(None) => Json::Null,
        Value::Int(v) => json!(v),
        Value::Double(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
        Value::Bool(v) => Json::Bool(*v),
        Value::DateTime(secs) => match value.as_datetime() {
            Some(dt) => Json::String(dt.to_rfc3339()),
            None => json!(secs),
        },
        Value::String(s) => Json::String(s.clone()),
        Value::Link(Some(id)) => json!(id),
    }
}

/// Aggregation rows as an array of objects (group field first).
pub fn aggregate_to_json(rows: &[AggRow]) -> Json {
    Json::Array(
        rows.iter()
            .map(|row| {
                let mut out = Map::new();
                if let Some((name, value)) = &row.group {
                    out.insert(name.clone(), value_to_json(value));
                }
                for (name, value) in &row.values {
                    out.insert(name.clone(), value_to_json(value));
                }
                Json::Object(out)
            })
            .collect(),
    )
}
