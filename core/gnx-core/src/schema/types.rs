//! Schema types — field types, field definitions and model descriptors

use crate::error::{GnxError, GnxResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name reserved for the primary key in projections and serialized rows.
pub const PK_NAME: &str = "id";

/// Field type. The catalog stores it by its upper-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Int,
    String,
    Bool,
    DateTime,
    Link,
    Double,
    VirtualLink,
}

impl FieldType {
    /// Fixed width on disk. `None` for STRING, whose width is declared.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            FieldType::Int | FieldType::DateTime | FieldType::Link | FieldType::Double => Some(8),
            FieldType::Bool => Some(1),
            FieldType::VirtualLink => Some(0),
            FieldType::String => None,
        }
    }

    /// B-tree 인덱스를 만들 수 있는 타입인지 확인
    pub fn is_indexable(self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::String | FieldType::DateTime | FieldType::Double
        )
    }

    /// SUM/MIN/MAX 가능 여부
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Double | FieldType::DateTime | FieldType::Link
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Int => "INT",
            FieldType::String => "STRING",
            FieldType::Bool => "BOOL",
            FieldType::DateTime => "DATETIME",
            FieldType::Link => "LINK",
            FieldType::Double => "DOUBLE",
            FieldType::VirtualLink => "VIRTUAL_LINK",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ════════════════════════════════════════════
// Declared layout (input)
// ════════════════════════════════════════════

/// One declared field: `(name, type, byte size, indexed)`.
///
/// VIRTUAL_LINK fields carry the name of the LINK field on the child model
/// instead of a size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub name: String,
    pub field_type: FieldType,
    pub size: usize,
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<String>,
}

impl FieldLayout {
    pub fn new(name: impl Into<String>, field_type: FieldType, size: usize, indexed: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            size,
            indexed,
            reverse: None,
        }
    }

    pub fn virtual_link(name: impl Into<String>, reverse: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::VirtualLink,
            size: 0,
            indexed: false,
            reverse: Some(reverse.into()),
        }
    }
}

/// Declared model: name, ordered fields and per-model options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    #[serde(default)]
    pub lazy_delete: bool,
    #[serde(default)]
    pub pk_indexed: bool,
}

// ════════════════════════════════════════════
// Registered descriptors
// ════════════════════════════════════════════

/// Registered field: layout plus its computed position inside a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub size: usize,
    pub offset: usize,
    pub indexed: bool,
    /// Position in a record's value vector; `None` for virtual links
    pub column: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<String>,
}

impl FieldDef {
    pub fn is_stored(&self) -> bool {
        self.column.is_some()
    }

    pub fn is_virtual(&self) -> bool {
        self.field_type == FieldType::VirtualLink
    }
}

/// Immutable model descriptor shared as `Arc<ModelDef>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub record_size: usize,
    pub lazy_delete: bool,
    pub pk_indexed: bool,
}

impl ModelDef {
    /// 레이아웃을 검증하고 오프셋을 계산해 불변 디스크립터를 만듭니다.
    ///
    /// # 에러
    ///
    /// * 빈 이름, 중복 필드, 예약어 `id` 사용
    /// * STRING 크기 0, 고정 크기 타입의 잘못된 크기
    /// * BOOL / LINK / VIRTUAL_LINK 인덱스 요청
    /// * reverse 필드가 없는 VIRTUAL_LINK
    pub fn register(layout: ModelLayout) -> GnxResult<Arc<ModelDef>> {
        validate_name("model", &layout.name)?;
        if layout.fields.is_empty() {
            return Err(GnxError::Validation(format!(
                "model '{}' declares no fields",
                layout.name
            )));
        }

        let mut fields: Vec<FieldDef> = Vec::with_capacity(layout.fields.len());
        let mut offset = 0usize;
        let mut column = 0usize;

        for f in layout.fields {
            validate_name("field", &f.name)?;
            if f.name == PK_NAME {
                return Err(GnxError::Validation(format!(
                    "'{PK_NAME}' is reserved for the primary key of '{}'",
                    layout.name
                )));
            }
            if fields.iter().any(|existing| existing.name == f.name) {
                return Err(GnxError::Validation(format!(
                    "field '{}' declared twice on '{}'",
                    f.name, layout.name
                )));
            }

            let size = match f.field_type.fixed_size() {
                Some(width) if f.size == 0 || f.size == width => width,
                Some(width) => {
                    return Err(GnxError::Validation(format!(
                        "{} field '{}' has fixed size {width}, got {}",
                        f.field_type, f.name, f.size
                    )));
                }
                None if f.size == 0 => {
                    return Err(GnxError::Validation(format!(
                        "STRING field '{}' needs a size greater than 0",
                        f.name
                    )));
                }
                None => f.size,
            };

            if f.indexed && !f.field_type.is_indexable() {
                return Err(GnxError::Validation(format!(
                    "{} field '{}' cannot be indexed",
                    f.field_type, f.name
                )));
            }

            let is_virtual = f.field_type == FieldType::VirtualLink;
            let reverse = if is_virtual {
                match f.reverse {
                    Some(r) if !r.is_empty() => Some(r),
                    _ => {
                        return Err(GnxError::Validation(format!(
                            "virtual link '{}' must name its reverse LINK field",
                            f.name
                        )));
                    }
                }
            } else {
                None
            };

            fields.push(FieldDef {
                name: f.name,
                field_type: f.field_type,
                size,
                offset,
                indexed: f.indexed,
                column: (!is_virtual).then_some(column),
                reverse,
            });
            if !is_virtual {
                offset += size;
                column += 1;
            }
        }

        if column == 0 {
            return Err(GnxError::Validation(format!(
                "model '{}' has no stored fields",
                layout.name
            )));
        }

        Ok(Arc::new(ModelDef {
            name: layout.name,
            fields,
            record_size: offset,
            lazy_delete: layout.lazy_delete,
            pk_indexed: layout.pk_indexed,
        }))
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> GnxResult<&FieldDef> {
        self.fields.iter().find(|f| f.name == name).ok_or_else(|| {
            GnxError::Validation(format!("model '{}' has no field '{}'", self.name, name))
        })
    }

    /// Look up a stored (non-virtual) field, returning it with its column.
    pub fn stored_field(&self, name: &str) -> GnxResult<(&FieldDef, usize)> {
        let field = self.field(name)?;
        match field.column {
            Some(col) => Ok((field, col)),
            None => Err(GnxError::Validation(format!(
                "'{}.{}' is a virtual link and holds no value",
                self.name, name
            ))),
        }
    }

    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_stored())
    }

    /// Number of values in a record.
    pub fn column_count(&self) -> usize {
        self.stored_fields().count()
    }

    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.indexed)
    }

    /// Back to the declaration form, used when re-creating a schema.
    pub fn layout(&self) -> ModelLayout {
        ModelLayout {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldLayout {
                    name: f.name.clone(),
                    field_type: f.field_type,
                    size: f.size,
                    indexed: f.indexed,
                    reverse: f.reverse.clone(),
                })
                .collect(),
            lazy_delete: self.lazy_delete,
            pk_indexed: self.pk_indexed,
        }
    }
}

/// Names end up in file names and sled tree names.
pub(crate) fn validate_name(kind: &str, name: &str) -> GnxResult<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(GnxError::Validation(format!(
            "invalid {kind} name {name:?}: use ASCII letters, digits, '_' or '-'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_layout() -> ModelLayout {
        ModelLayout {
            name: "User".into(),
            fields: vec![
                FieldLayout::new("name", FieldType::String, 15, true),
                FieldLayout::new("age", FieldType::Int, 0, false),
                FieldLayout::virtual_link("tasks", "owner"),
                FieldLayout::new("is_admin", FieldType::Bool, 0, false),
            ],
            lazy_delete: false,
            pk_indexed: false,
        }
    }

    #[test]
    fn test_offsets_skip_virtual_links() {
        let def = ModelDef::register(user_layout()).unwrap();
        assert_eq!(def.record_size, 15 + 8 + 1);

        let is_admin = def.field("is_admin").unwrap();
        assert_eq!(is_admin.offset, 23);
        assert_eq!(is_admin.column, Some(2));

        let tasks = def.field("tasks").unwrap();
        assert_eq!(tasks.column, None);
        assert_eq!(tasks.size, 0);
        assert_eq!(def.column_count(), 3);
    }

    #[test]
    fn test_rejects_bool_index() {
        let mut layout = user_layout();
        layout.fields[3].indexed = true;
        assert!(matches!(
            ModelDef::register(layout),
            Err(GnxError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_link_index() {
        let mut layout = user_layout();
        layout
            .fields
            .push(FieldLayout::new("lab", FieldType::Link, 0, true));
        assert!(ModelDef::register(layout).is_err());
    }

    #[test]
    fn test_rejects_zero_string() {
        let mut layout = user_layout();
        layout.fields[0].size = 0;
        assert!(ModelDef::register(layout).is_err());
    }

    #[test]
    fn test_rejects_reserved_and_duplicate_names() {
        let mut layout = user_layout();
        layout.fields.push(FieldLayout::new("id", FieldType::Int, 0, false));
        assert!(ModelDef::register(layout).is_err());

        let mut layout = user_layout();
        layout.fields.push(FieldLayout::new("age", FieldType::Int, 0, false));
        assert!(ModelDef::register(layout).is_err());
    }

    #[test]
    fn test_unknown_field_is_validation_error() {
        let def = ModelDef::register(user_layout()).unwrap();
        assert!(matches!(def.field("email"), Err(GnxError::Validation(_))));
        assert!(def.stored_field("tasks").is_err());
    }
}
