//! ModelBuilder — typed declaration surface for model layouts
//!
//! ```rust
//! use gnx_core::ModelBuilder;
//!
//! let user = ModelBuilder::new("User")
//!     .string("first_name", 15).indexed()
//!     .int("age")
//!     .bool("is_admin")
//!     .datetime("created_at")
//!     .link("laboratory")
//!     .virtual_link("tasks", "owner")
//!     .build();
//! assert_eq!(user.fields.len(), 6);
//! ```

use crate::schema::types::{FieldLayout, FieldType, ModelLayout};

/// Builder producing a [`ModelLayout`].
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    layout: ModelLayout,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            layout: ModelLayout {
                name: name.into(),
                fields: Vec::new(),
                lazy_delete: false,
                pk_indexed: false,
            },
        }
    }

    /// Append an arbitrary field layout.
    pub fn field(mut self, field: FieldLayout) -> Self {
        self.layout.fields.push(field);
        self
    }

    fn push(self, name: impl Into<String>, field_type: FieldType, size: usize) -> Self {
        self.field(FieldLayout::new(name, field_type, size, false))
    }

    pub fn int(self, name: impl Into<String>) -> Self {
        self.push(name, FieldType::Int, 8)
    }

    /// STRING(n): 최대 `size` 바이트 UTF-8
    pub fn string(self, name: impl Into<String>, size: usize) -> Self {
        self.push(name, FieldType::String, size)
    }

    pub fn bool(self, name: impl Into<String>) -> Self {
        self.push(name, FieldType::Bool, 1)
    }

    pub fn datetime(self, name: impl Into<String>) -> Self {
        self.push(name, FieldType::DateTime, 8)
    }

    pub fn double(self, name: impl Into<String>) -> Self {
        self.push(name, FieldType::Double, 8)
    }

    pub fn link(self, name: impl Into<String>) -> Self {
        self.push(name, FieldType::Link, 8)
    }

    /// Inverse of the LINK field `reverse` declared on the child model.
    pub fn virtual_link(self, name: impl Into<String>, reverse: impl Into<String>) -> Self {
        self.field(FieldLayout::virtual_link(name, reverse))
    }

    /// Mark the most recently declared field as indexed.
    ///
    /// Validity (e.g. BOOL cannot be indexed) is checked at registration.
    pub fn indexed(mut self) -> Self {
        if let Some(last) = self.layout.fields.last_mut() {
            last.indexed = true;
        }
        self
    }

    /// Default delete mode for row-level deletes.
    pub fn lazy_delete(mut self, lazy: bool) -> Self {
        self.layout.lazy_delete = lazy;
        self
    }

    /// Maintain a B-tree over the primary key.
    pub fn pk_indexed(mut self, indexed: bool) -> Self {
        self.layout.pk_indexed = indexed;
        self
    }

    pub fn build(self) -> ModelLayout {
        self.layout
    }
}

impl From<ModelBuilder> for ModelLayout {
    fn from(builder: ModelBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ModelDef;

    #[test]
    fn test_indexed_marks_last_field() {
        let layout = ModelBuilder::new("City")
            .string("name", 32)
            .int("population")
            .indexed()
            .build();
        assert!(!layout.fields[0].indexed);
        assert!(layout.fields[1].indexed);
    }

    #[test]
    fn test_builder_registers() {
        let def = ModelDef::register(
            ModelBuilder::new("Task")
                .string("name", 20)
                .link("owner")
                .virtual_link("subtasks", "parent_task")
                .lazy_delete(true)
                .pk_indexed(true)
                .build(),
        )
        .unwrap();
        assert!(def.lazy_delete);
        assert!(def.pk_indexed);
        assert_eq!(def.record_size, 28);
        assert_eq!(def.field("subtasks").unwrap().reverse.as_deref(), Some("parent_task"));
    }

    #[test]
    fn test_indexed_bool_fails_on_register() {
        let layout = ModelBuilder::new("Flag").bool("on").indexed().build();
        assert!(ModelDef::register(layout).is_err());
    }
}
