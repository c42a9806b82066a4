//! Schema module — model declarations, registration and the persisted catalog

pub mod builder;
pub mod catalog;
pub mod types;

pub use builder::ModelBuilder;
pub use catalog::{SchemaDef, SchemaManager};
pub use types::{FieldDef, FieldLayout, FieldType, ModelDef, ModelLayout, PK_NAME};
