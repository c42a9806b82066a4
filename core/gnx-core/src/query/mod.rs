//! Query module — condition trees, the chainable [`Query`] builder and its
//! execution (filter, order, paging, links, aggregation, serialization)

pub mod aggregate;
pub mod builder;
pub mod condition;
pub(crate) mod evaluator;
pub(crate) mod executor;
pub(crate) mod link;
pub mod serializer;
pub mod view;

pub use aggregate::{AggRow, AggSpec, Reducer, count, max, min, sum};
pub use builder::{LinkKind, LinkSpec, Query};
pub use condition::{
    Condition, FieldHandle, FieldRef, Operand, Operator, OrderKey, every, field, pk, some,
};
pub use serializer::{Serializer, aggregate_to_json, value_to_json};
pub use view::{Linked, Row, View};
