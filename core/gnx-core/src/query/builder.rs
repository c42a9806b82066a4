//! Query Builder — chainable filter / order / paging / link / agg / pick
//!
//! ```rust
//! use gnx_core::query::{field, pk, Query};
//!
//! let q = Query::new("User")
//!     .filter(field("age").greater(30))
//!     .order([field("last_name").asc(), pk().desc()])
//!     .offset(10)
//!     .limit(5)
//!     .link("tasks", Query::new("Task").limit(3));
//! assert_eq!(q.window(), (10, 5));
//! assert_eq!(q.links()[0].limit, 3);
//! ```

use crate::error::{GnxError, GnxResult};
use crate::query::aggregate::AggSpec;
use crate::query::condition::{Condition, FieldRef, OrderKey};
use crate::schema::{FieldType, ModelDef};

/// Declarative query against one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub(crate) model: String,
    pub(crate) filter: Condition,
    pub(crate) order: Vec<OrderKey>,
    /// 0 = unlimited
    pub(crate) limit: usize,
    pub(crate) offset: usize,
    pub(crate) links: Vec<LinkSpec>,
    pub(crate) agg: Option<AggSpec>,
    pub(crate) pick: Option<FieldRef>,
}

impl Query {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            filter: Condition::always(),
            order: Vec::new(),
            limit: 0,
            offset: 0,
            links: Vec::new(),
            agg: None,
            pick: None,
        }
    }

    /// Add a condition. Repeated calls are AND-combined.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(condition);
        self
    }

    /// Append sort keys; earlier keys take precedence.
    pub fn order<K: Into<OrderKey>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.order.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Append a single sort key.
    pub fn order_by(self, key: impl Into<OrderKey>) -> Self {
        self.order([key.into()])
    }

    /// Maximum number of rows; 0 means unlimited.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    /// Join the relation `field` using `sub` as the related model's query.
    ///
    /// `sub`'s limit/offset move onto the link, where they apply per parent.
    pub fn link(mut self, field: impl Into<String>, sub: Query) -> Self {
        self.links.push(LinkSpec::new(field, sub));
        self
    }

    pub fn agg(mut self, spec: AggSpec) -> Self {
        self.agg = Some(spec);
        self
    }

    /// Project a single field (or the PK) instead of whole rows.
    pub fn pick(mut self, field: impl Into<FieldRef>) -> Self {
        self.pick = Some(field.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn condition(&self) -> &Condition {
        &self.filter
    }

    pub fn order_keys(&self) -> &[OrderKey] {
        &self.order
    }

    /// `(offset, limit)`
    pub fn window(&self) -> (usize, usize) {
        (self.offset, self.limit)
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    pub fn agg_spec(&self) -> Option<&AggSpec> {
        self.agg.as_ref()
    }

    pub fn picked(&self) -> Option<&FieldRef> {
        self.pick.as_ref()
    }
}

/// How a link field is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// The LINK value on this row names one parent
    Direct,
    /// Children whose `reverse` LINK field points at this row
    Virtual { reverse: String },
}

/// One requested relation.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub field: String,
    /// Related model query (filter, order and nested links)
    pub query: Query,
    /// Per-parent limit, 0 = unlimited
    pub limit: usize,
    /// Per-parent offset
    pub offset: usize,
}

impl LinkSpec {
    pub fn new(field: impl Into<String>, mut query: Query) -> Self {
        let limit = std::mem::take(&mut query.limit);
        let offset = std::mem::take(&mut query.offset);
        Self {
            field: field.into(),
            query,
            limit,
            offset,
        }
    }

    /// Derive direct vs virtual from the source field's declared type.
    pub fn kind(&self, def: &ModelDef) -> GnxResult<LinkKind> {
        let field = def.field(&self.field)?;
        match field.field_type {
            FieldType::Link => Ok(LinkKind::Direct),
            FieldType::VirtualLink => Ok(LinkKind::Virtual {
                reverse: field.reverse.clone().unwrap_or_default(),
            }),
            other => Err(GnxError::Validation(format!(
                "'{}.{}' is a {other} field and cannot be linked",
                def.name, self.field
            ))),
        }
    }
}
