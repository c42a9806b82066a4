//! Condition tree — leaf predicates combined with `every` (AND) / `some` (OR)
//!
//! ```rust
//! use gnx_core::query::{every, field, some};
//!
//! let cond = every([
//!     field("age").greater_or_equal(18),
//!     some([field("name").iregex("a.*"), field("is_admin").equals(true)]),
//! ]);
//! assert!(matches!(cond, gnx_core::query::Condition::And(_)));
//! ```

use crate::schema::PK_NAME;
use crate::storage::value::Value;
use serde::{Deserialize, Serialize};

/// Filter operator. The discriminant is the wire/catalog code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Operator {
    Equal = 0,
    NotEqual = 1,
    Greater = 2,
    GreaterOrEqual = 3,
    Less = 4,
    LessOrEqual = 5,
    Regex = 6,
    IRegex = 7,
    IsIn = 8,
    NotIn = 9,
    Between = 10,
}

impl Operator {
    /// Operators whose candidates can come straight from a B-tree lookup.
    pub fn supports_index(self) -> bool {
        matches!(self, Operator::Equal | Operator::IsIn | Operator::Between)
    }

    pub fn name(self) -> &'static str {
        match self {
            Operator::Equal => "EQUAL",
            Operator::NotEqual => "NOTEQUAL",
            Operator::Greater => "GREATER",
            Operator::GreaterOrEqual => "GREATER_OR_EQUAL",
            Operator::Less => "LESS",
            Operator::LessOrEqual => "LESS_OR_EQUAL",
            Operator::Regex => "REGEX",
            Operator::IRegex => "IREGEX",
            Operator::IsIn => "IS_IN",
            Operator::NotIn => "NOT_IN",
            Operator::Between => "BETWEEN",
        }
    }
}

/// Target of a leaf or a sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    Pk,
    Field(String),
}

impl FieldRef {
    pub fn name(&self) -> &str {
        match self {
            FieldRef::Pk => PK_NAME,
            FieldRef::Field(name) => name,
        }
    }
}

/// Right-hand side of a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(Value),
    List(Vec<Value>),
    Range(Value, Value),
    Pattern(String),
}

/// Recursive boolean filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Leaf {
        field: FieldRef,
        op: Operator,
        operand: Operand,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// Empty AND: matches every record.
    pub fn always() -> Self {
        Condition::And(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Condition::And(children) if children.is_empty())
    }

    /// AND-combine, flattening into an existing AND root.
    pub fn and(self, other: Condition) -> Condition {
        match (self, other) {
            (c, o) if c.is_always() => o,
            (c, o) if o.is_always() => c,
            (Condition::And(mut children), o) => {
                children.push(o);
                Condition::And(children)
            }
            (c, o) => Condition::And(vec![c, o]),
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::always()
    }
}

/// AND of every given condition.
pub fn every(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::And(conditions.into_iter().collect())
}

/// OR of the given conditions.
pub fn some(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::Or(conditions.into_iter().collect())
}

/// Sort key: a field (or the PK) and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub field: FieldRef,
    pub descending: bool,
}

/// Handle producing leaves and sort keys for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHandle(pub FieldRef);

/// Handle for a named field.
pub fn field(name: impl Into<String>) -> FieldHandle {
    FieldHandle(FieldRef::Field(name.into()))
}

/// Handle for the primary key.
pub fn pk() -> FieldHandle {
    FieldHandle(FieldRef::Pk)
}

impl FieldHandle {
    fn leaf(&self, op: Operator, operand: Operand) -> Condition {
        Condition::Leaf {
            field: self.0.clone(),
            op,
            operand,
        }
    }

    fn single(&self, op: Operator, value: impl Into<Value>) -> Condition {
        self.leaf(op, Operand::Single(value.into()))
    }

    pub fn equals(&self, value: impl Into<Value>) -> Condition {
        self.single(Operator::Equal, value)
    }

    pub fn is_not(&self, value: impl Into<Value>) -> Condition {
        self.single(Operator::NotEqual, value)
    }

    pub fn greater(&self, value: impl Into<Value>) -> Condition {
        self.single(Operator::Greater, value)
    }

    pub fn greater_or_equal(&self, value: impl Into<Value>) -> Condition {
        self.single(Operator::GreaterOrEqual, value)
    }

    pub fn less(&self, value: impl Into<Value>) -> Condition {
        self.single(Operator::Less, value)
    }

    pub fn less_or_equal(&self, value: impl Into<Value>) -> Condition {
        self.single(Operator::LessOrEqual, value)
    }

    /// Whole-string regular expression match.
    pub fn regex(&self, pattern: impl Into<String>) -> Condition {
        self.leaf(Operator::Regex, Operand::Pattern(pattern.into()))
    }

    /// Case-insensitive [`regex`](Self::regex).
    pub fn iregex(&self, pattern: impl Into<String>) -> Condition {
        self.leaf(Operator::IRegex, Operand::Pattern(pattern.into()))
    }

    pub fn is_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
        self.leaf(
            Operator::IsIn,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Condition {
        self.leaf(
            Operator::NotIn,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Inclusive range `low <= value <= high`.
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Condition {
        self.leaf(Operator::Between, Operand::Range(low.into(), high.into()))
    }

    pub fn asc(&self) -> OrderKey {
        OrderKey {
            field: self.0.clone(),
            descending: false,
        }
    }

    pub fn desc(&self) -> OrderKey {
        OrderKey {
            field: self.0.clone(),
            descending: true,
        }
    }
}

impl From<FieldHandle> for OrderKey {
    fn from(handle: FieldHandle) -> Self {
        handle.asc()
    }
}

impl From<FieldHandle> for FieldRef {
    fn from(handle: FieldHandle) -> Self {
        handle.0
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        if name == PK_NAME {
            FieldRef::Pk
        } else {
            FieldRef::Field(name.to_string())
        }
    }
}
