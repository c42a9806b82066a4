//! Condition Evaluator — compiles a [`Condition`] against a model and selects
//! matching records, using indexes where the root AND allows it
//!
//! 실행 계획:
//!
//! 1. 루트가 AND이고 인덱스가 있는 필드에 대한 EQUAL / IS_IN / BETWEEN 리프가
//!    하나 이상 있으면, 각 리프를 B-tree로 조회해 id 집합의 교집합을 후보로 사용
//! 2. 나머지 리프/자식 노드는 후보 레코드마다 직접 평가
//! 3. 그 외(OR 루트, 인덱스 없음)는 전체 스캔 — 고정 크기 청크 단위로 병렬 평가

use crate::engine::model_store::ModelStore;
use crate::engine::parallel_engine::ParallelExecutionEngine;
use crate::error::{GnxError, GnxResult};
use crate::query::condition::{Condition, FieldRef, Operand, Operator};
use crate::schema::{FieldDef, FieldType, ModelDef, PK_NAME};
use crate::storage::codec::{RecordCodec, coerce};
use crate::storage::index::IndexColumn;
use crate::storage::value::{RecordId, Value};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::ops::Bound;
use tracing::debug;

/// Raw matched record: id and encoded bytes.
pub(crate) type RawRecord = (RecordId, Vec<u8>);

/// Column read by a leaf or a sort key.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Pk,
    Column(FieldDef),
}

impl Target {
    pub(crate) fn resolve(def: &ModelDef, field: &FieldRef) -> GnxResult<Self> {
        match field {
            FieldRef::Pk => Ok(Target::Pk),
            FieldRef::Field(name) => {
                let (field, _) = def.stored_field(name)?;
                Ok(Target::Column(field.clone()))
            }
        }
    }

    /// Value of this column in a record.
    pub(crate) fn read(&self, codec: &RecordCodec, id: RecordId, bytes: &[u8]) -> GnxResult<Value> {
        match self {
            Target::Pk => Ok(Value::Int(id as i64)),
            Target::Column(field) => codec.decode_one(bytes, field),
        }
    }

    fn name(&self) -> &str {
        match self {
            Target::Pk => PK_NAME,
            Target::Column(field) => &field.name,
        }
    }

    fn index_column(&self) -> IndexColumn<'_> {
        match self {
            Target::Pk => IndexColumn::Pk,
            Target::Column(field) => IndexColumn::Field(&field.name),
        }
    }

    /// Type-check and canonicalize a filter operand.
    fn check_operand(&self, value: Value) -> GnxResult<Value> {
        match self {
            Target::Pk => match value {
                Value::Int(v) => Ok(Value::Int(v)),
                Value::Link(Some(id)) => Ok(Value::Int(id as i64)),
                other => Err(GnxError::mismatch(PK_NAME, "INT", other.type_name())),
            },
            Target::Column(field) => {
                if value.is_null() && field.field_type != FieldType::Link {
                    return Err(GnxError::mismatch(&field.name, field.field_type.name(), "NULL"));
                }
                coerce(field, value)
            }
        }
    }
}

#[derive(Debug, Clone)]
enum CompiledOperand {
    Single(Value),
    List(Vec<Value>),
    Range(Value, Value),
    Pattern(Regex),
}

#[derive(Debug, Clone)]
pub(crate) struct Leaf {
    target: Target,
    op: Operator,
    operand: CompiledOperand,
}

impl Leaf {
    fn test(&self, value: &Value) -> bool {
        let cmp = |x: &Value| value.compare(x);
        match (self.op, &self.operand) {
            (Operator::Equal, CompiledOperand::Single(x)) => cmp(x) == Some(Ordering::Equal),
            (Operator::NotEqual, CompiledOperand::Single(x)) => cmp(x) != Some(Ordering::Equal),
            (Operator::Greater, CompiledOperand::Single(x)) => cmp(x) == Some(Ordering::Greater),
            (Operator::GreaterOrEqual, CompiledOperand::Single(x)) => {
                matches!(cmp(x), Some(Ordering::Greater | Ordering::Equal))
            }
            (Operator::Less, CompiledOperand::Single(x)) => cmp(x) == Some(Ordering::Less),
            (Operator::LessOrEqual, CompiledOperand::Single(x)) => {
                matches!(cmp(x), Some(Ordering::Less | Ordering::Equal))
            }
            (Operator::IsIn, CompiledOperand::List(xs)) => {
                xs.iter().any(|x| cmp(x) == Some(Ordering::Equal))
            }
            (Operator::NotIn, CompiledOperand::List(xs)) => {
                !xs.iter().any(|x| cmp(x) == Some(Ordering::Equal))
            }
            (Operator::Between, CompiledOperand::Range(lo, hi)) => {
                matches!(cmp(lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(cmp(hi), Some(Ordering::Less | Ordering::Equal))
            }
            (Operator::Regex | Operator::IRegex, CompiledOperand::Pattern(re)) => {
                value.as_str().is_some_and(|s| re.is_match(s))
            }
            _ => false,
        }
    }

    fn is_index_assisted(&self, store: &ModelStore) -> bool {
        self.op.supports_index() && store.indexes().has_index(self.target.index_column())
    }

    /// Candidate ids from the B-tree, ascending and unique.
    fn index_ids(&self, store: &ModelStore) -> GnxResult<Vec<RecordId>> {
        let indexes = store.indexes();
        let column = self.target.index_column();
        let mut ids = match &self.operand {
            CompiledOperand::Single(v) => indexes.lookup_eq(column, v)?,
            CompiledOperand::List(values) => {
                let mut ids = Vec::new();
                for v in values {
                    ids.extend(indexes.lookup_eq(column, v)?);
                }
                ids
            }
            CompiledOperand::Range(lo, hi) => {
                indexes.lookup_range(column, Bound::Included(lo), Bound::Included(hi))?
            }
            CompiledOperand::Pattern(_) => {
                return Err(GnxError::Validation(format!(
                    "{} cannot use an index",
                    self.op.name()
                )));
            }
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

/// Condition bound to a model's layout.
#[derive(Debug, Clone)]
pub(crate) enum Compiled {
    Leaf(Leaf),
    And(Vec<Compiled>),
    Or(Vec<Compiled>),
}

impl Compiled {
    /// Resolve fields, type-check operands and build regexes.
    pub(crate) fn compile(def: &ModelDef, condition: &Condition) -> GnxResult<Self> {
        match condition {
            Condition::And(children) => {
                // 중첩된 AND는 부모로 펼쳐서 인덱스 플래너가 모든 리프를 보게 합니다
                let mut flat = Vec::with_capacity(children.len());
                for child in children {
                    match Self::compile(def, child)? {
                        Compiled::And(grand) => flat.extend(grand),
                        other => flat.push(other),
                    }
                }
                Ok(Compiled::And(flat))
            }
            Condition::Or(children) => Ok(Compiled::Or(
                children.iter().map(|c| Self::compile(def, c)).collect::<GnxResult<_>>()?,
            )),
            Condition::Leaf { field, op, operand } => {
                Ok(Compiled::Leaf(Self::compile_leaf(def, field, *op, operand)?))
            }
        }
    }

    fn compile_leaf(def: &ModelDef, field: &FieldRef, op: Operator, operand: &Operand) -> GnxResult<Leaf> {
        let target = Target::resolve(def, field)?;
        let shape_error = || {
            GnxError::Validation(format!(
                "{} on '{}.{}' got an operand of the wrong shape",
                op.name(),
                def.name,
                target.name()
            ))
        };

        let operand = match (op, operand) {
            (Operator::Regex | Operator::IRegex, Operand::Pattern(pattern)) => {
                let is_string = matches!(&target, Target::Column(f) if f.field_type == FieldType::String);
                if !is_string {
                    return Err(GnxError::Validation(format!(
                        "{} needs a STRING field, '{}.{}' is not one",
                        op.name(),
                        def.name,
                        target.name()
                    )));
                }
                let re = RegexBuilder::new(&format!("^(?:{pattern})$"))
                    .case_insensitive(op == Operator::IRegex)
                    .build()?;
                CompiledOperand::Pattern(re)
            }
            (Operator::IsIn | Operator::NotIn, Operand::List(values)) => CompiledOperand::List(
                values
                    .iter()
                    .map(|v| target.check_operand(v.clone()))
                    .collect::<GnxResult<_>>()?,
            ),
            (Operator::Between, Operand::Range(lo, hi)) => CompiledOperand::Range(
                target.check_operand(lo.clone())?,
                target.check_operand(hi.clone())?,
            ),
            (
                Operator::Equal
                | Operator::NotEqual
                | Operator::Greater
                | Operator::GreaterOrEqual
                | Operator::Less
                | Operator::LessOrEqual,
                Operand::Single(v),
            ) => CompiledOperand::Single(target.check_operand(v.clone())?),
            _ => return Err(shape_error()),
        };

        Ok(Leaf { target, op, operand })
    }

    pub(crate) fn is_always(&self) -> bool {
        matches!(self, Compiled::And(children) if children.is_empty())
    }

    /// Evaluate against one encoded record.
    pub(crate) fn matches(&self, codec: &RecordCodec, id: RecordId, bytes: &[u8]) -> GnxResult<bool> {
        match self {
            Compiled::Leaf(leaf) => Ok(leaf.test(&leaf.target.read(codec, id, bytes)?)),
            Compiled::And(children) => all_match(children.iter(), codec, id, bytes),
            Compiled::Or(children) => {
                for child in children {
                    if child.matches(codec, id, bytes)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn all_match<'a>(
    children: impl IntoIterator<Item = &'a Compiled>,
    codec: &RecordCodec,
    id: RecordId,
    bytes: &[u8],
) -> GnxResult<bool> {
    for child in children {
        if !child.matches(codec, id, bytes)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Intersect two ascending id lists.
fn intersect(a: &[RecordId], b: &[RecordId]) -> Vec<RecordId> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Every record of `store` matching `condition`, in ascending id order.
pub(crate) fn select(
    store: &ModelStore,
    condition: &Compiled,
    parallel: &ParallelExecutionEngine,
) -> GnxResult<Vec<RawRecord>> {
    let codec = store.codec();
    let model = store.def().name.as_str();

    let conjuncts: &[Compiled] = match condition {
        Compiled::And(children) => children,
        Compiled::Leaf(_) => std::slice::from_ref(condition),
        Compiled::Or(_) => &[],
    };
    if !conjuncts.is_empty() {
        let (indexed, residual): (Vec<&Compiled>, Vec<&Compiled>) = conjuncts
            .iter()
            .partition(|c| matches!(c, Compiled::Leaf(leaf) if leaf.is_index_assisted(store)));

        if !indexed.is_empty() {
            let mut candidates: Option<Vec<RecordId>> = None;
            for child in &indexed {
                if let Compiled::Leaf(leaf) = child {
                    let ids = leaf.index_ids(store)?;
                    candidates = Some(match candidates {
                        None => ids,
                        Some(prev) => intersect(&prev, &ids),
                    });
                }
            }
            let candidates = candidates.unwrap_or_default();
            debug!(
                model,
                indexed_leaves = indexed.len(),
                candidates = candidates.len(),
                "index-assisted plan"
            );

            let mut out = Vec::with_capacity(candidates.len());
            for id in candidates {
                if let Some(bytes) = store.read_raw(id)? {
                    if all_match(residual.iter().copied(), codec, id, &bytes)? {
                        out.push((id, bytes));
                    }
                }
            }
            return Ok(out);
        }
    }

    let scan = store.scan()?;
    debug!(
        model,
        rows = scan.len(),
        parallel = parallel.should_parallelize(scan.len()),
        "full scan"
    );
    let entries = if condition.is_always() {
        scan.entries().to_vec()
    } else {
        parallel.filter_ordered(scan.entries().to_vec(), |&(id, pos)| {
            condition.matches(codec, id, scan.record(pos))
        })?
    };
    Ok(entries
        .into_iter()
        .map(|(id, pos)| (id, scan.record(pos).to_vec()))
        .collect())
}
