//! Aggregation Engine — GROUP BY one field, reduce with COUNT / SUM / MIN / MAX
//!
//! Rows are reduced chunk by chunk (in parallel for large inputs) and the
//! per-chunk partial states are merged in chunk order, so results do not
//! depend on the thread count.

use crate::engine::parallel_engine::ParallelExecutionEngine;
use crate::error::{GnxError, GnxResult};
use crate::query::evaluator::RawRecord;
use crate::schema::{FieldDef, FieldType, ModelDef};
use crate::storage::codec::RecordCodec;
use crate::storage::value::{GroupKey, Value};
use ahash::AHashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;

/// Reducer over one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reducer {
    /// Number of rows (ignores fields)
    Count,
    Sum(String),
    Min(String),
    Max(String),
}

pub fn count() -> Reducer {
    Reducer::Count
}

pub fn sum(field: impl Into<String>) -> Reducer {
    Reducer::Sum(field.into())
}

pub fn min(field: impl Into<String>) -> Reducer {
    Reducer::Min(field.into())
}

pub fn max(field: impl Into<String>) -> Reducer {
    Reducer::Max(field.into())
}

/// `agg(by = field?, name = reducer, ...)`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggSpec {
    pub by: Option<String>,
    pub columns: Vec<(String, Reducer)>,
}

impl AggSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group by `field` instead of treating all rows as one group.
    pub fn by(mut self, field: impl Into<String>) -> Self {
        self.by = Some(field.into());
        self
    }

    /// Add an output column.
    pub fn with(mut self, name: impl Into<String>, reducer: Reducer) -> Self {
        self.columns.push((name.into(), reducer));
        self
    }
}

/// One output row: the group value (when grouped) and the reducer columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AggRow {
    pub group: Option<(String, Value)>,
    pub values: Vec<(String, Value)>,
}

impl AggRow {
    /// Look up the group field or a reducer column by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some((field, value)) = &self.group {
            if field == name {
                return Some(value);
            }
        }
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn group_value(&self) -> Option<&Value> {
        self.group.as_ref().map(|(_, v)| v)
    }
}

// ════════════════════════════════════════════
// Plan & accumulators
// ════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Plan {
    Count,
    SumInt(FieldDef),
    SumDouble(FieldDef),
    Min(FieldDef),
    Max(FieldDef),
}

impl Plan {
    fn compile(def: &ModelDef, reducer: &Reducer) -> GnxResult<Self> {
        let numeric = |name: &str, what: &str| -> GnxResult<FieldDef> {
            let (field, _) = def.stored_field(name)?;
            if !field.field_type.is_numeric() {
                return Err(GnxError::Validation(format!(
                    "{what} needs a numeric field, '{}.{}' is {}",
                    def.name, name, field.field_type
                )));
            }
            Ok(field.clone())
        };
        Ok(match reducer {
            Reducer::Count => Plan::Count,
            Reducer::Sum(name) => {
                let field = numeric(name, "SUM")?;
                if field.field_type == FieldType::Double {
                    Plan::SumDouble(field)
                } else {
                    Plan::SumInt(field)
                }
            }
            Reducer::Min(name) => Plan::Min(numeric(name, "MIN")?),
            Reducer::Max(name) => Plan::Max(numeric(name, "MAX")?),
        })
    }

    fn field(&self) -> Option<&FieldDef> {
        match self {
            Plan::Count => None,
            Plan::SumInt(f) | Plan::SumDouble(f) | Plan::Min(f) | Plan::Max(f) => Some(f),
        }
    }

    fn init(&self) -> Acc {
        match self {
            Plan::Count => Acc::Count(0),
            Plan::SumInt(_) => Acc::SumInt(0),
            Plan::SumDouble(_) => Acc::SumDouble(0.0),
            Plan::Min(_) => Acc::Min(None),
            Plan::Max(_) => Acc::Max(None),
        }
    }
}

#[derive(Debug, Clone)]
enum Acc {
    Count(u64),
    SumInt(i64),
    SumDouble(f64),
    Min(Option<Value>),
    Max(Option<Value>),
}

/// Integer form used by SUM (LINK null counts as its stored -1).
fn sum_int_value(value: &Value) -> i64 {
    match value {
        Value::Int(v) | Value::DateTime(v) => *v,
        Value::Link(id) => id.map_or(-1, |v| v as i64),
        _ => 0,
    }
}

fn add_checked(total: i64, delta: i64) -> GnxResult<i64> {
    total
        .checked_add(delta)
        .ok_or_else(|| GnxError::Validation("SUM overflowed a 64-bit integer".to_string()))
}

fn keep(slot: &mut Option<Value>, candidate: Value, wanted: Ordering) {
    let replace = match slot {
        None => true,
        Some(current) => candidate.sort_cmp(current) == wanted,
    };
    if replace {
        *slot = Some(candidate);
    }
}

impl Acc {
    fn feed(&mut self, value: Option<Value>) -> GnxResult<()> {
        match (self, value) {
            (Acc::Count(n), _) => *n += 1,
            (Acc::SumInt(total), Some(v)) => *total = add_checked(*total, sum_int_value(&v))?,
            (Acc::SumDouble(total), Some(v)) => *total += v.as_f64().unwrap_or(0.0),
            (Acc::Min(slot), Some(v)) => keep(slot, v, Ordering::Less),
            (Acc::Max(slot), Some(v)) => keep(slot, v, Ordering::Greater),
            _ => {}
        }
        Ok(())
    }

    fn merge(&mut self, other: Acc) -> GnxResult<()> {
        match (self, other) {
            (Acc::Count(a), Acc::Count(b)) => *a += b,
            (Acc::SumInt(a), Acc::SumInt(b)) => *a = add_checked(*a, b)?,
            (Acc::SumDouble(a), Acc::SumDouble(b)) => *a += b,
            (Acc::Min(slot), Acc::Min(Some(v))) => keep(slot, v, Ordering::Less),
            (Acc::Max(slot), Acc::Max(Some(v))) => keep(slot, v, Ordering::Greater),
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Acc::Count(n) => Value::Int(n as i64),
            Acc::SumInt(v) => Value::Int(v),
            Acc::SumDouble(v) => Value::Double(v),
            Acc::Min(v) | Acc::Max(v) => v.unwrap_or(Value::Null),
        }
    }
}

type Accs = SmallVec<[Acc; 4]>;

/// Groups in first-seen order.
#[derive(Default)]
struct Partial {
    order: Vec<GroupKey>,
    groups: AHashMap<GroupKey, Accs>,
}

impl Partial {
    fn merge(&mut self, other: Partial) -> GnxResult<()> {
        let Partial { order, mut groups } = other;
        for key in order {
            let Some(incoming) = groups.remove(&key) else { continue };
            match self.groups.get_mut(&key) {
                Some(accs) => {
                    for (acc, inc) in accs.iter_mut().zip(incoming) {
                        acc.merge(inc)?;
                    }
                }
                None => {
                    self.order.push(key.clone());
                    self.groups.insert(key, incoming);
                }
            }
        }
        Ok(())
    }
}

/// Reduce already-filtered records according to `spec`.
pub(crate) fn aggregate(
    codec: &RecordCodec,
    spec: &AggSpec,
    records: &[RawRecord],
    parallel: &ParallelExecutionEngine,
) -> GnxResult<Vec<AggRow>> {
    let def = codec.def();
    let group_field = match &spec.by {
        Some(name) => Some(def.stored_field(name)?.0.clone()),
        None => None,
    };
    let plans = spec
        .columns
        .iter()
        .map(|(_, reducer)| Plan::compile(def, reducer))
        .collect::<GnxResult<Vec<_>>>()?;

    let partials = parallel.map_chunks(records, |chunk| -> GnxResult<Partial> {
        let mut partial = Partial::default();
        for (_, bytes) in chunk {
            let key = match &group_field {
                Some(field) => GroupKey(codec.decode_one(bytes, field)?),
                None => GroupKey(Value::Null),
            };
            if !partial.groups.contains_key(&key) {
                partial.order.push(key.clone());
                partial
                    .groups
                    .insert(key.clone(), plans.iter().map(Plan::init).collect());
            }
            if let Some(accs) = partial.groups.get_mut(&key) {
                for (acc, plan) in accs.iter_mut().zip(&plans) {
                    let value = match plan.field() {
                        Some(field) => Some(codec.decode_one(bytes, field)?),
                        None => None,
                    };
                    acc.feed(value)?;
                }
            }
        }
        Ok(partial)
    });

    let mut total = Partial::default();
    for partial in partials {
        total.merge(partial?)?;
    }

    // no grouping: exactly one row, even over zero records
    if group_field.is_none() && total.order.is_empty() {
        total.order.push(GroupKey(Value::Null));
        total
            .groups
            .insert(GroupKey(Value::Null), plans.iter().map(Plan::init).collect());
    }

    let Partial { order, mut groups } = total;
    let rows = order
        .into_iter()
        .filter_map(|key| {
            let accs = groups.remove(&key)?;
            Some(AggRow {
                group: group_field.as_ref().map(|f| (f.name.clone(), key.0)),
                values: spec
                    .columns
                    .iter()
                    .map(|(name, _)| name.clone())
                    .zip(accs.into_iter().map(Acc::finish))
                    .collect(),
            })
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StringOverflow;
    use crate::engine::parallel_engine::ParallelizationPolicy;
    use crate::schema::ModelBuilder;

    fn codec() -> RecordCodec {
        let def = ModelDef::register(
            ModelBuilder::new("City")
                .string("country", 8)
                .int("population")
                .double("area")
                .build(),
        )
        .unwrap();
        RecordCodec::new(def, StringOverflow::Reject)
    }

    fn records(codec: &RecordCodec, rows: &[(&str, i64, f64)]) -> Vec<RawRecord> {
        rows.iter()
            .enumerate()
            .map(|(i, (c, p, a))| {
                let values = vec![Value::from(*c), Value::Int(*p), Value::Double(*a)];
                (i as u64, codec.encode(&values).unwrap())
            })
            .collect()
    }

    fn engine() -> ParallelExecutionEngine {
        ParallelExecutionEngine::new_fixed(2).unwrap()
    }

    #[test]
    fn test_ungrouped_sum() {
        let codec = codec();
        let recs = records(&codec, &[("a", 100, 1.0), ("b", 200, 2.0), ("a", 300, 0.5)]);
        let spec = AggSpec::new().with("total", sum("population"));
        let rows = aggregate(&codec, &spec, &recs, &engine()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("total"), Some(&Value::Int(600)));
        assert!(rows[0].group.is_none());
    }

    #[test]
    fn test_grouped_reducers() {
        let codec = codec();
        let recs = records(&codec, &[("a", 100, 1.0), ("b", 200, 2.0), ("a", 300, 0.5)]);
        let spec = AggSpec::new()
            .by("country")
            .with("n", count())
            .with("area", sum("area"))
            .with("smallest", min("population"))
            .with("largest", max("population"));
        let rows = aggregate(&codec, &spec, &recs, &engine()).unwrap();
        let a = rows
            .iter()
            .find(|r| r.group_value() == Some(&Value::from("a")))
            .unwrap();
        assert_eq!(a.get("n"), Some(&Value::Int(2)));
        assert_eq!(a.get("area"), Some(&Value::Double(1.5)));
        assert_eq!(a.get("smallest"), Some(&Value::Int(100)));
        assert_eq!(a.get("largest"), Some(&Value::Int(300)));
        assert_eq!(a.get("country"), Some(&Value::from("a")));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_zero_rows() {
        let codec = codec();
        let spec = AggSpec::new()
            .with("n", count())
            .with("total", sum("population"))
            .with("low", min("population"));
        let rows = aggregate(&codec, &spec, &[], &engine()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("n"), Some(&Value::Int(0)));
        assert_eq!(rows[0].get("total"), Some(&Value::Int(0)));
        assert_eq!(rows[0].get("low"), Some(&Value::Null));

        let grouped = aggregate(&codec, &spec.clone().by("country"), &[], &engine()).unwrap();
        assert!(grouped.is_empty());
    }

    #[test]
    fn test_non_numeric_reducer_rejected() {
        let codec = codec();
        let spec = AggSpec::new().with("x", max("country"));
        let err = aggregate(&codec, &spec, &[], &engine()).unwrap_err();
        assert!(matches!(err, GnxError::Validation(_)));
    }

    #[test]
    fn test_chunked_merge_matches_single_pass() {
        let codec = codec();
        let rows: Vec<(&str, i64, f64)> = (0..5000)
            .map(|i| (if i % 3 == 0 { "x" } else { "y" }, i as i64, 0.25))
            .collect();
        let recs = records(&codec, &rows);
        let spec = AggSpec::new().by("country").with("n", count()).with("s", sum("population"));

        let single = ParallelExecutionEngine::new(ParallelizationPolicy::Fixed(1), 1).unwrap();
        let many = ParallelExecutionEngine::new(ParallelizationPolicy::Fixed(4), 1).unwrap();
        let a = aggregate(&codec, &spec, &recs, &single).unwrap();
        let b = aggregate(&codec, &spec, &recs, &many).unwrap();
        assert_eq!(a, b);

        let counted: i64 = a.iter().map(|r| r.get("n").and_then(Value::as_int).unwrap()).sum();
        assert_eq!(counted, 5000);
    }
}
