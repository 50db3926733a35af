//! Post-processing applied to a node's assembled rows: merge of per-shard
//! partial aggregates, DISTINCT, ORDER BY, LIMIT and removal of helper columns.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use spire_common::error::{ExecutionError, SpireResult};
use spire_common::value::{encode_row_key, null_safe_compare};
use spire_common::{QueryResult, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    /// Partial counts are summed.
    Count,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggSpec {
    pub func: AggFunc,
    pub index: usize,
}

impl AggSpec {
    pub fn new(func: AggFunc, index: usize) -> Self {
        Self { func, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub index: usize,
    pub desc: bool,
}

impl OrderKey {
    pub fn asc(index: usize) -> Self {
        Self { index, desc: false }
    }

    pub fn desc(index: usize) -> Self {
        Self { index, desc: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubPlanOp {
    Aggregate {
        group_by: Vec<usize>,
        aggs: Vec<AggSpec>,
    },
    Distinct,
    OrderBy(Vec<OrderKey>),
    Limit {
        offset: usize,
        limit: usize,
    },
    /// Keep only the first N columns.
    Truncate(usize),
}

/// Apply `ops` to `res` in order.
pub fn exec_sub_plan(ops: &[SubPlanOp], res: &mut QueryResult) -> SpireResult<()> {
    for op in ops {
        match op {
            SubPlanOp::Aggregate { group_by, aggs } => {
                check_columns(res, group_by.iter().chain(aggs.iter().map(|a| &a.index)))?;
                res.rows = merge_partial_aggs(std::mem::take(&mut res.rows), group_by, aggs);
            }
            SubPlanOp::Distinct => {
                let mut seen = HashSet::with_capacity(res.rows.len());
                res.rows.retain(|row| seen.insert(encode_row_key(row)));
            }
            SubPlanOp::OrderBy(keys) => {
                check_columns(res, keys.iter().map(|k| &k.index))?;
                res.rows.sort_by(|a, b| compare_by_keys(a, b, keys));
            }
            SubPlanOp::Limit { offset, limit } => {
                let start = (*offset).min(res.rows.len());
                let end = start.saturating_add(*limit).min(res.rows.len());
                res.rows = res.rows.drain(start..end).collect();
            }
            SubPlanOp::Truncate(width) => {
                res.fields.truncate(*width);
                for row in &mut res.rows {
                    row.truncate(*width);
                }
            }
        }
    }
    Ok(())
}

fn check_columns<'a>(
    res: &QueryResult,
    indexes: impl Iterator<Item = &'a usize>,
) -> SpireResult<()> {
    let width = res.rows.first().map(|r| r.len()).unwrap_or(usize::MAX);
    for &index in indexes {
        if index >= width {
            return Err(ExecutionError::ColumnOutOfBounds { index, width }.into());
        }
    }
    Ok(())
}

const NULL: Value = Value::Null;

fn column(row: &Row, index: usize) -> &Value {
    row.get(index).unwrap_or(&NULL)
}

fn compare_by_keys(a: &Row, b: &Row, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let ord = null_safe_compare(column(a, key.index), column(b, key.index));
        let ord = if key.desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Merge rows sharing the same group key; groups keep first-seen order.
fn merge_partial_aggs(rows: Vec<Row>, group_by: &[usize], aggs: &[AggSpec]) -> Vec<Row> {
    let mut index: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut out: Vec<Row> = Vec::new();
    for row in rows {
        let key_values: Vec<Value> = group_by.iter().map(|&i| column(&row, i).clone()).collect();
        match index.entry(encode_row_key(&key_values)) {
            Entry::Vacant(e) => {
                e.insert(out.len());
                out.push(row);
            }
            Entry::Occupied(e) => {
                let merged = &mut out[*e.get()];
                for agg in aggs {
                    let incoming = column(&row, agg.index);
                    if let Some(existing) = merged.get_mut(agg.index) {
                        *existing = match agg.func {
                            AggFunc::Sum | AggFunc::Count => value_add(existing, incoming),
                            AggFunc::Min => pick(existing, incoming, Ordering::Less),
                            AggFunc::Max => pick(existing, incoming, Ordering::Greater),
                        };
                    }
                }
            }
        }
    }
    out
}

/// Keep `incoming` if it compares `want` against `existing`. NULLs never win.
fn pick(existing: &Value, incoming: &Value, want: Ordering) -> Value {
    match (existing.is_null(), incoming.is_null()) {
        (_, true) => existing.clone(),
        (true, false) => incoming.clone(),
        (false, false) if null_safe_compare(incoming, existing) == want => incoming.clone(),
        _ => existing.clone(),
    }
}

/// Add two partial sums. Integers stay integral while they fit.
pub(crate) fn value_add(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => other.clone(),
        (Value::Int64(x), Value::Int64(y)) => match x.checked_add(*y) {
            Some(v) => Value::Int64(v),
            None => Value::Decimal((*x as i128 + *y as i128).to_string()),
        },
        (Value::Uint64(x), Value::Uint64(y)) => match x.checked_add(*y) {
            Some(v) => Value::Uint64(v),
            None => Value::Decimal((*x as u128 + *y as u128).to_string()),
        },
        (Value::Int64(x), Value::Uint64(y)) | (Value::Uint64(y), Value::Int64(x)) => {
            let sum = *x as i128 + *y as i128;
            i64::try_from(sum)
                .map(Value::Int64)
                .unwrap_or_else(|_| Value::Decimal(sum.to_string()))
        }
        (Value::Float64(_), _) | (_, Value::Float64(_)) => {
            Value::Float64(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
        }
        _ => Value::Decimal((a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)).to_string()),
    }
}
