//! Row-combining algorithms behind the join engine: sort-merge join,
//! cartesian product and the per-row helpers shared with the nested-loop path.
//!
//! Every emission goes through the row ceiling so a runaway join fails as
//! soon as it crosses the limit instead of after materializing everything.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spire_common::error::{ExecutionError, SpireResult};
use spire_common::value::null_safe_compare;
use spire_common::{Field, Row, SpireError, Value};

use crate::calc_pool::CalcPool;
use crate::plan::{CmpFilter, CmpOp, JoinColumn, JoinKey, JoinNode};

const NULL: Value = Value::Null;

fn column(row: &Row, index: usize) -> &Value {
    row.get(index).unwrap_or(&NULL)
}

/// Project the output fields of a join.
pub fn join_fields(
    lfields: &[Field],
    rfields: &[Field],
    cols: &[JoinColumn],
) -> SpireResult<Vec<Field>> {
    cols.iter()
        .map(|col| {
            let (fields, index) = match *col {
                JoinColumn::Left(i) => (lfields, i),
                JoinColumn::Right(i) => (rfields, i),
            };
            fields.get(index).cloned().ok_or_else(|| {
                ExecutionError::ColumnOutOfBounds {
                    index,
                    width: fields.len(),
                }
                .into()
            })
        })
        .collect()
}

/// Project one output row. A missing right row yields NULL right columns.
pub fn join_rows(lrow: &Row, rrow: Option<&Row>, cols: &[JoinColumn]) -> SpireResult<Row> {
    cols.iter()
        .map(|col| match (*col, rrow) {
            (JoinColumn::Left(i), _) => fetch(lrow, i),
            (JoinColumn::Right(_), None) => Ok(Value::Null),
            (JoinColumn::Right(i), Some(r)) => fetch(r, i),
        })
        .collect()
}

fn fetch(row: &Row, index: usize) -> SpireResult<Value> {
    row.get(index).cloned().ok_or_else(|| {
        ExecutionError::ColumnOutOfBounds {
            index,
            width: row.len(),
        }
        .into()
    })
}

/// Append `row` and enforce the ceiling.
pub fn push_row(rows: &mut Vec<Row>, row: Row, maxrow: usize) -> SpireResult<()> {
    rows.push(row);
    if rows.len() > maxrow {
        return Err(ExecutionError::JoinRowLimitExceeded(maxrow).into());
    }
    Ok(())
}

/// End of the run of rows starting at `start` whose key columns are all
/// NULL-safe equal. No keys means the whole remainder is one run.
pub fn fetch_same_key_rows(rows: &[Row], start: usize, keys: &[usize]) -> usize {
    if keys.is_empty() {
        return rows.len();
    }
    let Some(first) = rows.get(start) else {
        return start;
    };
    let mut end = start + 1;
    while end < rows.len()
        && compare_rows(first, keys, &rows[end], keys) == CmpOrdering::Equal
    {
        end += 1;
    }
    end
}

/// Lexicographic NULL-safe comparison of `a[ak[i]]` against `b[bk[i]]`.
fn compare_rows(a: &Row, ak: &[usize], b: &Row, bk: &[usize]) -> CmpOrdering {
    for (&i, &j) in ak.iter().zip(bk) {
        let ord = null_safe_compare(column(a, i), column(b, j));
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

/// True when each key position holds only numeric or only non-numeric
/// values across both sides. Only then is one ordering valid for sorting
/// each side and for comparing across them.
fn keys_share_order(lrows: &[Row], lk: &[usize], rrows: &[Row], rk: &[usize]) -> bool {
    lk.iter().zip(rk).all(|(&li, &ri)| {
        let mut classes = lrows
            .iter()
            .map(|r| column(r, li))
            .chain(rrows.iter().map(|r| column(r, ri)))
            .filter(|v| !v.is_null())
            .map(Value::is_numeric);
        match classes.next() {
            Some(first) => classes.all(|c| c == first),
            None => true,
        }
    })
}

fn key_indexes(keys: &[JoinKey]) -> Vec<usize> {
    keys.iter().map(|k| k.index).collect()
}

/// Evaluate one comparison filter. NULL on either side fails every
/// operator except `<=>`.
pub fn filter_matches(filter: &CmpFilter, lrow: &Row, rrow: &Row) -> bool {
    let (mut a, mut b) = (column(lrow, filter.left), column(rrow, filter.right));
    if filter.exchange {
        std::mem::swap(&mut a, &mut b);
    }
    let ord = null_safe_compare(a, b);
    match filter.op {
        CmpOp::NullSafeEq => ord == CmpOrdering::Equal,
        _ if a.is_null() || b.is_null() => false,
        CmpOp::Eq => ord == CmpOrdering::Equal,
        CmpOp::Lt => ord == CmpOrdering::Less,
        CmpOp::Gt => ord == CmpOrdering::Greater,
        CmpOp::Le => ord != CmpOrdering::Greater,
        CmpOp::Ge => ord != CmpOrdering::Less,
        CmpOp::Ne => ord != CmpOrdering::Equal,
    }
}

/// Hoisted left-only conditions. A falsy column means no right row can match.
pub(crate) fn left_row_passes(node: &JoinNode, lrow: &Row) -> bool {
    node.left_tmp_cols.iter().all(|&i| column(lrow, i).to_bool())
}

/// A right row with NULL in any sentinel column is a padding row.
pub(crate) fn is_padding_row(node: &JoinNode, rrow: &Row) -> bool {
    node.right_tmp_cols.iter().any(|&i| column(rrow, i).is_null())
}

/// Runs the combining algorithms of one join node under a row ceiling.
pub struct MergeJoiner<'a> {
    node: &'a JoinNode,
    maxrow: usize,
    pool: CalcPool,
}

impl<'a> MergeJoiner<'a> {
    pub fn new(node: &'a JoinNode, maxrow: usize) -> Self {
        Self {
            node,
            maxrow,
            pool: CalcPool::default(),
        }
    }

    pub fn with_pool(mut self, pool: CalcPool) -> Self {
        self.pool = pool;
        self
    }

    /// Emit every left row with a NULL right side, if the join pads.
    pub fn concat_left_and_nil(&self, lrows: &[Row], out: &mut Vec<Row>) -> SpireResult<()> {
        if !self.node.pads_unmatched() {
            return Ok(());
        }
        for lrow in lrows {
            push_row(out, join_rows(lrow, None, &self.node.cols)?, self.maxrow)?;
        }
        Ok(())
    }

    /// Sort both sides on their join keys in parallel, then merge. Keys that
    /// mix numbers and strings have no common order and are matched row by
    /// row instead.
    pub fn sort_merge_join(
        &self,
        mut lrows: Vec<Row>,
        mut rrows: Vec<Row>,
    ) -> SpireResult<Vec<Row>> {
        let lk = key_indexes(&self.node.left_keys);
        let rk = key_indexes(&self.node.right_keys);
        if !keys_share_order(&lrows, &lk, &rrows, &rk) {
            tracing::debug!(
                left_rows = lrows.len(),
                right_rows = rrows.len(),
                "mixed join key types, matching without sort"
            );
            return self.key_match_join(&lrows, &rrows);
        }
        std::thread::scope(|s| {
            let lh = s.spawn(|| lrows.sort_by(|a, b| compare_rows(a, &lk, b, &lk)));
            rrows.sort_by(|a, b| compare_rows(a, &rk, b, &rk));
            lh.join()
        })
        .map_err(|_| {
            SpireError::internal_bug(
                "E-JOIN-001",
                "join key sort panicked",
                format!("left_rows={}, right_rows={}", lrows.len(), rrows.len()),
            )
        })?;
        self.merge_join(&lrows, &rrows)
    }

    /// Two-pointer merge over rows already sorted on the join keys. Only
    /// left-outer semantics: right rows without a left partner are dropped.
    pub fn merge_join(&self, lrows: &[Row], rrows: &[Row]) -> SpireResult<Vec<Row>> {
        let lk = key_indexes(&self.node.left_keys);
        let rk = key_indexes(&self.node.right_keys);
        let mut out = Vec::new();
        let (mut li, mut ri) = (0, 0);

        while li < lrows.len() {
            if ri >= rrows.len() {
                self.concat_left_and_nil(&lrows[li..], &mut out)?;
                break;
            }
            let lend = fetch_same_key_rows(lrows, li, &lk);
            let rend = fetch_same_key_rows(rrows, ri, &rk);
            let lrow = &lrows[li];
            let left_null = lk.iter().any(|&i| column(lrow, i).is_null());

            match compare_rows(lrow, &lk, &rrows[ri], &rk) {
                _ if left_null => {
                    self.concat_left_and_nil(&lrows[li..lend], &mut out)?;
                    li = lend;
                }
                CmpOrdering::Equal => {
                    self.concat_left_and_right(&lrows[li..lend], &rrows[ri..rend], &mut out)?;
                    li = lend;
                    ri = rend;
                }
                CmpOrdering::Less => {
                    self.concat_left_and_nil(&lrows[li..lend], &mut out)?;
                    li = lend;
                }
                CmpOrdering::Greater => ri = rend,
            }
        }
        Ok(out)
    }

    /// Match each left row against every right row with an equal key.
    /// Output keeps left order.
    fn key_match_join(&self, lrows: &[Row], rrows: &[Row]) -> SpireResult<Vec<Row>> {
        let lk = key_indexes(&self.node.left_keys);
        let rk = key_indexes(&self.node.right_keys);
        let mut out = Vec::new();
        for lrow in lrows {
            let partners: Vec<Row> = if lk.iter().any(|&i| column(lrow, i).is_null()) {
                Vec::new()
            } else {
                rrows
                    .iter()
                    .filter(|rrow| compare_rows(lrow, &lk, rrow, &rk) == CmpOrdering::Equal)
                    .cloned()
                    .collect()
            };
            self.concat_left_and_right(std::slice::from_ref(lrow), &partners, &mut out)?;
        }
        Ok(out)
    }

    /// Cross a matched left chunk with a right chunk under the comparison
    /// filters. Left rows are probed on the pool; output keeps left order.
    pub fn concat_left_and_right(
        &self,
        lrows: &[Row],
        rrows: &[Row],
        out: &mut Vec<Row>,
    ) -> SpireResult<()> {
        let emitted = AtomicUsize::new(out.len());
        let abort = AtomicBool::new(false);
        let chunks = self
            .pool
            .run(lrows.len(), |i| self.probe(&lrows[i], rrows, &emitted, &abort))?;
        for chunk in chunks {
            out.extend(chunk?);
        }
        Ok(())
    }

    fn probe(
        &self,
        lrow: &Row,
        rrows: &[Row],
        emitted: &AtomicUsize,
        abort: &AtomicBool,
    ) -> SpireResult<Vec<Row>> {
        let mut rows = Vec::new();
        if abort.load(Ordering::Relaxed) {
            return Ok(rows);
        }
        let mut matched = false;
        if left_row_passes(self.node, lrow) {
            for rrow in rrows {
                if !self.node.cmp_filters.iter().all(|f| filter_matches(f, lrow, rrow)) {
                    continue;
                }
                if is_padding_row(self.node, rrow) {
                    continue;
                }
                matched = true;
                let row = join_rows(lrow, Some(rrow), &self.node.cols)?;
                self.emit(&mut rows, row, emitted, abort)?;
            }
        }
        if !matched && self.node.pads_unmatched() {
            let row = join_rows(lrow, None, &self.node.cols)?;
            self.emit(&mut rows, row, emitted, abort)?;
        }
        Ok(rows)
    }

    fn emit(
        &self,
        rows: &mut Vec<Row>,
        row: Row,
        emitted: &AtomicUsize,
        abort: &AtomicBool,
    ) -> SpireResult<()> {
        if emitted.fetch_add(1, Ordering::SeqCst) + 1 > self.maxrow {
            abort.store(true, Ordering::Relaxed);
            return Err(ExecutionError::JoinRowLimitExceeded(self.maxrow).into());
        }
        rows.push(row);
        Ok(())
    }

    /// Full product, projection only.
    pub fn cartesian_product(&self, lrows: &[Row], rrows: &[Row]) -> SpireResult<Vec<Row>> {
        let mut out = Vec::new();
        for lrow in lrows {
            for rrow in rrows {
                push_row(&mut out, join_rows(lrow, Some(rrow), &self.node.cols)?, self.maxrow)?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{JoinStrategy, MergeNode, PlanNode};

    fn int(v: i64) -> Value {
        Value::Int64(v)
    }

    fn node(left_join: bool) -> JoinNode {
        let leaf = || PlanNode::Merge(MergeNode::default());
        let mut n = JoinNode::new(leaf(), leaf(), JoinStrategy::SortMerge);
        n.cols = vec![JoinColumn::Left(0), JoinColumn::Right(1)];
        n.left_keys = vec![JoinKey::new("id", "A", 0)];
        n.right_keys = vec![JoinKey::new("id", "B", 0)];
        n.is_left_join = left_join;
        n
    }

    #[test]
    fn test_fetch_same_key_rows() {
        let rows = vec![vec![int(1)], vec![int(1)], vec![int(2)], vec![Value::Null]];
        assert_eq!(fetch_same_key_rows(&rows, 0, &[0]), 2);
        assert_eq!(fetch_same_key_rows(&rows, 2, &[0]), 3);
        assert_eq!(fetch_same_key_rows(&rows, 3, &[0]), 4);
        assert_eq!(fetch_same_key_rows(&rows, 1, &[]), 4);
        assert_eq!(fetch_same_key_rows(&rows, 4, &[0]), 4);
    }

    #[test]
    fn test_filter_null_semantics() {
        let f = |op| CmpFilter {
            left: 0,
            right: 0,
            op,
            exchange: false,
        };
        let null = vec![Value::Null];
        assert!(!filter_matches(&f(CmpOp::Eq), &null, &null));
        assert!(!filter_matches(&f(CmpOp::Ne), &null, &vec![int(1)]));
        assert!(filter_matches(&f(CmpOp::NullSafeEq), &null, &null));
        assert!(!filter_matches(&f(CmpOp::NullSafeEq), &null, &vec![int(1)]));
        assert!(filter_matches(&f(CmpOp::Le), &vec![int(1)], &vec![int(1)]));
    }

    #[test]
    fn test_filter_exchange() {
        let lt = CmpFilter {
            left: 0,
            right: 0,
            op: CmpOp::Lt,
            exchange: false,
        };
        let (l, r) = (vec![int(1)], vec![int(2)]);
        assert!(filter_matches(&lt, &l, &r));
        assert!(!filter_matches(&CmpFilter { exchange: true, ..lt }, &l, &r));
    }

    #[test]
    fn test_merge_join_left_outer() {
        let mut n = node(true);
        n.cmp_filters = vec![CmpFilter {
            left: 0,
            right: 0,
            op: CmpOp::Eq,
            exchange: false,
        }];
        let lrows = vec![
            vec![Value::Null],
            vec![int(1)],
            vec![int(2)],
            vec![int(2)],
            vec![int(5)],
        ];
        let rrows = vec![
            vec![Value::Null, "n".into()],
            vec![int(2), "b".into()],
            vec![int(3), "c".into()],
        ];
        let out = MergeJoiner::new(&n, 100).merge_join(&lrows, &rrows).unwrap();
        assert_eq!(
            out,
            vec![
                vec![Value::Null, Value::Null],
                vec![int(1), Value::Null],
                vec![int(2), "b".into()],
                vec![int(2), "b".into()],
                vec![int(5), Value::Null],
            ]
        );
    }

    #[test]
    fn test_sort_merge_join_int_against_text_keys() {
        let mut n = node(false);
        n.cmp_filters = vec![CmpFilter {
            left: 0,
            right: 0,
            op: CmpOp::Eq,
            exchange: false,
        }];
        let lrows = vec![vec![int(10)], vec![int(9)], vec![int(7)]];
        let rrows = vec![
            vec!["9".into(), "nine".into()],
            vec!["10".into(), "ten".into()],
            vec![Value::Null, "none".into()],
        ];
        let joiner = MergeJoiner::new(&n, 100);
        let out = joiner.sort_merge_join(lrows.clone(), rrows.clone()).unwrap();
        assert_eq!(
            out,
            vec![vec![int(10), "ten".into()], vec![int(9), "nine".into()]]
        );

        // the same pairs pass the filters one by one
        let mut expected = Vec::new();
        for l in &lrows {
            for r in &rrows {
                if n.cmp_filters.iter().all(|f| filter_matches(f, l, r)) {
                    expected.push(join_rows(l, Some(r), &n.cols).unwrap());
                }
            }
        }
        assert_eq!(out, expected);

        n.is_left_join = true;
        let out = MergeJoiner::new(&n, 100).sort_merge_join(lrows, rrows).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], vec![int(7), Value::Null]);
    }

    #[test]
    fn test_merge_join_inner_drops_unmatched() {
        let n = node(false);
        let lrows = vec![vec![int(1)], vec![int(2)]];
        let rrows = vec![vec![int(2), "b".into()], vec![int(9), "z".into()]];
        let out = MergeJoiner::new(&n, 100).merge_join(&lrows, &rrows).unwrap();
        assert_eq!(out, vec![vec![int(2), "b".into()]]);
    }

    #[test]
    fn test_padding_rows_are_not_matches() {
        let mut n = node(true);
        n.right_tmp_cols = vec![1];
        let lrows = vec![vec![int(1)]];
        let rrows = vec![vec![int(1), Value::Null]];
        let out = MergeJoiner::new(&n, 100).merge_join(&lrows, &rrows).unwrap();
        assert_eq!(out, vec![vec![int(1), Value::Null]]);
    }

    #[test]
    fn test_left_gating_skips_probe() {
        let mut n = node(true);
        n.cols = vec![JoinColumn::Left(0), JoinColumn::Left(1), JoinColumn::Right(1)];
        n.left_tmp_cols = vec![1];
        let lrows = vec![vec![int(1), int(0)], vec![int(1), int(1)]];
        let rrows = vec![vec![int(1), "x".into()]];
        let out = MergeJoiner::new(&n, 100).merge_join(&lrows, &rrows).unwrap();
        assert_eq!(
            out,
            vec![
                vec![int(1), int(0), Value::Null],
                vec![int(1), int(1), "x".into()],
            ]
        );
    }

    #[test]
    fn test_ceiling_under_pool() {
        let mut n = node(false);
        n.left_keys.clear();
        n.right_keys.clear();
        let lrows: Vec<Row> = (0..20).map(|i| vec![int(i)]).collect();
        let rrows: Vec<Row> = (0..20).map(|i| vec![int(i), int(i)]).collect();
        let joiner = MergeJoiner::new(&n, 399).with_pool(CalcPool::new(4));
        let err = joiner.merge_join(&lrows, &rrows).unwrap_err();
        assert_eq!(err.to_string(), "unsupported: join.row.count.exceeded.allowed.limit.of.'399'");

        let joiner = MergeJoiner::new(&n, 400).with_pool(CalcPool::new(4));
        let out = joiner.merge_join(&lrows, &rrows).unwrap();
        assert_eq!(out.len(), 400);
        assert_eq!(out[0], vec![int(0), int(0)]);
        assert_eq!(out[399], vec![int(19), int(19)]);
    }

    #[test]
    fn test_cartesian_ceiling() {
        let n = node(false);
        let lrows = vec![vec![int(1)], vec![int(2)]];
        let rrows = vec![vec![int(1), "a".into()], vec![int(2), "b".into()]];
        assert_eq!(MergeJoiner::new(&n, 4).cartesian_product(&lrows, &rrows).unwrap().len(), 4);
        assert!(MergeJoiner::new(&n, 3).cartesian_product(&lrows, &rrows).is_err());
    }

    #[test]
    fn test_join_rows_out_of_bounds() {
        let err = join_rows(&vec![int(1)], None, &[JoinColumn::Left(2)]).unwrap_err();
        assert!(err.is_internal_bug());
        let fields = join_fields(&[Field::default()], &[], &[JoinColumn::Right(0)]);
        assert!(fields.is_err());
    }
}
