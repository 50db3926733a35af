use spire_common::request_context::{QueryTuple, RequestMode};
use spire_common::value::ColumnType;
use spire_common::{Field, QueryResult, Row, SpireError, Value};

use super::execute_plan;
use crate::mock::MockTransaction;
use crate::operator::{OrderKey, SubPlanOp};
use crate::plan::*;
use crate::txn::Transaction;

const SELECT_A: &str = "select A.id, A.name from sbtest.A0 as A";
const SELECT_B: &str = "select B.name, B.id from sbtest.B0 as B";
const SELECT_B_BY_ID: &str = "select B.name, B.id from sbtest.B0 as B where B.id = :A_id";

fn fields(names: &[&str]) -> Vec<Field> {
    names
        .iter()
        .map(|n| Field::new(*n, "", ColumnType::VarChar))
        .collect()
}

fn result(names: &[&str], rows: Vec<Row>) -> QueryResult {
    QueryResult::new(fields(names), rows)
}

fn int(v: i64) -> Value {
    Value::Int64(v)
}

fn merge(query: &str, backend: &str) -> PlanNode {
    PlanNode::Merge(MergeNode {
        querys: vec![QueryTuple::new(query, backend, "")],
        ..Default::default()
    })
}

fn template(query: &str, backend: &str) -> PlanNode {
    PlanNode::Merge(MergeNode {
        parsed_querys: vec![ParsedQuery::new(query, backend, "")],
        ..Default::default()
    })
}

fn a_rows() -> Vec<Row> {
    vec![
        vec![int(3), "go".into()],
        vec![int(4), "lang".into()],
        vec![int(5), "nice".into()],
    ]
}

fn b_rows() -> Vec<Row> {
    vec![vec!["go".into(), int(3)], vec!["lang".into(), int(5)]]
}

/// A.id = B.id, projecting A.id and B.name.
fn equi_join(left: PlanNode, right: PlanNode, strategy: JoinStrategy) -> JoinNode {
    let mut node = JoinNode::new(left, right, strategy);
    node.cols = vec![JoinColumn::Left(0), JoinColumn::Right(0)];
    node.left_keys = vec![JoinKey::new("id", "A", 0)];
    node.right_keys = vec![JoinKey::new("id", "B", 1)];
    node.cmp_filters = vec![CmpFilter {
        left: 0,
        right: 1,
        op: CmpOp::Eq,
        exchange: false,
    }];
    node.vars = vec![(0, "A_id".to_string())];
    node
}

/// Register per-id answers for the nested-loop probe of B.
fn register_probes(txn: &MockTransaction, left_ids: impl IntoIterator<Item = i64>, b: &[Row]) {
    for id in left_ids {
        let rows = b.iter().filter(|r| r[1] == int(id)).cloned().collect();
        txn.add_query(
            format!("select B.name, B.id from sbtest.B0 as B where B.id = {id}"),
            result(&["name", "id"], rows),
        );
    }
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_key(|r| format!("{r:?}"));
    rows
}

#[test]
fn test_sort_merge_join() {
    let txn = MockTransaction::new();
    txn.add_query(SELECT_A, result(&["id", "name"], a_rows()));
    txn.add_query(SELECT_B, result(&["name", "id"], b_rows()));
    let plan = PlanNode::Join(equi_join(
        merge(SELECT_A, "backend0"),
        merge(SELECT_B, "backend0"),
        JoinStrategy::SortMerge,
    ));

    let res = execute_plan(&plan, &txn).unwrap();
    assert_eq!(res.rows, vec![vec![int(3), "go".into()], vec![int(5), "lang".into()]]);
    assert_eq!(res.fields, fields(&["id", "name"]));
}

#[test]
fn test_nested_loop_join() {
    let txn = MockTransaction::new();
    txn.add_query(SELECT_A, result(&["id", "name"], a_rows()));
    register_probes(&txn, [3, 4, 5], &b_rows());
    let plan = PlanNode::Join(equi_join(
        template(SELECT_A, "backend0"),
        template(SELECT_B_BY_ID, "backend0"),
        JoinStrategy::NestedLoop,
    ));

    let res = execute_plan(&plan, &txn).unwrap();
    assert_eq!(res.rows, vec![vec![int(3), "go".into()], vec![int(5), "lang".into()]]);
    assert_eq!(res.fields, fields(&["id", "name"]));
    assert_eq!(
        txn.executed_queries(),
        vec![
            SELECT_A.to_string(),
            "select B.name, B.id from sbtest.B0 as B where B.id = 3".to_string(),
            "select B.name, B.id from sbtest.B0 as B where B.id = 4".to_string(),
            "select B.name, B.id from sbtest.B0 as B where B.id = 5".to_string(),
        ]
    );
}

#[test]
fn test_sort_merge_matches_nested_loop() {
    let a: Vec<Row> = (0..30).map(|i| vec![int((i * 7) % 10), format!("a{i}").into()]).collect();
    let b: Vec<Row> = (0..20).map(|i| vec![format!("b{i}").into(), int((i * 3) % 12)]).collect();

    for left_join in [false, true] {
        let txn = MockTransaction::new();
        txn.add_query(SELECT_A, result(&["id", "name"], a.clone()));
        txn.add_query(SELECT_B, result(&["name", "id"], b.clone()));
        register_probes(&txn, 0..10, &b);

        let mut sm = equi_join(
            merge(SELECT_A, "backend0"),
            merge(SELECT_B, "backend1"),
            JoinStrategy::SortMerge,
        );
        sm.is_left_join = left_join;
        let mut nl = equi_join(
            template(SELECT_A, "backend0"),
            template(SELECT_B_BY_ID, "backend1"),
            JoinStrategy::NestedLoop,
        );
        nl.is_left_join = left_join;

        let sm = execute_plan(&PlanNode::Join(sm), &txn).unwrap();
        let nl = execute_plan(&PlanNode::Join(nl), &txn).unwrap();
        assert!(!sm.rows.is_empty());
        assert_eq!(sorted(sm.rows), sorted(nl.rows), "left_join={left_join}");
    }
}

#[test]
fn test_row_ceiling() {
    let txn = MockTransaction::new();
    txn.add_query(SELECT_A, result(&["id", "name"], a_rows()));
    txn.add_query(SELECT_B, result(&["name", "id"], b_rows()));
    let mut node = JoinNode::new(
        merge(SELECT_A, "backend0"),
        merge(SELECT_B, "backend0"),
        JoinStrategy::Cartesian,
    );
    node.cols = vec![JoinColumn::Left(1), JoinColumn::Right(0)];
    let plan = PlanNode::Join(node);

    txn.set_max_join_rows(6);
    assert_eq!(execute_plan(&plan, &txn).unwrap().rows.len(), 6);

    txn.set_max_join_rows(5);
    let err = execute_plan(&plan, &txn).unwrap_err();
    assert!(err
        .to_string()
        .contains("join.row.count.exceeded.allowed.limit.of.'5'"));
}

#[test]
fn test_nested_loop_row_ceiling() {
    let txn = MockTransaction::new();
    txn.add_query(SELECT_A, result(&["id", "name"], a_rows()));
    register_probes(&txn, [3, 4, 5], &b_rows());
    txn.set_max_join_rows(1);
    let plan = PlanNode::Join(equi_join(
        template(SELECT_A, "backend0"),
        template(SELECT_B_BY_ID, "backend0"),
        JoinStrategy::NestedLoop,
    ));
    let err = execute_plan(&plan, &txn).unwrap_err();
    assert_eq!(err.to_string(), "unsupported: join.row.count.exceeded.allowed.limit.of.'1'");
}

#[test]
fn test_empty_right_pads_only_plain_left_join() {
    let txn = MockTransaction::new();
    txn.add_query(SELECT_A, result(&["id", "name"], a_rows()));
    txn.add_query(SELECT_B, result(&["name", "id"], Vec::new()));
    let build = |left_join: bool, right_filter: bool| {
        let mut node = equi_join(
            merge(SELECT_A, "backend0"),
            merge(SELECT_B, "backend0"),
            JoinStrategy::SortMerge,
        );
        node.is_left_join = left_join;
        node.has_right_filter = right_filter;
        PlanNode::Join(node)
    };

    let res = execute_plan(&build(true, false), &txn).unwrap();
    assert_eq!(
        res.rows,
        vec![
            vec![int(3), Value::Null],
            vec![int(4), Value::Null],
            vec![int(5), Value::Null],
        ]
    );
    assert!(execute_plan(&build(true, true), &txn).unwrap().rows.is_empty());
    assert!(execute_plan(&build(false, false), &txn).unwrap().rows.is_empty());
}

#[test]
fn test_nested_loop_left_join_gating() {
    let txn = MockTransaction::new();
    // third column is a hoisted left-only condition
    txn.add_query(
        SELECT_A,
        result(
            &["id", "name", "cond"],
            vec![
                vec![int(3), "go".into(), int(0)],
                vec![int(5), "nice".into(), int(1)],
            ],
        ),
    );
    register_probes(&txn, [3, 5], &b_rows());
    let mut node = equi_join(
        template(SELECT_A, "backend0"),
        template(SELECT_B_BY_ID, "backend0"),
        JoinStrategy::NestedLoop,
    );
    node.is_left_join = true;
    node.left_tmp_cols = vec![2];
    node.sub_plan = vec![SubPlanOp::OrderBy(vec![OrderKey::desc(0)])];

    let res = execute_plan(&PlanNode::Join(node), &txn).unwrap();
    assert_eq!(res.rows, vec![vec![int(5), "lang".into()], vec![int(3), Value::Null]]);
    // the gated row never probes the right side
    assert_eq!(txn.executed_queries().len(), 2);
}

#[test]
fn test_union_dedup_keeps_first() {
    let txn = MockTransaction::new();
    let ids = vec![vec![int(1)], vec![int(2)], vec![int(1)]];
    txn.add_query("select id from t1", result(&["id"], ids));
    txn.add_query("select id from t2", result(&["id"], vec![vec![int(3)], vec![int(2)]]));
    let union = |t| {
        PlanNode::Union(UnionNode::new(
            merge("select id from t1", "backend0"),
            merge("select id from t2", "backend1"),
            t,
        ))
    };

    let res = execute_plan(&union(UnionType::Union), &txn).unwrap();
    assert_eq!(res.rows, vec![vec![int(1)], vec![int(2)], vec![int(3)]]);
    let res = execute_plan(&union(UnionType::UnionDistinct), &txn).unwrap();
    assert_eq!(res.rows.len(), 3);
    let res = execute_plan(&union(UnionType::UnionAll), &txn).unwrap();
    assert_eq!(res.rows.len(), 5);
}

#[test]
fn test_union_column_mismatch() {
    let txn = MockTransaction::new();
    txn.add_query("select id from t1", result(&["id"], vec![vec![int(1)]]));
    txn.add_query(
        "select id, name from t2",
        result(&["id", "name"], vec![vec![int(1), "x".into()]]),
    );
    let plan = PlanNode::Union(UnionNode::new(
        merge("select id from t1", "backend0"),
        merge("select id, name from t2", "backend0"),
        UnionType::UnionAll,
    ));
    let err = execute_plan(&plan, &txn).unwrap_err();
    assert!(err.to_string().contains("different number of columns"));
    assert_eq!(err.mysql_code(), 1222);
}

#[test]
fn test_left_error_wins() {
    let txn = MockTransaction::new();
    txn.add_query_error(SELECT_A, "left.broken");
    txn.add_query_error(SELECT_B, "right.broken");
    let plan = PlanNode::Join(equi_join(
        merge(SELECT_A, "backend0"),
        merge(SELECT_B, "backend0"),
        JoinStrategy::SortMerge,
    ));
    for _ in 0..10 {
        let err = execute_plan(&plan, &txn).unwrap_err();
        assert!(err.to_string().contains("left.broken"), "{err}");
    }

    let txn = MockTransaction::new();
    txn.add_query(SELECT_A, result(&["id", "name"], a_rows()));
    txn.add_query_error(SELECT_B, "right.broken");
    let err = execute_plan(&plan, &txn).unwrap_err();
    assert!(err.to_string().contains("right.broken"));
}

#[test]
fn test_union_under_nested_loop_is_internal_bug() {
    let txn = MockTransaction::new();
    txn.add_query(SELECT_A, result(&["id", "name"], a_rows()));
    let union = PlanNode::Union(UnionNode::new(
        template(SELECT_B_BY_ID, "backend0"),
        template(SELECT_B_BY_ID, "backend1"),
        UnionType::UnionAll,
    ));
    let plan = PlanNode::Join(equi_join(
        template(SELECT_A, "backend0"),
        union,
        JoinStrategy::NestedLoop,
    ));
    let err = execute_plan(&plan, &txn).unwrap_err();
    assert!(err.is_internal_bug());
    assert!(matches!(err, SpireError::InternalBug { .. }));
}

#[test]
fn test_scatter_merge_uses_raw_query() {
    let txn = MockTransaction::new();
    txn.add_query("select count(*) from t", result(&["c"], vec![vec![int(2)], vec![int(3)]]));
    let plan = PlanNode::Merge(MergeNode {
        req_mode: RequestMode::Scatter,
        raw_query: "select count(*) from t".into(),
        sub_plan: vec![SubPlanOp::Aggregate {
            group_by: Vec::new(),
            aggs: vec![crate::operator::AggSpec::new(crate::operator::AggFunc::Count, 0)],
        }],
        ..Default::default()
    });
    let res = execute_plan(&plan, &txn).unwrap();
    assert_eq!(res.rows, vec![vec![int(5)]]);
    assert_eq!(txn.requests()[0].mode, RequestMode::Scatter);
}
