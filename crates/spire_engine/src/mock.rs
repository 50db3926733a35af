//! In-memory backend for engine tests.
//!
//! Queries are answered from a registered table: exact text first, then the
//! longest registered prefix. Unknown queries fail, so a test notices when
//! the engine sends something it did not expect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use spire_common::error::{ExecutionError, SpireResult};
use spire_common::request_context::{RequestContext, RequestMode};
use spire_common::QueryResult;

use crate::txn::Transaction;

const DEFAULT_MAX_JOIN_ROWS: usize = 32768;

pub struct MockTransaction {
    exact: RwLock<HashMap<String, QueryResult>>,
    prefixes: RwLock<Vec<(String, QueryResult)>>,
    errors: RwLock<HashMap<String, String>>,
    requests: Mutex<Vec<RequestContext>>,
    max_join_rows: AtomicUsize,
}

impl Default for MockTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransaction {
    pub fn new() -> Self {
        Self {
            exact: RwLock::new(HashMap::new()),
            prefixes: RwLock::new(Vec::new()),
            errors: RwLock::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            max_join_rows: AtomicUsize::new(DEFAULT_MAX_JOIN_ROWS),
        }
    }

    /// Answer `query` with `result`.
    pub fn add_query(&self, query: impl Into<String>, result: QueryResult) {
        self.exact.write().insert(query.into(), result);
    }

    /// Answer every query starting with `prefix` that has no exact entry.
    pub fn add_query_pattern(&self, prefix: impl Into<String>, result: QueryResult) {
        self.prefixes.write().push((prefix.into(), result));
    }

    /// Fail `query` with a backend error.
    pub fn add_query_error(&self, query: impl Into<String>, message: impl Into<String>) {
        self.errors.write().insert(query.into(), message.into());
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<RequestContext> {
        self.requests.lock().clone()
    }

    /// Every physical query text seen so far, in arrival order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .flat_map(|r| {
                if r.mode == RequestMode::Normal {
                    r.querys.iter().map(|q| q.query.clone()).collect::<Vec<_>>()
                } else {
                    vec![r.raw_query.clone()]
                }
            })
            .collect()
    }

    fn answer(&self, query: &str) -> SpireResult<QueryResult> {
        if let Some(msg) = self.errors.read().get(query) {
            return Err(ExecutionError::Backend(msg.clone()).into());
        }
        if let Some(res) = self.exact.read().get(query) {
            return Ok(res.clone());
        }
        self.prefixes
            .read()
            .iter()
            .filter(|(prefix, _)| query.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, res)| res.clone())
            .ok_or_else(|| ExecutionError::Backend(format!("mock.query[{query}].not.found")).into())
    }
}

impl Transaction for MockTransaction {
    fn execute(&self, req: &RequestContext) -> SpireResult<QueryResult> {
        self.requests.lock().push(req.clone());
        match req.mode {
            RequestMode::Normal => {
                let mut res = QueryResult::default();
                for tuple in &req.querys {
                    res.append(self.answer(&tuple.query)?);
                }
                Ok(res)
            }
            RequestMode::Scatter | RequestMode::Single => self.answer(&req.raw_query),
        }
    }

    fn max_join_rows(&self) -> usize {
        self.max_join_rows.load(Ordering::Relaxed)
    }

    fn set_max_join_rows(&self, max: usize) {
        self.max_join_rows.store(max, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_common::request_context::QueryTuple;
    use spire_common::{Field, Value};

    fn one_row(v: i64) -> QueryResult {
        QueryResult::new(vec![Field::default()], vec![vec![Value::Int64(v)]])
    }

    #[test]
    fn test_exact_then_longest_prefix() {
        let txn = MockTransaction::new();
        txn.add_query_pattern("select", one_row(1));
        txn.add_query_pattern("select a", one_row(2));
        txn.add_query("select a from t", one_row(3));

        let run = |q: &str| {
            let req = RequestContext::new().with_querys(vec![QueryTuple::new(q, "b0", "")]);
            txn.execute(&req).unwrap().rows[0][0].clone()
        };
        assert_eq!(run("select a from t"), Value::Int64(3));
        assert_eq!(run("select a from u"), Value::Int64(2));
        assert_eq!(run("select b from u"), Value::Int64(1));
        assert_eq!(txn.executed_queries().len(), 3);
    }

    #[test]
    fn test_normal_mode_appends_each_tuple() {
        let txn = MockTransaction::new();
        txn.add_query("q1", one_row(1));
        txn.add_query("q2", one_row(2));
        let req = RequestContext::new().with_querys(vec![
            QueryTuple::new("q1", "b0", ""),
            QueryTuple::new("q2", "b1", ""),
        ]);
        let res = txn.execute(&req).unwrap();
        assert_eq!(res.rows.len(), 2);
        assert_eq!(res.fields.len(), 1);
    }

    #[test]
    fn test_errors_and_unknown_queries() {
        let txn = MockTransaction::new();
        txn.add_query("q1", one_row(1));
        txn.add_query_error("q1", "boom");
        let req = RequestContext::new()
            .with_mode(RequestMode::Scatter)
            .with_raw_query("q1");
        assert_eq!(txn.execute(&req).unwrap_err().to_string(), "Backend error: boom");
        let req = RequestContext::new()
            .with_mode(RequestMode::Single)
            .with_raw_query("nope");
        assert!(txn.execute(&req).is_err());

        txn.set_max_join_rows(7);
        assert_eq!(txn.max_join_rows(), 7);
    }
}
