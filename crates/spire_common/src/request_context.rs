//! Per-request context handed to the backend transaction layer.
//!
//! A request is either a list of physical per-shard queries (`querys`) or a
//! single raw query string broadcast by the transaction (`raw_query`).
//! Every request carries a process-unique `request_id` for log correlation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Global monotonic request ID counter.
static GLOBAL_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new unique request ID.
pub fn next_request_id() -> u64 {
    GLOBAL_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// How the transaction should dispatch the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestMode {
    /// Execute `querys`, each on its own backend.
    #[default]
    Normal,
    /// Execute `raw_query` on every backend.
    Scatter,
    /// Execute `raw_query` on one backend chosen by the transaction.
    Single,
}

/// Transaction access mode for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxnMode {
    #[default]
    Read,
    Write,
}

/// One physical query bound to one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTuple {
    pub query: String,
    pub backend: String,
    /// Display form of the segment's key range, for logs only.
    pub range: String,
}

impl QueryTuple {
    pub fn new(
        query: impl Into<String>,
        backend: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            backend: backend.into(),
            range: range.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: u64,
    pub mode: RequestMode,
    pub txn_mode: TxnMode,
    pub querys: Vec<QueryTuple>,
    pub raw_query: String,
    /// When this request was built.
    pub started_at: Instant,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Create a new request context with a fresh ID.
    pub fn new() -> Self {
        Self {
            request_id: next_request_id(),
            mode: RequestMode::Normal,
            txn_mode: TxnMode::Read,
            querys: Vec::new(),
            raw_query: String::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_txn_mode(mut self, txn_mode: TxnMode) -> Self {
        self.txn_mode = txn_mode;
        self
    }

    pub fn with_querys(mut self, querys: Vec<QueryTuple>) -> Self {
        self.querys = querys;
        self
    }

    pub fn with_raw_query(mut self, raw_query: impl Into<String>) -> Self {
        self.raw_query = raw_query.into();
        self
    }

    /// Elapsed time since the request was built, in microseconds.
    pub fn elapsed_us(&self) -> u64 {
        self.started_at.elapsed().as_micros() as u64
    }

    /// Format as a structured context string for log/error messages.
    pub fn as_context_str(&self) -> String {
        format!(
            "request_id={}, mode={:?}, txn_mode={:?}, querys={}",
            self.request_id,
            self.mode,
            self.txn_mode,
            self.querys.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new();
        let b = RequestContext::new();
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.txn_mode, TxnMode::Read);
    }

    #[test]
    fn test_builder() {
        let ctx = RequestContext::new()
            .with_mode(RequestMode::Scatter)
            .with_raw_query("select 1");
        assert_eq!(ctx.mode, RequestMode::Scatter);
        assert_eq!(ctx.raw_query, "select 1");
        assert!(ctx.as_context_str().contains("mode=Scatter"));
    }
}
