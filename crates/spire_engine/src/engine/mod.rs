//! Engine tree built 1:1 from a plan tree.
//!
//! Engines borrow their plan node and the transaction for the duration of one
//! execution and are discarded afterwards.

mod join_engine;
mod merge_engine;
pub mod merge_join;
mod union_engine;

#[cfg(test)]
mod tests;

use spire_common::error::SpireResult;
use spire_common::{QueryResult, SpireError};

use crate::plan::{BindVars, PlanNode};
use crate::txn::Transaction;

pub use join_engine::JoinEngine;
pub use merge_engine::MergeEngine;
pub use union_engine::UnionEngine;

/// Holder for the result of one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct ResultContext {
    pub results: QueryResult,
}

impl ResultContext {
    pub fn new() -> Self {
        Self::default()
    }
}

pub trait PlanEngine: Send + Sync {
    /// Execute the subtree and leave its rows in `ctx.results`.
    fn execute(&self, ctx: &mut ResultContext) -> SpireResult<()>;

    /// Execute with bind variables supplied by a driving nested-loop join.
    /// Fields are only produced when `want_fields` is set.
    fn exec_bind_vars(
        &self,
        ctx: &mut ResultContext,
        bind_vars: &BindVars,
        want_fields: bool,
    ) -> SpireResult<()>;

    /// Result-set fields without fetching rows.
    fn get_fields(&self, ctx: &mut ResultContext, bind_vars: &BindVars) -> SpireResult<()>;
}

pub fn build_engine<'a>(plan: &'a PlanNode, txn: &'a dyn Transaction) -> Box<dyn PlanEngine + 'a> {
    match plan {
        PlanNode::Merge(node) => Box::new(MergeEngine::new(node, txn)),
        PlanNode::Join(node) => Box::new(JoinEngine::new(
            node,
            build_engine(&node.left, txn),
            build_engine(&node.right, txn),
            txn,
        )),
        PlanNode::Union(node) => Box::new(UnionEngine::new(
            node,
            build_engine(&node.left, txn),
            build_engine(&node.right, txn),
        )),
    }
}

/// Execute a plan tree and return its result.
pub fn execute_plan(plan: &PlanNode, txn: &dyn Transaction) -> SpireResult<QueryResult> {
    let engine = build_engine(plan, txn);
    let mut ctx = ResultContext::new();
    engine.execute(&mut ctx)?;
    Ok(ctx.results)
}

/// Execute both children in parallel. Both always run to completion; if both
/// fail, the left error is returned.
pub(crate) fn execute_pair(
    left: &dyn PlanEngine,
    right: &dyn PlanEngine,
) -> SpireResult<(QueryResult, QueryResult)> {
    let run = |engine: &dyn PlanEngine| -> SpireResult<QueryResult> {
        let mut ctx = ResultContext::new();
        engine.execute(&mut ctx)?;
        Ok(ctx.results)
    };
    let (l, r) = std::thread::scope(|s| {
        let lh = s.spawn(|| run(left));
        let rh = s.spawn(|| run(right));
        (join_branch(lh.join(), "left"), join_branch(rh.join(), "right"))
    });
    match (l, r) {
        (Ok(l), Ok(r)) => Ok((l, r)),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

fn join_branch<T>(
    joined: std::thread::Result<SpireResult<T>>,
    side: &'static str,
) -> SpireResult<T> {
    joined.unwrap_or_else(|_| {
        Err(SpireError::internal_bug(
            "E-ENGINE-001",
            format!("{side} branch panicked"),
            "std::thread::ScopedJoinHandle returned Err",
        ))
    })
}
