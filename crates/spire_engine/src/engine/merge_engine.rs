use spire_common::error::SpireResult;
use spire_common::request_context::{RequestContext, RequestMode, TxnMode};
use spire_common::SpireError;

use super::{PlanEngine, ResultContext};
use crate::operator::exec_sub_plan;
use crate::plan::{BindVars, MergeNode};
use crate::txn::Transaction;

/// Leaf engine: the only one that sends queries to backends.
pub struct MergeEngine<'a> {
    node: &'a MergeNode,
    txn: &'a dyn Transaction,
}

impl<'a> MergeEngine<'a> {
    pub fn new(node: &'a MergeNode, txn: &'a dyn Transaction) -> Self {
        Self { node, txn }
    }

    fn request(&self) -> RequestContext {
        let req = RequestContext::new()
            .with_mode(self.node.req_mode)
            .with_txn_mode(TxnMode::Read);
        match self.node.req_mode {
            RequestMode::Normal => req.with_querys(self.node.querys.clone()),
            RequestMode::Scatter | RequestMode::Single => {
                req.with_raw_query(self.node.raw_query.clone())
            }
        }
    }
}

impl PlanEngine for MergeEngine<'_> {
    fn execute(&self, ctx: &mut ResultContext) -> SpireResult<()> {
        let req = self.request();
        tracing::debug!(
            request_id = req.request_id,
            mode = ?req.mode,
            querys = req.querys.len(),
            "merge engine dispatch"
        );
        ctx.results = self.txn.execute(&req)?;
        exec_sub_plan(&self.node.sub_plan, &mut ctx.results)
    }

    fn exec_bind_vars(
        &self,
        ctx: &mut ResultContext,
        bind_vars: &BindVars,
        want_fields: bool,
    ) -> SpireResult<()> {
        // a leaf without templates does not depend on the bindings
        let req = if self.node.parsed_querys.is_empty() {
            self.request()
        } else {
            let querys = self
                .node
                .parsed_querys
                .iter()
                .map(|pq| Ok(pq.to_tuple(pq.generate_query(bind_vars, None)?)))
                .collect::<SpireResult<Vec<_>>>()?;
            RequestContext::new()
                .with_txn_mode(TxnMode::Read)
                .with_querys(querys)
        };
        tracing::debug!(
            request_id = req.request_id,
            querys = req.querys.len(),
            "merge engine bind dispatch"
        );
        let mut res = self.txn.execute(&req)?;
        if !want_fields {
            res.fields.clear();
        }
        ctx.results = res;
        exec_sub_plan(&self.node.sub_plan, &mut ctx.results)
    }

    fn get_fields(&self, ctx: &mut ResultContext, _bind_vars: &BindVars) -> SpireResult<()> {
        let req = match self.node.parsed_querys.first() {
            Some(pq) => RequestContext::new()
                .with_txn_mode(TxnMode::Read)
                .with_querys(vec![pq.to_tuple(pq.generate_field_query())]),
            None if self.node.querys.is_empty() && self.node.raw_query.is_empty() => {
                return Err(SpireError::internal_bug(
                    "E-MERGE-001",
                    "merge node has no query for field discovery",
                    format!("mode={:?}", self.node.req_mode),
                ));
            }
            None => self.request(),
        };
        let res = self.txn.execute(&req)?;
        ctx.results.fields = res.fields;
        ctx.results.rows.clear();
        Ok(())
    }
}
