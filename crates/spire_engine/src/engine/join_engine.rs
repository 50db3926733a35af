use spire_common::error::{ExecutionError, SpireResult};
use spire_common::{Field, QueryResult, Value};

use super::merge_join::{
    is_padding_row, join_fields, join_rows, left_row_passes, push_row, MergeJoiner,
};
use super::{execute_pair, PlanEngine, ResultContext};
use crate::operator::exec_sub_plan;
use crate::plan::{BindVars, JoinNode, JoinStrategy};
use crate::txn::Transaction;

pub struct JoinEngine<'a> {
    node: &'a JoinNode,
    left: Box<dyn PlanEngine + 'a>,
    right: Box<dyn PlanEngine + 'a>,
    txn: &'a dyn Transaction,
}

impl<'a> JoinEngine<'a> {
    pub fn new(
        node: &'a JoinNode,
        left: Box<dyn PlanEngine + 'a>,
        right: Box<dyn PlanEngine + 'a>,
        txn: &'a dyn Transaction,
    ) -> Self {
        Self {
            node,
            left,
            right,
            txn,
        }
    }

    fn bind_left_row(&self, bind_vars: &BindVars, lrow: &[Value]) -> SpireResult<BindVars> {
        let mut vars = bind_vars.clone();
        for (index, name) in &self.node.vars {
            let value = lrow.get(*index).cloned().ok_or(ExecutionError::ColumnOutOfBounds {
                index: *index,
                width: lrow.len(),
            })?;
            vars.insert(name.clone(), value);
        }
        Ok(vars)
    }
}

impl PlanEngine for JoinEngine<'_> {
    fn execute(&self, ctx: &mut ResultContext) -> SpireResult<()> {
        if self.node.strategy == JoinStrategy::NestedLoop {
            return self.exec_bind_vars(ctx, &BindVars::new(), true);
        }

        let maxrow = self.txn.max_join_rows();
        let (lres, rres) = execute_pair(&*self.left, &*self.right)?;
        tracing::debug!(
            strategy = ?self.node.strategy,
            left_rows = lres.rows.len(),
            right_rows = rres.rows.len(),
            maxrow,
            "join inputs fetched"
        );
        let fields = join_fields(&lres.fields, &rres.fields, &self.node.cols)?;
        let joiner = MergeJoiner::new(self.node, maxrow);
        let rows = if rres.rows.is_empty() {
            let mut out = Vec::new();
            joiner.concat_left_and_nil(&lres.rows, &mut out)?;
            out
        } else if self.node.strategy == JoinStrategy::SortMerge {
            joiner.sort_merge_join(lres.rows, rres.rows)?
        } else {
            joiner.cartesian_product(&lres.rows, &rres.rows)?
        };

        ctx.results = QueryResult::new(fields, rows);
        exec_sub_plan(&self.node.sub_plan, &mut ctx.results)
    }

    fn exec_bind_vars(
        &self,
        ctx: &mut ResultContext,
        bind_vars: &BindVars,
        want_fields: bool,
    ) -> SpireResult<()> {
        let maxrow = self.txn.max_join_rows();
        let mut lctx = ResultContext::new();
        self.left.exec_bind_vars(&mut lctx, bind_vars, want_fields)?;
        let lres = lctx.results;

        // right-side fields are taken from the first probe that runs
        let mut rfields: Option<Vec<Field>> = None;
        let mut rows = Vec::new();
        for lrow in &lres.rows {
            let mut matched = false;
            if left_row_passes(self.node, lrow) {
                let vars = self.bind_left_row(bind_vars, lrow)?;
                let need_fields = want_fields && rfields.is_none();
                let mut rctx = ResultContext::new();
                self.right.exec_bind_vars(&mut rctx, &vars, need_fields)?;
                if need_fields {
                    rfields = Some(std::mem::take(&mut rctx.results.fields));
                }
                for rrow in &rctx.results.rows {
                    if is_padding_row(self.node, rrow) {
                        continue;
                    }
                    matched = true;
                    push_row(&mut rows, join_rows(lrow, Some(rrow), &self.node.cols)?, maxrow)?;
                }
            }
            if !matched && self.node.pads_unmatched() {
                push_row(&mut rows, join_rows(lrow, None, &self.node.cols)?, maxrow)?;
            }
        }

        let mut res = QueryResult::new(Vec::new(), rows);
        if want_fields {
            let rfields = match rfields {
                Some(fields) => fields,
                None => {
                    let mut fctx = ResultContext::new();
                    self.right.get_fields(&mut fctx, bind_vars)?;
                    fctx.results.fields
                }
            };
            res.fields = join_fields(&lres.fields, &rfields, &self.node.cols)?;
        }
        ctx.results = res;
        exec_sub_plan(&self.node.sub_plan, &mut ctx.results)
    }

    fn get_fields(&self, ctx: &mut ResultContext, bind_vars: &BindVars) -> SpireResult<()> {
        let mut lctx = ResultContext::new();
        self.left.get_fields(&mut lctx, bind_vars)?;
        let mut rctx = ResultContext::new();
        self.right.get_fields(&mut rctx, bind_vars)?;
        ctx.results = QueryResult::new(
            join_fields(&lctx.results.fields, &rctx.results.fields, &self.node.cols)?,
            Vec::new(),
        );
        Ok(())
    }
}
