use std::collections::HashSet;

use spire_common::error::{ExecutionError, SpireResult};
use spire_common::value::encode_row_key;
use spire_common::SpireError;

use super::{execute_pair, PlanEngine, ResultContext};
use crate::operator::exec_sub_plan;
use crate::plan::{BindVars, UnionNode};

pub struct UnionEngine<'a> {
    node: &'a UnionNode,
    left: Box<dyn PlanEngine + 'a>,
    right: Box<dyn PlanEngine + 'a>,
}

impl<'a> UnionEngine<'a> {
    pub fn new(
        node: &'a UnionNode,
        left: Box<dyn PlanEngine + 'a>,
        right: Box<dyn PlanEngine + 'a>,
    ) -> Self {
        Self { node, left, right }
    }
}

impl PlanEngine for UnionEngine<'_> {
    fn execute(&self, ctx: &mut ResultContext) -> SpireResult<()> {
        let (mut lres, rres) = execute_pair(&*self.left, &*self.right)?;
        if lres.fields.len() != rres.fields.len() {
            return Err(ExecutionError::UnionColumnMismatch {
                left: lres.fields.len(),
                right: rres.fields.len(),
            }
            .into());
        }
        lres.append(rres);
        if self.node.union_type.dedups() {
            let mut seen = HashSet::with_capacity(lres.rows.len());
            lres.rows.retain(|row| seen.insert(encode_row_key(row)));
        }
        ctx.results = lres;
        exec_sub_plan(&self.node.sub_plan, &mut ctx.results)
    }

    fn exec_bind_vars(
        &self,
        _ctx: &mut ResultContext,
        _bind_vars: &BindVars,
        _want_fields: bool,
    ) -> SpireResult<()> {
        Err(SpireError::internal_bug(
            "E-UNION-001",
            "union engine driven by bind variables",
            format!("union_type={:?}", self.node.union_type),
        ))
    }

    fn get_fields(&self, _ctx: &mut ResultContext, _bind_vars: &BindVars) -> SpireResult<()> {
        Err(SpireError::internal_bug(
            "E-UNION-002",
            "union engine asked for fields",
            format!("union_type={:?}", self.node.union_type),
        ))
    }
}
