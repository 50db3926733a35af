//! Distributed plan execution.
//!
//! A plan tree of Merge/Join/Union nodes is turned into an engine tree
//! (`engine::build_engine`) and executed top-down against a [`Transaction`].
//! Merge leaves are the only engines that talk to backends; joins and unions
//! run their two children in parallel and combine the results in memory.

pub mod calc_pool;
pub mod engine;
pub mod mock;
pub mod operator;
pub mod plan;
pub mod txn;

pub use engine::{build_engine, execute_plan, PlanEngine, ResultContext};
pub use plan::{BindVars, JoinNode, MergeNode, ParsedQuery, PlanNode, UnionNode};
pub use txn::Transaction;
