//! Plan nodes consumed by the engine tree.
//!
//! The planner builds these from the parsed statement and the router's
//! segments; the engine only reads them.

use std::collections::BTreeMap;

use spire_common::error::{ExecutionError, SpireResult};
use spire_common::request_context::{QueryTuple, RequestMode};
use spire_common::Value;

use crate::operator::SubPlanOp;

/// Named bind variables for parameterized queries.
pub type BindVars = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub enum PlanNode {
    Merge(MergeNode),
    Join(JoinNode),
    Union(UnionNode),
}

/// Leaf node: queries pushed down to backends.
#[derive(Debug, Clone, Default)]
pub struct MergeNode {
    /// Precomputed per-segment queries, used in `Normal` mode.
    pub querys: Vec<QueryTuple>,
    /// Parameterized per-segment queries, used when driven by a nested-loop join.
    pub parsed_querys: Vec<ParsedQuery>,
    pub req_mode: RequestMode,
    /// Query text for `Scatter` and `Single` modes.
    pub raw_query: String,
    pub sub_plan: Vec<SubPlanOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Right side re-executed per left row with bind variables.
    NestedLoop,
    /// Both sides fetched, sorted on the join keys and merged.
    SortMerge,
    /// Both sides fetched, full product.
    Cartesian,
}

/// Source of one output column of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinColumn {
    Left(usize),
    Right(usize),
}

/// A join key column of one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    pub field: String,
    pub table: String,
    /// Position in that side's row.
    pub index: usize,
}

impl JoinKey {
    pub fn new(field: impl Into<String>, table: impl Into<String>, index: usize) -> Self {
        Self {
            field: field.into(),
            table: table.into(),
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    /// `<=>`: NULL-safe equality.
    NullSafeEq,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
            CmpOp::Ne => "!=",
            CmpOp::NullSafeEq => "<=>",
        }
    }
}

/// `left_row[left] <op> right_row[right]`, or the reverse when `exchange`
/// is set (the condition was written right-op-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmpFilter {
    pub left: usize,
    pub right: usize,
    pub op: CmpOp,
    pub exchange: bool,
}

#[derive(Debug, Clone)]
pub struct JoinNode {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub strategy: JoinStrategy,
    /// Output projection.
    pub cols: Vec<JoinColumn>,
    pub left_keys: Vec<JoinKey>,
    pub right_keys: Vec<JoinKey>,
    pub cmp_filters: Vec<CmpFilter>,
    /// Left-row columns holding hoisted left-only ON conditions. A falsy value
    /// means the row cannot match.
    pub left_tmp_cols: Vec<usize>,
    /// Right-row columns that are NULL on padding rows.
    pub right_tmp_cols: Vec<usize>,
    /// Left column index bound to a bind variable of the right side.
    pub vars: Vec<(usize, String)>,
    pub is_left_join: bool,
    /// A WHERE condition on the right table, which turns unmatched rows away.
    pub has_right_filter: bool,
    pub sub_plan: Vec<SubPlanOp>,
}

impl JoinNode {
    pub fn new(left: PlanNode, right: PlanNode, strategy: JoinStrategy) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            strategy,
            cols: Vec::new(),
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            cmp_filters: Vec::new(),
            left_tmp_cols: Vec::new(),
            right_tmp_cols: Vec::new(),
            vars: Vec::new(),
            is_left_join: false,
            has_right_filter: false,
            sub_plan: Vec::new(),
        }
    }

    /// Unmatched left rows are emitted with a NULL right side.
    pub fn pads_unmatched(&self) -> bool {
        self.is_left_join && !self.has_right_filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionType {
    Union,
    UnionAll,
    UnionDistinct,
}

impl UnionType {
    pub fn dedups(&self) -> bool {
        !matches!(self, UnionType::UnionAll)
    }
}

#[derive(Debug, Clone)]
pub struct UnionNode {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub union_type: UnionType,
    pub sub_plan: Vec<SubPlanOp>,
}

impl UnionNode {
    pub fn new(left: PlanNode, right: PlanNode, union_type: UnionType) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            union_type,
            sub_plan: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Var(String),
}

/// A per-segment query template with `:name` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub query: String,
    pub backend: String,
    pub range: String,
    pieces: Vec<Piece>,
}

impl ParsedQuery {
    pub fn new(
        query: impl Into<String>,
        backend: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        let query = query.into();
        let pieces = parse_placeholders(&query);
        Self {
            query,
            backend: backend.into(),
            range: range.into(),
            pieces,
        }
    }

    /// Placeholder names in order of appearance.
    pub fn bind_names(&self) -> impl Iterator<Item = &str> {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Var(name) => Some(name.as_str()),
            Piece::Text(_) => None,
        })
    }

    /// Substitute every placeholder with its SQL literal and append `extras`.
    pub fn generate_query(
        &self,
        bind_vars: &BindVars,
        extras: Option<&str>,
    ) -> SpireResult<String> {
        let mut out = String::with_capacity(self.query.len() + 16);
        for piece in &self.pieces {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Var(name) => {
                    let value = bind_vars
                        .get(name)
                        .ok_or_else(|| ExecutionError::MissingBindVar(name.clone()))?;
                    out.push_str(&value.to_sql_literal());
                }
            }
        }
        if let Some(extras) = extras {
            out.push_str(extras);
        }
        Ok(out)
    }

    /// Bind every placeholder to NULL. Such a query returns field metadata
    /// and no rows.
    pub fn generate_field_query(&self) -> String {
        self.pieces
            .iter()
            .map(|p| match p {
                Piece::Text(t) => t.as_str(),
                Piece::Var(_) => "NULL",
            })
            .collect()
    }

    pub fn to_tuple(&self, query: String) -> QueryTuple {
        QueryTuple::new(query, &self.backend, &self.range)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Split on `:name` placeholders outside quoted strings and identifiers.
fn parse_placeholders(query: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut chars = query.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            text.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    text.push(next);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                text.push(c);
            }
            ':' if chars.peek().is_some_and(|&n| is_ident_start(n)) => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if !is_ident(n) {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                if !text.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut text)));
                }
                pieces.push(Piece::Var(name));
            }
            _ => text.push(c),
        }
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    pieces
}
