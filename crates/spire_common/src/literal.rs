//! Shard-key literals as extracted from a query's WHERE clause by the planner.
//!
//! The router never sees parsed numbers: it receives the literal's SQL kind and
//! its source text, and each partition scheme decides how to interpret them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL literal kind as produced by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlValKind {
    Int,
    Float,
    Str,
    HexNum,
    HexVal,
    BitVal,
    ValArg,
}

impl fmt::Display for SqlValKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlValKind::Int => "IntVal",
            SqlValKind::Float => "FloatVal",
            SqlValKind::Str => "StrVal",
            SqlValKind::HexNum => "HexNum",
            SqlValKind::HexVal => "HexVal",
            SqlValKind::BitVal => "BitVal",
            SqlValKind::ValArg => "ValArg",
        };
        f.write_str(name)
    }
}

/// A literal shard-key bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SqlVal {
    pub kind: SqlValKind,
    pub text: String,
}

impl SqlVal {
    pub fn new(kind: SqlValKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn int(v: i64) -> Self {
        Self::new(SqlValKind::Int, v.to_string())
    }

    pub fn float(text: impl Into<String>) -> Self {
        Self::new(SqlValKind::Float, text)
    }

    pub fn str(text: impl Into<String>) -> Self {
        Self::new(SqlValKind::Str, text)
    }
}

impl fmt::Display for SqlVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SqlValKind::Str => write!(f, "'{}'", self.text),
            _ => write!(f, "{}", self.text),
        }
    }
}
