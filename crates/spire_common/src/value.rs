use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single column value as returned by a MySQL-compatible backend.
/// `Decimal` keeps the backend's text form to avoid lossy rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int64(i64),
    Uint64(u64),
    Float64(f64),
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
}

/// A row is an ordered list of values.
pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int64(_) | Value::Uint64(_) | Value::Float64(_) | Value::Decimal(_)
        )
    }

    /// MySQL text-protocol encoding of the value. `None` for NULL.
    pub fn raw(&self) -> Option<Vec<u8>> {
        match self {
            Value::Null => None,
            Value::Int64(v) => Some(v.to_string().into_bytes()),
            Value::Uint64(v) => Some(v.to_string().into_bytes()),
            Value::Float64(v) => Some(v.to_string().into_bytes()),
            Value::Decimal(s) | Value::Text(s) => Some(s.as_bytes().to_vec()),
            Value::Bytes(b) => Some(b.clone()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Uint64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Decimal(s) | Value::Text(s) => s.trim().parse().ok(),
            Value::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// MySQL truthiness: NULL and zero are false, strings are coerced to numbers.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int64(v) => *v != 0,
            Value::Uint64(v) => *v != 0,
            Value::Float64(v) => *v != 0.0,
            other => other.as_f64().is_some_and(|f| f != 0.0),
        }
    }

    /// Render as a SQL literal for bind-variable substitution.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Uint64(v) => v.to_string(),
            Value::Float64(v) => v.to_string(),
            Value::Decimal(s) => s.clone(),
            Value::Text(s) => quote_sql(s.as_bytes()),
            Value::Bytes(b) => quote_sql(b),
        }
    }
}

fn quote_sql(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('\'');
    for ch in String::from_utf8_lossy(bytes).chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Uint64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(s) | Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Three-way comparison where NULL sorts before everything and two NULLs
/// compare equal. Numeric pairs compare by value, everything else by raw bytes.
/// NaN sorts after every other number.
///
/// Callers that need SQL equality semantics must check `is_null()` separately:
/// `Equal` here does not mean `NULL = NULL` is true.
pub fn null_safe_compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Uint64(x), Value::Uint64(y)) => x.cmp(y),
        (Value::Int64(x), Value::Uint64(y)) => (*x as i128).cmp(&(*y as i128)),
        (Value::Uint64(x), Value::Int64(y)) => (*x as i128).cmp(&(*y as i128)),
        _ if a.is_numeric() && b.is_numeric() => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .unwrap_or_else(|| x.is_nan().cmp(&y.is_nan())),
            _ => raw_cmp(a, b),
        },
        _ => raw_cmp(a, b),
    }
}

fn raw_cmp(a: &Value, b: &Value) -> Ordering {
    a.raw().unwrap_or_default().cmp(&b.raw().unwrap_or_default())
}

/// Encode a row into a deterministic binary key for hash-based dedup.
/// Each value is prefixed with a type tag byte and a length, so column
/// boundaries and NULLs never collide.
pub fn encode_row_key(row: &[Value]) -> Vec<u8> {
    let mut key = Vec::with_capacity(row.len() * 9);
    for value in row {
        match value.raw() {
            None => key.push(0),
            Some(raw) => {
                key.push(1);
                key.extend_from_slice(&(raw.len() as u32).to_be_bytes());
                key.extend_from_slice(&raw);
            }
        }
    }
    key
}

/// MySQL column type of a result field, as far as routing cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnType {
    #[default]
    Null,
    Int64,
    Uint64,
    Float64,
    Decimal,
    VarChar,
    Blob,
}

/// Result-set column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub table: String,
    pub column_type: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, table: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            column_type,
        }
    }
}

/// A result set: column metadata plus rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub insert_id: u64,
}

impl QueryResult {
    pub fn new(fields: Vec<Field>, rows: Vec<Row>) -> Self {
        Self {
            fields,
            rows,
            ..Default::default()
        }
    }

    /// Append another shard's result: rows are concatenated, counters summed,
    /// fields taken from whichever side has them.
    pub fn append(&mut self, other: QueryResult) {
        if self.fields.is_empty() {
            self.fields = other.fields;
        }
        self.rows.extend(other.rows);
        self.rows_affected += other.rows_affected;
        self.insert_id = self.insert_id.max(other.insert_id);
    }
}
