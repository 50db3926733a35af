//! Per-scheme key ranges carried by a [`Segment`](crate::partition::Segment).
//!
//! Each scheme owns its own range type; only hash ranges have an ordering.

use std::any::Any;
use std::fmt;

/// Range of keys owned by one segment.
pub trait KeyRange: fmt::Debug + fmt::Display + Send + Sync {
    /// Sort order between ranges of the same scheme. Ranges of different
    /// schemes never compare less.
    fn less(&self, other: &dyn KeyRange) -> bool;

    fn as_any(&self) -> &dyn Any;

    /// JSON form used by the router introspection output. `Null` is omitted.
    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Half-open slot interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashRange {
    pub start: usize,
    pub end: usize,
}

impl HashRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, slot: usize) -> bool {
        slot >= self.start && slot < self.end
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{})", self.start, self.end)
    }
}

impl KeyRange for HashRange {
    fn less(&self, other: &dyn KeyRange) -> bool {
        other
            .as_any()
            .downcast_ref::<HashRange>()
            .is_some_and(|o| self.start < o.start)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "Start": self.start, "End": self.end })
    }
}

/// Discriminator of a list segment. Unordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRange {
    pub value: String,
}

impl ListRange {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl fmt::Display for ListRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl KeyRange for ListRange {
    fn less(&self, _other: &dyn KeyRange) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Range of a replicated global table: every replica holds every key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalRange;

impl fmt::Display for GlobalRange {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl KeyRange for GlobalRange {
    fn less(&self, _other: &dyn KeyRange) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Range of an unsharded table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleRange;

impl fmt::Display for SingleRange {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl KeyRange for SingleRange {
    fn less(&self, _other: &dyn KeyRange) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
