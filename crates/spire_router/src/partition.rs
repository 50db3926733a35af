use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use spire_common::config::{RouterConfig, ShardType, TableConfig};
use spire_common::error::RouterError;
use spire_common::SqlVal;

use crate::global::Global;
use crate::hash::Hash;
use crate::key_range::KeyRange;
use crate::list::List;
use crate::single::Single;

/// One physical shard: a physical table on a backend, with the key range it owns.
#[derive(Debug, Clone)]
pub struct Segment {
    pub table: String,
    pub backend: String,
    pub range: Arc<dyn KeyRange>,
    pub list_value: String,
}

impl Segment {
    pub fn new(
        table: impl Into<String>,
        backend: impl Into<String>,
        range: Arc<dyn KeyRange>,
    ) -> Self {
        Self {
            table: table.into(),
            backend: backend.into(),
            range,
            list_value: String::new(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}{}", self.table, self.backend, self.range)
    }
}

// Field names and omission follow the rule introspection format read by
// management tooling: empty strings and empty ranges are left out.
impl Serialize for Segment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let range = self.range.to_json();
        let mut len = 0;
        len += usize::from(!self.table.is_empty());
        len += usize::from(!self.backend.is_empty());
        len += usize::from(!range.is_null());
        len += usize::from(!self.list_value.is_empty());

        let mut s = serializer.serialize_struct("Segment", len)?;
        if !self.table.is_empty() {
            s.serialize_field("Table", &self.table)?;
        }
        if !self.backend.is_empty() {
            s.serialize_field("Backend", &self.backend)?;
        }
        if !range.is_null() {
            s.serialize_field("Range", &range)?;
        }
        if !self.list_value.is_empty() {
            s.serialize_field("ListValue", &self.list_value)?;
        }
        s.end()
    }
}

/// A table's partitioning scheme.
///
/// Built once from a [`TableConfig`]; after `build` succeeds the scheme is
/// read-only and shared between concurrent lookups.
pub trait Partition: fmt::Debug + Send + Sync {
    /// Validate the partition list and materialize segments.
    fn build(&mut self) -> Result<(), RouterError>;

    /// Drop all built state.
    fn clear(&mut self);

    fn partition_type(&self) -> ShardType;

    /// Segments that may hold keys in `[start, end]`. `None` on either side is
    /// an open range.
    fn lookup(
        &self,
        start: Option<&SqlVal>,
        end: Option<&SqlVal>,
    ) -> Result<Vec<Segment>, RouterError>;

    /// Index of the segment owning `val`.
    fn get_index(&self, val: &SqlVal) -> Result<usize, RouterError>;

    fn segments(&self) -> &[Segment];

    fn segment(&self, index: usize) -> Result<&Segment, RouterError> {
        let segments = self.segments();
        segments
            .get(index)
            .ok_or(RouterError::SegmentIndexOutOfRange {
                index,
                len: segments.len(),
            })
    }
}

/// Construct and build the scheme named by `conf.shard_type`. Unknown types
/// are an error.
pub fn build_partition(
    router_conf: &RouterConfig,
    conf: &TableConfig,
) -> Result<Box<dyn Partition>, RouterError> {
    let shard_type = ShardType::parse(&conf.shard_type)
        .ok_or_else(|| RouterError::UnsupportedShardType(conf.shard_type.clone()))?;
    let mut partition: Box<dyn Partition> = match shard_type {
        ShardType::Hash => Box::new(Hash::new(
            &conf.name,
            router_conf.slots,
            conf.partitions.clone(),
        )),
        ShardType::List => Box::new(List::new(&conf.name, conf.partitions.clone())),
        ShardType::Global => Box::new(Global::new(&conf.name, conf.partitions.clone())),
        ShardType::Single => Box::new(Single::new(&conf.name, conf.partitions.clone())),
    };
    partition.build()?;
    Ok(partition)
}

/// Equality lookup: both bounds present and identical.
pub(crate) fn is_point(start: &SqlVal, end: &SqlVal) -> bool {
    start.kind == end.kind && start.text == end.text
}
