//! GLOBAL tables are fully replicated; every lookup fans out to all replicas.

use std::sync::Arc;

use spire_common::config::{PartitionConfig, ShardType};
use spire_common::error::RouterError;
use spire_common::SqlVal;

use crate::key_range::GlobalRange;
use crate::partition::{Partition, Segment};

#[derive(Debug)]
pub struct Global {
    table: String,
    conf: Vec<PartitionConfig>,
    segments: Vec<Segment>,
}

impl Global {
    pub fn new(table: impl Into<String>, conf: Vec<PartitionConfig>) -> Self {
        Self {
            table: table.into(),
            conf,
            segments: Vec::new(),
        }
    }
}

impl Partition for Global {
    fn build(&mut self) -> Result<(), RouterError> {
        self.clear();
        if self.conf.is_empty() {
            return Err(RouterError::EmptyPartitions {
                kind: "global",
                table: self.table.clone(),
            });
        }
        self.segments = self
            .conf
            .iter()
            .map(|p| Segment::new(&p.table, &p.backend, Arc::new(GlobalRange)))
            .collect();
        Ok(())
    }

    fn clear(&mut self) {
        self.segments.clear();
    }

    fn partition_type(&self) -> ShardType {
        ShardType::Global
    }

    fn lookup(
        &self,
        _start: Option<&SqlVal>,
        _end: Option<&SqlVal>,
    ) -> Result<Vec<Segment>, RouterError> {
        Ok(self.segments.clone())
    }

    /// Any replica serves any key.
    fn get_index(&self, _val: &SqlVal) -> Result<usize, RouterError> {
        Ok(0)
    }

    fn segments(&self) -> &[Segment] {
        &self.segments
    }
}
