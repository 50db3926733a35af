//! SINGLE tables live unsharded on one backend.

use std::sync::Arc;

use spire_common::config::{PartitionConfig, ShardType};
use spire_common::error::RouterError;
use spire_common::SqlVal;

use crate::key_range::SingleRange;
use crate::partition::{Partition, Segment};

#[derive(Debug)]
pub struct Single {
    table: String,
    conf: Vec<PartitionConfig>,
    segments: Vec<Segment>,
}

impl Single {
    pub fn new(table: impl Into<String>, conf: Vec<PartitionConfig>) -> Self {
        Self {
            table: table.into(),
            conf,
            segments: Vec::new(),
        }
    }
}

impl Partition for Single {
    fn build(&mut self) -> Result<(), RouterError> {
        self.clear();
        let part = match self.conf.as_slice() {
            [part] => part,
            other => {
                return Err(RouterError::SinglePartitionCount {
                    table: self.table.clone(),
                    count: other.len(),
                })
            }
        };
        self.segments = vec![Segment::new(&part.table, &part.backend, Arc::new(SingleRange))];
        Ok(())
    }

    fn clear(&mut self) {
        self.segments.clear();
    }

    fn partition_type(&self) -> ShardType {
        ShardType::Single
    }

    fn lookup(
        &self,
        _start: Option<&SqlVal>,
        _end: Option<&SqlVal>,
    ) -> Result<Vec<Segment>, RouterError> {
        Ok(self.segments.clone())
    }

    fn get_index(&self, _val: &SqlVal) -> Result<usize, RouterError> {
        Ok(0)
    }

    fn segments(&self) -> &[Segment] {
        &self.segments
    }
}
