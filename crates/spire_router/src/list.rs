//! LIST partitioning: each segment owns one discriminator value. There is no
//! default segment, so an unknown value cannot be routed.

use std::collections::HashSet;
use std::sync::Arc;

use spire_common::config::{PartitionConfig, ShardType};
use spire_common::error::RouterError;
use spire_common::SqlVal;

use crate::key_range::ListRange;
use crate::partition::{is_point, Partition, Segment};

#[derive(Debug)]
pub struct List {
    table: String,
    conf: Vec<PartitionConfig>,
    segments: Vec<Segment>,
}

impl List {
    pub fn new(table: impl Into<String>, conf: Vec<PartitionConfig>) -> Self {
        Self {
            table: table.into(),
            conf,
            segments: Vec::new(),
        }
    }
}

impl Partition for List {
    fn build(&mut self) -> Result<(), RouterError> {
        self.clear();
        if self.conf.is_empty() {
            return Err(RouterError::EmptyPartitions {
                kind: "list",
                table: self.table.clone(),
            });
        }
        let mut seen = HashSet::with_capacity(self.conf.len());
        let mut segments = Vec::with_capacity(self.conf.len());
        for part in &self.conf {
            if !seen.insert(part.list_value.as_str()) {
                return Err(RouterError::DuplicateListValue(part.list_value.clone()));
            }
            let mut seg = Segment::new(
                &part.table,
                &part.backend,
                Arc::new(ListRange::new(&part.list_value)),
            );
            seg.list_value = part.list_value.clone();
            segments.push(seg);
        }
        self.segments = segments;
        Ok(())
    }

    fn clear(&mut self) {
        self.segments.clear();
    }

    fn partition_type(&self) -> ShardType {
        ShardType::List
    }

    fn lookup(
        &self,
        start: Option<&SqlVal>,
        end: Option<&SqlVal>,
    ) -> Result<Vec<Segment>, RouterError> {
        match (start, end) {
            (Some(s), Some(e)) if is_point(s, e) => {
                let idx = self.get_index(s)?;
                Ok(vec![self.segment(idx)?.clone()])
            }
            _ => Ok(self.segments.clone()),
        }
    }

    fn get_index(&self, val: &SqlVal) -> Result<usize, RouterError> {
        self.segments
            .iter()
            .position(|s| s.list_value == val.text)
            .ok_or_else(|| RouterError::NoPartitionForValue(val.text.clone()))
    }

    fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_common::SqlValKind;

    fn part(table: &str, value: &str, backend: &str) -> PartitionConfig {
        PartitionConfig {
            table: table.into(),
            segment: String::new(),
            list_value: value.into(),
            backend: backend.into(),
        }
    }

    fn built() -> List {
        let mut l = List::new(
            "l",
            vec![
                part("l_0000", "1", "b0"),
                part("l_0001", "2", "b0"),
                part("l_0002", "3", "b1"),
            ],
        );
        l.build().unwrap();
        l
    }

    #[test]
    fn test_point_lookup_matches_one() {
        let l = built();
        let v = SqlVal::int(3);
        let segs = l.lookup(Some(&v), Some(&v)).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].table, "l_0002");
        assert_eq!(segs[0].backend, "b1");
        // kind does not matter, only the discriminator text
        let s = SqlVal::new(SqlValKind::Str, "1");
        assert_eq!(l.get_index(&s).unwrap(), 0);
    }

    #[test]
    fn test_unknown_value_errors() {
        let l = built();
        let v = SqlVal::int(9);
        let err = l.lookup(Some(&v), Some(&v)).unwrap_err();
        assert_eq!(err.to_string(), "no partition for value: 9");
    }

    #[test]
    fn test_open_and_range_return_all() {
        let l = built();
        assert_eq!(l.lookup(None, None).unwrap().len(), 3);
        let (a, b) = (SqlVal::int(1), SqlVal::int(2));
        assert_eq!(l.lookup(Some(&a), Some(&b)).unwrap().len(), 3);
    }

    #[test]
    fn test_duplicate_value_rejected() {
        let mut l = List::new("l", vec![part("a", "1", "b0"), part("b", "1", "b1")]);
        assert!(matches!(
            l.build().unwrap_err(),
            RouterError::DuplicateListValue(ref v) if v == "1"
        ));
    }
}
