//! HASH partitioning over a fixed slot space.
//!
//! Each partition owns a half-open slot interval `"start-end"`. Together the
//! intervals must cover `[0, slots)` exactly once. Equality keys go through
//! the jump hash to a slot, and the slot map gives the segment.

use std::sync::Arc;

use spire_common::config::{PartitionConfig, ShardType};
use spire_common::error::RouterError;
use spire_common::{SqlVal, SqlValKind};

use crate::jump::{jump_hash, jump_hash_str};
use crate::key_range::HashRange;
use crate::partition::{is_point, Partition, Segment};

#[derive(Debug)]
pub struct Hash {
    table: String,
    slots: usize,
    conf: Vec<PartitionConfig>,
    /// slot -> index into `segments`; `None` until built.
    slot_map: Vec<Option<usize>>,
    covered: usize,
    segments: Vec<Segment>,
}

impl Hash {
    pub fn new(table: impl Into<String>, slots: usize, conf: Vec<PartitionConfig>) -> Self {
        Self {
            table: table.into(),
            slots,
            conf,
            slot_map: Vec::new(),
            covered: 0,
            segments: Vec::new(),
        }
    }

    /// Number of slots assigned to a segment.
    pub fn covered_slots(&self) -> usize {
        self.covered
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    fn slot_of(&self, val: &SqlVal) -> Result<usize, RouterError> {
        let slot = match val.kind {
            SqlValKind::Int => jump_hash(parse_int_key(&val.text)?, self.slots),
            SqlValKind::Float => {
                let f: f64 = val
                    .text
                    .trim()
                    .parse()
                    .map_err(|_| RouterError::InvalidKeyLiteral(val.text.clone()))?;
                jump_hash(f as i64 as u64, self.slots)
            }
            SqlValKind::Str => jump_hash_str(&val.text, self.slots),
            other => return Err(RouterError::UnsupportedKeyType(other.to_string())),
        };
        Ok(slot)
    }
}

/// Integers hash by their 64-bit pattern: unsigned first, then signed.
fn parse_int_key(text: &str) -> Result<u64, RouterError> {
    let t = text.trim();
    if let Ok(v) = t.parse::<u64>() {
        return Ok(v);
    }
    t.parse::<i64>()
        .map(|v| v as u64)
        .map_err(|_| RouterError::InvalidKeyLiteral(text.to_string()))
}

fn parse_segment(segment: &str) -> Result<(usize, usize), RouterError> {
    let malformed = || RouterError::MalformedSegment(segment.to_string());
    let (start, end) = segment.split_once('-').ok_or_else(malformed)?;
    let start: usize = start.trim().parse().map_err(|_| malformed())?;
    let end: usize = end.trim().parse().map_err(|_| malformed())?;
    Ok((start, end))
}

impl Partition for Hash {
    fn build(&mut self) -> Result<(), RouterError> {
        self.clear();
        if self.conf.is_empty() {
            return Err(RouterError::EmptyPartitions {
                kind: "hash",
                table: self.table.clone(),
            });
        }

        let mut parsed = Vec::with_capacity(self.conf.len());
        for part in &self.conf {
            let (start, end) = parse_segment(&part.segment)?;
            if end <= start {
                return Err(RouterError::InvalidSegmentRange {
                    segment: part.segment.clone(),
                    start,
                    end,
                });
            }
            if end > self.slots {
                return Err(RouterError::SegmentOutOfSlots {
                    segment: part.segment.clone(),
                    end,
                    slots: self.slots,
                });
            }
            parsed.push((start, end, part));
        }
        parsed.sort_by_key(|(start, _, _)| *start);

        let mut slot_map = vec![None; self.slots];
        let mut segments = Vec::with_capacity(parsed.len());
        let mut covered = 0;
        for (idx, (start, end, part)) in parsed.into_iter().enumerate() {
            for (slot, entry) in slot_map.iter_mut().enumerate().take(end).skip(start) {
                if entry.is_some() {
                    return Err(RouterError::SegmentOverlapped {
                        segment: part.segment.clone(),
                        slot,
                    });
                }
                *entry = Some(idx);
                covered += 1;
            }
            segments.push(Segment::new(
                &part.table,
                &part.backend,
                Arc::new(HashRange::new(start, end)),
            ));
        }
        if covered != self.slots {
            return Err(RouterError::IncompleteCoverage {
                covered,
                slots: self.slots,
            });
        }

        self.slot_map = slot_map;
        self.covered = covered;
        self.segments = segments;
        Ok(())
    }

    fn clear(&mut self) {
        self.slot_map.clear();
        self.covered = 0;
        self.segments.clear();
    }

    fn partition_type(&self) -> ShardType {
        ShardType::Hash
    }

    fn lookup(
        &self,
        start: Option<&SqlVal>,
        end: Option<&SqlVal>,
    ) -> Result<Vec<Segment>, RouterError> {
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) => (s, e),
            _ => return Ok(self.segments.clone()),
        };
        if start.kind != end.kind {
            return Err(RouterError::KeyTypeMismatch {
                start: start.kind.to_string(),
                end: end.kind.to_string(),
            });
        }
        if is_point(start, end) {
            let idx = self.get_index(start)?;
            return Ok(vec![self.segment(idx)?.clone()]);
        }
        Ok(self.segments.clone())
    }

    fn get_index(&self, val: &SqlVal) -> Result<usize, RouterError> {
        let slot = self.slot_of(val)?;
        self.slot_map
            .get(slot)
            .copied()
            .flatten()
            .ok_or(RouterError::SegmentIndexOutOfRange {
                index: slot,
                len: self.slot_map.len(),
            })
    }

    fn segments(&self) -> &[Segment] {
        &self.segments
    }
}
