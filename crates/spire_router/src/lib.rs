//! Shard routing: maps `(database, table, key range)` to the physical segments
//! (backend + physical table) that hold the rows, and owns the lifecycle of the
//! per-table rule files under the metadata directory.
//!
//! Partition schemes:
//! - **HASH**: slots `[0, slots)` split into non-overlapping segments; equality
//!   keys are placed with a jump consistent hash, everything else scatters.
//! - **LIST**: one segment per discriminator value, no default segment.
//! - **GLOBAL**: every segment is a full replica; lookups always fan out.
//! - **SINGLE**: one segment on one backend.

pub mod compute;
pub mod global;
pub mod hash;
pub mod jump;
pub mod key_range;
pub mod list;
pub mod mock;
pub mod partition;
pub mod router;
pub mod single;

mod frm;

pub use compute::{ListPartitionDef, TableSpec};
pub use key_range::{GlobalRange, HashRange, KeyRange, ListRange, SingleRange};
pub use partition::{Partition, Segment};
pub use router::{Router, Rules, Schema, Table};
