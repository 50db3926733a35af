//! Canned table configs for tests across the workspace.

use spire_common::config::{PartitionConfig, TableConfig};

fn hash_part(table: &str, segment: &str, backend: &str) -> PartitionConfig {
    PartitionConfig {
        table: table.into(),
        segment: segment.into(),
        list_value: String::new(),
        backend: backend.into(),
    }
}

/// `A`, hashed on `id` over four backends.
pub fn mock_table_a_config() -> TableConfig {
    TableConfig {
        name: "A".into(),
        shard_type: "HASH".into(),
        shard_key: "id".into(),
        partitions: vec![
            hash_part("A0", "0-1024", "backend0"),
            hash_part("A1", "1024-2048", "backend1"),
            hash_part("A2", "2048-3072", "backend2"),
            hash_part("A3", "3072-4096", "backend3"),
        ],
        auto_increment: None,
    }
}

/// `B`, hashed on `id` over two backends.
pub fn mock_table_b_config() -> TableConfig {
    TableConfig {
        name: "B".into(),
        shard_type: "HASH".into(),
        shard_key: "id".into(),
        partitions: vec![
            hash_part("B0", "0-2048", "backend0"),
            hash_part("B1", "2048-4096", "backend1"),
        ],
        auto_increment: None,
    }
}

/// `G`, replicated on two backends.
pub fn mock_global_config() -> TableConfig {
    TableConfig {
        name: "G".into(),
        shard_type: "GLOBAL".into(),
        shard_key: String::new(),
        partitions: vec![hash_part("G", "", "backend1"), hash_part("G", "", "backend2")],
        auto_increment: None,
    }
}

/// `S`, unsharded on one backend.
pub fn mock_single_config() -> TableConfig {
    TableConfig {
        name: "S".into(),
        shard_type: "SINGLE".into(),
        shard_key: String::new(),
        partitions: vec![hash_part("S", "", "backend1")],
        auto_increment: None,
    }
}

/// `L`, listed on `id`: 1 and 2 on backend1, 3 on backend2.
pub fn mock_list_config() -> TableConfig {
    let part = |table: &str, value: &str, backend: &str| PartitionConfig {
        table: table.into(),
        segment: String::new(),
        list_value: value.into(),
        backend: backend.into(),
    };
    TableConfig {
        name: "L".into(),
        shard_type: "LIST".into(),
        shard_key: "id".into(),
        partitions: vec![
            part("L_0000", "1", "backend1"),
            part("L_0001", "2", "backend1"),
            part("L_0002", "3", "backend2"),
        ],
        auto_increment: None,
    }
}
