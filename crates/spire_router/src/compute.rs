//! Uniform partition layouts used by `CREATE TABLE`.

use spire_common::config::{AutoIncrement, PartitionConfig, RouterConfig, ShardType, TableConfig};
use spire_common::error::RouterError;

/// Backend and discriminator values of one list partition group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPartitionDef {
    pub backend: String,
    pub values: Vec<String>,
}

/// DDL-level description of a table to create.
#[derive(Debug, Clone, Default)]
pub struct TableSpec {
    pub name: String,
    /// Unrecognized or empty types fall back to HASH.
    pub shard_type: String,
    pub shard_key: String,
    pub backends: Vec<String>,
    pub list_partitions: Vec<ListPartitionDef>,
    pub auto_increment: Option<AutoIncrement>,
}

fn physical_name(table: &str, n: usize) -> String {
    format!("{}_{:04}", table, n)
}

/// Split `[0, slots)` into `slots / blocks` partitions, round-robin over
/// `backends`. The last partition absorbs any remainder.
pub fn hash_uniform(
    conf: &RouterConfig,
    table: &str,
    shard_key: &str,
    backends: &[String],
) -> Result<TableConfig, RouterError> {
    if backends.is_empty() {
        return Err(RouterError::EmptyBackends(table.to_string()));
    }
    if shard_key.is_empty() {
        return Err(RouterError::MissingShardKey(table.to_string()));
    }
    let blocks = conf.blocks.clamp(1, conf.slots.max(1));
    let nums = (conf.slots / blocks).max(1);
    let partitions = (0..nums)
        .map(|i| {
            let start = i * blocks;
            let end = if i + 1 == nums { conf.slots } else { start + blocks };
            PartitionConfig {
                table: physical_name(table, i),
                segment: format!("{}-{}", start, end),
                list_value: String::new(),
                backend: backends[i % backends.len()].clone(),
            }
        })
        .collect();
    Ok(TableConfig {
        name: table.to_string(),
        shard_type: ShardType::Hash.as_str().to_string(),
        shard_key: shard_key.to_string(),
        partitions,
        auto_increment: None,
    })
}

/// One full replica per backend, under the logical table name.
pub fn global_uniform(table: &str, backends: &[String]) -> Result<TableConfig, RouterError> {
    if backends.is_empty() {
        return Err(RouterError::EmptyBackends(table.to_string()));
    }
    let partitions = backends
        .iter()
        .map(|b| PartitionConfig {
            table: table.to_string(),
            backend: b.clone(),
            ..Default::default()
        })
        .collect();
    Ok(TableConfig {
        name: table.to_string(),
        shard_type: ShardType::Global.as_str().to_string(),
        shard_key: String::new(),
        partitions,
        auto_increment: None,
    })
}

/// The whole table on the first backend.
pub fn single_uniform(table: &str, backends: &[String]) -> Result<TableConfig, RouterError> {
    let backend = backends
        .first()
        .ok_or_else(|| RouterError::EmptyBackends(table.to_string()))?;
    Ok(TableConfig {
        name: table.to_string(),
        shard_type: ShardType::Single.as_str().to_string(),
        shard_key: String::new(),
        partitions: vec![PartitionConfig {
            table: table.to_string(),
            backend: backend.clone(),
            ..Default::default()
        }],
        auto_increment: None,
    })
}

/// One physical partition per discriminator value, numbered in definition order.
pub fn list_uniform(
    table: &str,
    shard_key: &str,
    defs: &[ListPartitionDef],
) -> Result<TableConfig, RouterError> {
    if shard_key.is_empty() {
        return Err(RouterError::MissingShardKey(table.to_string()));
    }
    let partitions: Vec<PartitionConfig> = defs
        .iter()
        .flat_map(|d| d.values.iter().map(move |v| (d.backend.as_str(), v.as_str())))
        .enumerate()
        .map(|(i, (backend, value))| PartitionConfig {
            table: physical_name(table, i),
            segment: String::new(),
            list_value: value.to_string(),
            backend: backend.to_string(),
        })
        .collect();
    if partitions.is_empty() {
        return Err(RouterError::MissingListPartitions(table.to_string()));
    }
    Ok(TableConfig {
        name: table.to_string(),
        shard_type: ShardType::List.as_str().to_string(),
        shard_key: shard_key.to_string(),
        partitions,
        auto_increment: None,
    })
}

/// Lay out a table per its DDL description.
pub fn table_config_for(conf: &RouterConfig, spec: &TableSpec) -> Result<TableConfig, RouterError> {
    let shard_type = ShardType::parse(&spec.shard_type).unwrap_or_else(|| {
        if !spec.shard_type.is_empty() {
            tracing::info!(
                table = %spec.name,
                shard_type = %spec.shard_type,
                "unrecognized shard type, using HASH"
            );
        }
        ShardType::Hash
    });
    let mut cfg = match shard_type {
        ShardType::Hash => hash_uniform(conf, &spec.name, &spec.shard_key, &spec.backends)?,
        ShardType::Global => global_uniform(&spec.name, &spec.backends)?,
        ShardType::Single => single_uniform(&spec.name, &spec.backends)?,
        ShardType::List => list_uniform(&spec.name, &spec.shard_key, &spec.list_partitions)?,
    };
    cfg.auto_increment = spec.auto_increment.clone();
    Ok(cfg)
}
