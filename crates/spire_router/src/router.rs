//! Process-wide routing table.
//!
//! `Router` owns `db -> Schema -> Table -> Partition`. Lookups take the read
//! lock and run in parallel; DDL (see `frm.rs`) takes the write lock for the
//! whole mutate/persist/version-bump sequence, so readers never observe a
//! half-applied change.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use spire_common::config::{RouterConfig, ShardType, TableConfig};
use spire_common::error::{RouterError, SpireResult};
use spire_common::SqlVal;

use crate::partition::{build_partition, Partition, Segment};

/// A routed logical table.
#[derive(Debug)]
pub struct Table {
    pub name: String,
    /// Empty for GLOBAL and SINGLE tables.
    pub shard_key: String,
    pub partition: Box<dyn Partition>,
    pub config: TableConfig,
}

#[derive(Debug)]
pub struct Schema {
    pub db: String,
    pub tables: HashMap<String, Table>,
}

impl Schema {
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            tables: HashMap::new(),
        }
    }
}

pub(crate) type Schemas = HashMap<String, Schema>;

pub struct Router {
    pub(crate) meta_dir: PathBuf,
    pub(crate) conf: RouterConfig,
    pub(crate) schemas: RwLock<Schemas>,
}

impl Router {
    pub fn new(meta_dir: impl Into<PathBuf>, conf: RouterConfig) -> Self {
        Self {
            meta_dir: meta_dir.into(),
            conf,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn router_config(&self) -> RouterConfig {
        self.conf
    }

    /// Register a table in memory only. The shard type must be one of the
    /// known schemes.
    pub fn add(&self, db: &str, cfg: &TableConfig) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        add_table(&self.conf, &mut schemas, db, cfg)?;
        Ok(())
    }

    /// Unregister a table from memory only.
    pub fn remove(&self, db: &str, table: &str) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        remove_table(&mut schemas, db, table)?;
        Ok(())
    }

    /// Segments that may hold rows of `db.table` with shard key in
    /// `[start, end]`.
    pub fn lookup(
        &self,
        db: &str,
        table: &str,
        start: Option<&SqlVal>,
        end: Option<&SqlVal>,
    ) -> SpireResult<Vec<Segment>> {
        let segments = self.with_table(db, table, |t| t.partition.lookup(start, end))??;
        Ok(segments)
    }

    pub fn table_config(&self, db: &str, table: &str) -> SpireResult<TableConfig> {
        self.with_table(db, table, |t| t.config.clone())
    }

    pub fn shard_key(&self, db: &str, table: &str) -> SpireResult<String> {
        self.with_table(db, table, |t| t.shard_key.clone())
    }

    pub fn partition_type(&self, db: &str, table: &str) -> SpireResult<ShardType> {
        self.with_table(db, table, |t| t.partition.partition_type())
    }

    pub fn database_exists(&self, db: &str) -> bool {
        self.schemas.read().contains_key(db)
    }

    /// Database name to sorted table names.
    pub fn tables(&self) -> BTreeMap<String, Vec<String>> {
        self.schemas
            .read()
            .iter()
            .map(|(db, schema)| {
                let mut names: Vec<String> = schema.tables.keys().cloned().collect();
                names.sort();
                (db.clone(), names)
            })
            .collect()
    }

    /// Forget every schema. Disk is untouched.
    pub fn clear(&self) {
        self.schemas.write().clear();
    }

    /// Typed snapshot of all routing rules.
    pub fn rules(&self) -> Rules {
        let schemas = self.schemas.read();
        let schemas = schemas
            .iter()
            .map(|(db, schema)| {
                let tables = schema
                    .tables
                    .iter()
                    .map(|(name, t)| {
                        (
                            name.clone(),
                            TableRules {
                                name: t.name.clone(),
                                shard_key: t.shard_key.clone(),
                                partition: PartitionRules {
                                    segments: t.partition.segments().to_vec(),
                                },
                            },
                        )
                    })
                    .collect();
                (db.clone(), SchemaRules { tables })
            })
            .collect();
        Rules { schemas }
    }

    /// Pretty JSON of [`Router::rules`].
    pub fn json(&self) -> SpireResult<String> {
        serde_json::to_string_pretty(&self.rules())
            .map_err(|e| spire_common::SpireError::Internal(format!("router.json: {e}")))
    }

    fn with_table<R>(&self, db: &str, table: &str, f: impl FnOnce(&Table) -> R) -> SpireResult<R> {
        let schemas = self.schemas.read();
        Ok(f(find_table(&schemas, db, table)?))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("meta_dir", &self.meta_dir)
            .field("conf", &self.conf)
            .field("databases", &self.schemas.read().len())
            .finish()
    }
}

pub(crate) fn find_table<'a>(
    schemas: &'a Schemas,
    db: &str,
    table: &str,
) -> Result<&'a Table, RouterError> {
    if db.is_empty() {
        return Err(RouterError::NoDatabaseSelected);
    }
    let schema = schemas
        .get(db)
        .ok_or_else(|| RouterError::UnknownDatabase(db.to_string()))?;
    schema.tables.get(table).ok_or_else(|| RouterError::NoSuchTable {
        db: db.to_string(),
        table: table.to_string(),
    })
}

/// Build `cfg` and insert it under `db`, creating the schema on first use.
pub(crate) fn add_table(
    conf: &RouterConfig,
    schemas: &mut Schemas,
    db: &str,
    cfg: &TableConfig,
) -> Result<(), RouterError> {
    if db.is_empty() {
        return Err(RouterError::EmptyDatabase);
    }
    if cfg.name.is_empty() {
        return Err(RouterError::NilTableConfig);
    }
    if schemas
        .get(db)
        .is_some_and(|s| s.tables.contains_key(&cfg.name))
    {
        return Err(RouterError::TableExists {
            db: db.to_string(),
            table: cfg.name.clone(),
        });
    }
    let partition = build_partition(conf, cfg)?;
    let table = Table {
        name: cfg.name.clone(),
        shard_key: cfg.shard_key.clone(),
        partition,
        config: cfg.clone(),
    };
    schemas
        .entry(db.to_string())
        .or_insert_with(|| Schema::new(db))
        .tables
        .insert(cfg.name.clone(), table);
    Ok(())
}

pub(crate) fn remove_table(
    schemas: &mut Schemas,
    db: &str,
    table: &str,
) -> Result<Table, RouterError> {
    if db.is_empty() {
        return Err(RouterError::NoDatabaseSelected);
    }
    let schema = schemas
        .get_mut(db)
        .ok_or_else(|| RouterError::UnknownDatabase(db.to_string()))?;
    schema.tables.remove(table).ok_or_else(|| RouterError::NoSuchTable {
        db: db.to_string(),
        table: table.to_string(),
    })
}

/// Put a previously removed table back.
pub(crate) fn restore_table(schemas: &mut Schemas, db: &str, table: Table) {
    schemas
        .entry(db.to_string())
        .or_insert_with(|| Schema::new(db))
        .tables
        .insert(table.name.clone(), table);
}

/// Read-only view of the routing rules, serialized for management tooling.
#[derive(Debug, Serialize)]
pub struct Rules {
    #[serde(rename = "Schemas")]
    pub schemas: BTreeMap<String, SchemaRules>,
}

#[derive(Debug, Serialize)]
pub struct SchemaRules {
    #[serde(rename = "Tables")]
    pub tables: BTreeMap<String, TableRules>,
}

#[derive(Debug, Serialize)]
pub struct TableRules {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ShardKey", skip_serializing_if = "String::is_empty")]
    pub shard_key: String,
    #[serde(rename = "Partition")]
    pub partition: PartitionRules,
}

#[derive(Debug, Serialize)]
pub struct PartitionRules {
    #[serde(rename = "Segments")]
    pub segments: Vec<Segment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use spire_common::error::ErrorKind;
    use spire_common::SpireError;

    fn router() -> Router {
        let r = Router::new("/nonexistent", RouterConfig::default());
        r.add("sbtest", &mock::mock_table_a_config()).unwrap();
        r.add("sbtest", &mock::mock_table_b_config()).unwrap();
        r.add("sbtest", &mock::mock_global_config()).unwrap();
        r
    }

    #[test]
    fn test_lookup_resolution_errors() {
        let r = router();
        let e = r.lookup("", "A", None, None).unwrap_err();
        assert_eq!(e.mysql_code(), 1046);
        let e = r.lookup("xx", "A", None, None).unwrap_err();
        assert_eq!(e.mysql_code(), 1049);
        let e = r.lookup("sbtest", "nope", None, None).unwrap_err();
        assert_eq!(e.mysql_code(), 1146);
        assert_eq!(e.kind(), ErrorKind::UserError);
    }

    #[test]
    fn test_lookup_delegates_to_partition() {
        let r = router();
        assert_eq!(r.lookup("sbtest", "A", None, None).unwrap().len(), 4);
        let key = SqlVal::int(3);
        let segs = r.lookup("sbtest", "A", Some(&key), Some(&key)).unwrap();
        assert_eq!(segs.len(), 1);
        let segs = r.lookup("sbtest", "G", Some(&key), Some(&key)).unwrap();
        assert_eq!(segs.len(), 2);
    }

    #[test]
    fn test_add_rejects_duplicates_and_unknown_types() {
        let r = router();
        let e = r.add("sbtest", &mock::mock_table_a_config()).unwrap_err();
        assert_eq!(e.to_string(), "table exists: sbtest.A");

        let mut cfg = mock::mock_table_a_config();
        cfg.name = "Z".into();
        cfg.shard_type = "RANGE".into();
        let e = r.add("sbtest", &cfg).unwrap_err();
        assert!(matches!(
            e,
            SpireError::Router(RouterError::UnsupportedShardType(_))
        ));
        assert!(matches!(
            r.add("", &mock::mock_table_b_config()).unwrap_err(),
            SpireError::Router(RouterError::EmptyDatabase)
        ));
    }

    #[test]
    fn test_failed_build_leaves_no_schema() {
        let r = Router::new("/nonexistent", RouterConfig::default());
        let mut cfg = mock::mock_table_a_config();
        cfg.partitions.pop();
        assert!(r.add("db1", &cfg).is_err());
        assert!(!r.database_exists("db1"));
    }

    #[test]
    fn test_accessors_and_remove() {
        let r = router();
        assert_eq!(r.shard_key("sbtest", "A").unwrap(), "id");
        assert_eq!(r.partition_type("sbtest", "G").unwrap(), ShardType::Global);
        assert_eq!(r.tables()["sbtest"], ["A", "B", "G"]);
        r.remove("sbtest", "B").unwrap();
        assert!(r.table_config("sbtest", "B").is_err());
        r.clear();
        assert!(!r.database_exists("sbtest"));
    }

    #[test]
    fn test_json_shape() {
        let r = Router::new("/nonexistent", RouterConfig::default());
        r.add("sbtest", &mock::mock_table_b_config()).unwrap();
        r.add("sbtest", &mock::mock_single_config()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&r.json().unwrap()).unwrap();
        let b = &v["Schemas"]["sbtest"]["Tables"]["B"];
        assert_eq!(b["Name"], "B");
        assert_eq!(b["ShardKey"], "id");
        let segs = b["Partition"]["Segments"].as_array().unwrap();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0]["Range"]["Start"], 0);
        assert_eq!(segs[1]["Range"]["End"], 4096);
        let s = &v["Schemas"]["sbtest"]["Tables"]["S"];
        assert!(s.get("ShardKey").is_none());
        assert!(s["Partition"]["Segments"][0].get("Range").is_none());
    }
}
