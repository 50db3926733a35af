//! Rule-file lifecycle: `<metadir>/<db>/<table>.json` plus the version file.
//!
//! Every mutation holds the router's write lock for the whole sequence:
//! apply to memory, persist, bump the version. A persistence failure undoes
//! the memory change. A failure after disk has already changed (version bump,
//! reload after a rule shift) means memory and disk disagree and is reported
//! as `FatalInconsistency`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use spire_common::config::{PartitionConfig, ShardType, TableConfig};
use spire_common::error::{RouterError, SpireError, SpireResult};
use spire_common::version::update_version;

use crate::compute::{table_config_for, TableSpec};
use crate::router::{add_table, remove_table, restore_table, Router, Schema, Schemas};

const FRM_EXT: &str = "json";

impl Router {
    fn db_dir(&self, db: &str) -> PathBuf {
        self.meta_dir.join(db)
    }

    fn table_path(&self, db: &str, table: &str) -> PathBuf {
        self.db_dir(db).join(format!("{table}.{FRM_EXT}"))
    }

    fn write_table_frm(&self, db: &str, cfg: &TableConfig) -> Result<(), RouterError> {
        let dir = self.db_dir(db);
        std::fs::create_dir_all(&dir).map_err(|e| RouterError::from_io(&dir, e))?;
        let path = self.table_path(db, &cfg.name);
        let body = cfg.to_json().map_err(|e| RouterError::from_json(&path, e))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| RouterError::from_io(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(RouterError::from_io(&path, e));
        }
        Ok(())
    }

    fn remove_table_frm(&self, db: &str, table: &str) -> Result<(), RouterError> {
        let path = self.table_path(db, table);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RouterError::from_io(&path, e)),
        }
    }

    fn bump_version(&self, operation: &str) -> SpireResult<i64> {
        update_version(&self.meta_dir).map_err(|e| SpireError::fatal(operation, e.to_string()))
    }

    /// Rebuild every schema from the metadata directory, creating it if
    /// missing. Any unreadable or invalid rule file fails the whole load and
    /// leaves the current routes untouched.
    pub fn load_config(&self) -> SpireResult<()> {
        let loaded = self.read_schemas()?;
        let tables: usize = loaded.values().map(|s| s.tables.len()).sum();
        *self.schemas.write() = loaded;
        tracing::info!(
            meta_dir = %self.meta_dir.display(),
            tables,
            "router config loaded"
        );
        Ok(())
    }

    /// Replace in-memory routes with what is on disk.
    pub fn reload(&self) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        *schemas = self.read_schemas()?;
        tracing::info!(meta_dir = %self.meta_dir.display(), "router config reloaded");
        Ok(())
    }

    fn read_schemas(&self) -> Result<Schemas, RouterError> {
        let meta_dir = &self.meta_dir;
        std::fs::create_dir_all(meta_dir).map_err(|e| RouterError::from_io(meta_dir, e))?;

        let mut schemas = HashMap::new();
        for db_dir in sorted_entries(meta_dir)? {
            if !db_dir.is_dir() {
                continue;
            }
            let Some(db) = db_dir.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            schemas.insert(db.clone(), Schema::new(&db));
            for path in sorted_entries(&db_dir)? {
                if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(FRM_EXT) {
                    continue;
                }
                let cfg = read_table_frm(&path)?;
                add_table(&self.conf, &mut schemas, &db, &cfg)?;
            }
        }
        Ok(schemas)
    }

    pub fn create_database(&self, db: &str) -> SpireResult<()> {
        if db.is_empty() {
            return Err(RouterError::EmptyDatabase.into());
        }
        let mut schemas = self.schemas.write();
        if schemas.contains_key(db) {
            return Err(RouterError::DatabaseExists(db.to_string()).into());
        }
        let dir = self.db_dir(db);
        std::fs::create_dir_all(&dir).map_err(|e| RouterError::from_io(&dir, e))?;
        schemas.insert(db.to_string(), Schema::new(db));
        self.bump_version("create_database")?;
        tracing::info!(db = %db, "database created");
        Ok(())
    }

    /// Remove a database with all its tables, on disk and in memory.
    pub fn drop_database(&self, db: &str) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        let schema = schemas
            .remove(db)
            .ok_or_else(|| RouterError::UnknownDatabase(db.to_string()))?;
        let dir = self.db_dir(db);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(db = %db, error = %e, "drop database failed, restoring schema");
                schemas.insert(db.to_string(), schema);
                return Err(RouterError::from_io(&dir, e).into());
            }
        }
        self.bump_version("drop_database")?;
        tracing::info!(db = %db, "database dropped");
        Ok(())
    }

    /// Lay out, register and persist a new table.
    pub fn create_table(&self, db: &str, spec: &TableSpec) -> SpireResult<()> {
        let cfg = table_config_for(&self.conf, spec)?;
        let mut schemas = self.schemas.write();
        let new_db = !schemas.contains_key(db);
        add_table(&self.conf, &mut schemas, db, &cfg)?;
        if let Err(e) = self.write_table_frm(db, &cfg) {
            tracing::warn!(db = %db, table = %cfg.name, error = %e, "create table rollback");
            let _ = remove_table(&mut schemas, db, &cfg.name);
            if new_db {
                schemas.remove(db);
            }
            return Err(e.into());
        }
        self.bump_version("create_table")
            .map_err(|e| e.with_context(format!("{db}.{}", cfg.name)))?;
        tracing::info!(
            db = %db,
            table = %cfg.name,
            shard_type = %cfg.shard_type,
            partitions = cfg.partitions.len(),
            "table created"
        );
        Ok(())
    }

    pub fn drop_table(&self, db: &str, table: &str) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        let removed = remove_table(&mut schemas, db, table)?;
        if let Err(e) = self.remove_table_frm(db, table) {
            tracing::warn!(db = %db, table = %table, error = %e, "drop table rollback");
            restore_table(&mut schemas, db, removed);
            return Err(e.into());
        }
        self.bump_version("drop_table")
            .map_err(|e| e.with_context(format!("{db}.{table}")))?;
        tracing::info!(db = %db, table = %table, "table dropped");
        Ok(())
    }

    /// Rename a logical table. The new rule file is written before the old
    /// one is removed, so an interruption leaves the new definition in place.
    pub fn rename_table(&self, db: &str, from: &str, to: &str) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        let old_cfg = crate::router::find_table(&schemas, db, from)?.config.clone();
        let new_cfg = renamed_config(&old_cfg, from, to);

        add_table(&self.conf, &mut schemas, db, &new_cfg)?;
        if let Err(e) = self.write_table_frm(db, &new_cfg) {
            tracing::warn!(db = %db, table = %to, error = %e, "rename table rollback");
            let _ = remove_table(&mut schemas, db, to);
            return Err(e.into());
        }

        let old = remove_table(&mut schemas, db, from)?;
        if let Err(e) = self.remove_table_frm(db, from) {
            tracing::warn!(db = %db, table = %from, error = %e, "rename left old table in place");
            restore_table(&mut schemas, db, old);
            return Err(e.into());
        }
        self.bump_version("rename_table")
            .map_err(|e| e.with_context(format!("{db}.{from}->{to}")))?;
        tracing::info!(db = %db, from = %from, to = %to, "table renamed");
        Ok(())
    }

    /// Reload one table from its rule file after an out-of-band edit.
    pub fn refresh_table(&self, db: &str, table: &str) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        self.refresh_locked(&mut schemas, db, table)?;
        self.bump_version("refresh_table")
            .map_err(|e| e.with_context(format!("{db}.{table}")))?;
        tracing::info!(db = %db, table = %table, "table refreshed");
        Ok(())
    }

    fn refresh_locked(
        &self,
        schemas: &mut Schemas,
        db: &str,
        table: &str,
    ) -> Result<(), RouterError> {
        let cfg = read_table_frm(&self.table_path(db, table))?;
        let old = remove_table(schemas, db, table)?;
        if let Err(e) = add_table(&self.conf, schemas, db, &cfg) {
            restore_table(schemas, db, old);
            return Err(e);
        }
        Ok(())
    }

    /// Move the physical table `table` from `from_backend` to `to_backend`.
    ///
    /// For GLOBAL tables the target gets an additional replica; for sharded
    /// tables the partition's backend is replaced. The backends themselves are
    /// not touched; data movement is the caller's job.
    pub fn partition_rule_shift(
        &self,
        from_backend: &str,
        to_backend: &str,
        db: &str,
        table: &str,
    ) -> SpireResult<()> {
        let mut schemas = self.schemas.write();
        let schema = schemas
            .get_mut(db)
            .ok_or_else(|| RouterError::UnknownDatabase(db.to_string()))?;

        let not_found = || RouterError::BackendNotFound {
            backend: from_backend.to_string(),
            table: table.to_string(),
        };
        let (logical, index) = schema
            .tables
            .iter()
            .find_map(|(name, t)| {
                t.config
                    .partitions
                    .iter()
                    .position(|p| p.backend == from_backend && p.table == table)
                    .map(|i| (name.clone(), i))
            })
            .ok_or_else(not_found)?;
        let entry = schema.tables.get_mut(&logical).ok_or_else(not_found)?;
        let partitions = &mut entry.config.partitions;

        let undo = if ShardType::parse(&entry.config.shard_type) == Some(ShardType::Global) {
            if partitions
                .iter()
                .any(|p| p.backend == to_backend && p.table == table)
            {
                return Err(RouterError::BackendAlreadyHasTable {
                    backend: to_backend.to_string(),
                    table: table.to_string(),
                }
                .into());
            }
            partitions.push(PartitionConfig {
                table: table.to_string(),
                backend: to_backend.to_string(),
                ..Default::default()
            });
            ShiftUndo::Pop
        } else {
            let previous =
                std::mem::replace(&mut partitions[index].backend, to_backend.to_string());
            ShiftUndo::Restore(index, previous)
        };

        if let Err(e) = self.write_table_frm(db, &entry.config) {
            tracing::warn!(
                db = %db,
                table = %table,
                from = %from_backend,
                to = %to_backend,
                error = %e,
                "partition rule shift rollback"
            );
            let partitions = &mut entry.config.partitions;
            match undo {
                ShiftUndo::Pop => {
                    partitions.pop();
                }
                ShiftUndo::Restore(i, previous) => partitions[i].backend = previous,
            }
            return Err(e.into());
        }

        self.refresh_locked(&mut schemas, db, &logical)
            .map_err(|e| SpireError::fatal("partition_rule_shift", e.to_string()))?;
        self.bump_version("partition_rule_shift")?;
        tracing::info!(
            db = %db,
            table = %table,
            from = %from_backend,
            to = %to_backend,
            "partition rule shifted"
        );
        Ok(())
    }
}

enum ShiftUndo {
    Pop,
    Restore(usize, String),
}

fn read_table_frm(path: &Path) -> Result<TableConfig, RouterError> {
    let data = std::fs::read(path).map_err(|e| RouterError::from_io(path, e))?;
    TableConfig::from_json(&data).map_err(|e| RouterError::from_json(path, e))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, RouterError> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| RouterError::from_io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RouterError::from_io(dir, e))?;
    entries.sort();
    Ok(entries)
}

/// Physical tables named after the logical table follow it; others keep
/// their names.
fn renamed_config(cfg: &TableConfig, from: &str, to: &str) -> TableConfig {
    let prefix = format!("{from}_");
    let mut renamed = cfg.clone();
    renamed.name = to.to_string();
    for p in &mut renamed.partitions {
        if p.table == from {
            p.table = to.to_string();
        } else if let Some(suffix) = p.table.strip_prefix(&prefix) {
            p.table = format!("{to}_{suffix}");
        }
    }
    renamed
}
