use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for `Result<T, SpireError>`.
pub type SpireResult<T> = Result<T, SpireError>;

/// Error classification for client reporting and escalation decisions.
///
/// - `Configuration`: corrupt or inconsistent topology, such as a malformed or
///   overlapping segment
/// - `UserError`    : the query itself cannot be routed (no db, unknown table, bad key literal)
/// - `ResourceLimit`: a bounded-resource guard tripped (join row ceiling)
/// - `Persistence`  : metadata directory read/write failed; memory was rolled back
/// - `InternalBug`  : should never happen; indicates a malformed plan or engine tree
/// - `Fatal`        : memory and disk diverged; the host must stop serving routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    UserError,
    ResourceLimit,
    Persistence,
    InternalBug,
    Fatal,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum SpireError {
    #[error("{0}")]
    Router(#[from] RouterError),

    #[error("{0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Internal bug: should never occur for a well-formed plan.
    /// Always carries a unique `error_code` and `debug_context` for post-mortem.
    #[error("InternalBug [{error_code}]: {message} | context: {debug_context}")]
    InternalBug {
        error_code: &'static str,
        message: String,
        debug_context: String,
    },

    /// In-memory routing state no longer mirrors the metadata directory.
    /// Continuing would serve stale routes; the process is expected to exit.
    #[error("FatalInconsistency during {operation}: {reason}")]
    FatalInconsistency { operation: String, reason: String },
}

/// Routing, partition-build and metadata errors.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("No database selected")]
    NoDatabaseSelected,

    #[error("Unknown database '{0}'")]
    UnknownDatabase(String),

    #[error("Table '{db}.{table}' doesn't exist")]
    NoSuchTable { db: String, table: String },

    #[error("Can't create database '{0}'; database exists")]
    DatabaseExists(String),

    #[error("router.add.db.can't.be.empty")]
    EmptyDatabase,

    #[error("router.add.table.config.can't.be.nil")]
    NilTableConfig,

    #[error("table exists: {db}.{table}")]
    TableExists { db: String, table: String },

    #[error("router.unsupported.shardtype:[{0}]")]
    UnsupportedShardType(String),

    #[error("router.create.table[{0}].backends.can't.be.empty")]
    EmptyBackends(String),

    #[error("router.create.table[{0}].shardkey.can't.be.empty")]
    MissingShardKey(String),

    #[error("router.create.table[{0}].list.partitions.can't.be.empty")]
    MissingListPartitions(String),

    #[error("hash.partition.segment.malformed[{0}]")]
    MalformedSegment(String),

    #[error("hash.partition.segment[{segment}].start[{start}].must.be.less.than.end[{end}]")]
    InvalidSegmentRange {
        segment: String,
        start: usize,
        end: usize,
    },

    #[error("hash.partition.segment[{segment}].end[{end}].out.of.slots[{slots}]")]
    SegmentOutOfSlots {
        segment: String,
        end: usize,
        slots: usize,
    },

    #[error("hash.partition.segment[{segment}].overlapped[{slot}]")]
    SegmentOverlapped { segment: String, slot: usize },

    #[error("hash.partition.slots.covered[{covered}].must.be[{slots}]")]
    IncompleteCoverage { covered: usize, slots: usize },

    #[error("list.partition.value[{0}].duplicated")]
    DuplicateListValue(String),

    #[error("{kind}.partition.table[{table}].partitions.can't.be.empty")]
    EmptyPartitions { kind: &'static str, table: String },

    #[error("single.partition.table[{table}].must.have.one.partition.but.got[{count}]")]
    SinglePartitionCount { table: String, count: usize },

    #[error("partition.segment.index[{index}].out.of.range[{len}]")]
    SegmentIndexOutOfRange { index: usize, len: usize },

    #[error("lookup.key.type.must.be.same:[{start}!={end}]")]
    KeyTypeMismatch { start: String, end: String },

    #[error("unsupported.key.type:[{0}]")]
    UnsupportedKeyType(String),

    #[error("invalid.key.literal:[{0}]")]
    InvalidKeyLiteral(String),

    #[error("no partition for value: {0}")]
    NoPartitionForValue(String),

    #[error("router.rule.change.cant.found.backend[{backend}]+table:[{table}]")]
    BackendNotFound { backend: String, table: String },

    #[error("router.rule.change.global.table[{table}].already.exists.on.backend[{backend}]")]
    BackendAlreadyHasTable { backend: String, table: String },

    #[error("router.io[{}]: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("router.json[{}]: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Plan execution errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("unsupported: join.row.count.exceeded.allowed.limit.of.'{0}'")]
    JoinRowLimitExceeded(usize),

    #[error("The used SELECT statements have a different number of columns ({left} vs {right})")]
    UnionColumnMismatch { left: usize, right: usize },

    #[error("missing bind var {0}")]
    MissingBindVar(String),

    #[error("Column index out of bounds: {index} (row width {width})")]
    ColumnOutOfBounds { index: usize, width: usize },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Process configuration and version-file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io[{}]: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json[{}]: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("toml: {0}")]
    Toml(String),
}

// ── SpireError classification & helpers ─────────────────────────────────

impl SpireError {
    /// Classify this error for reporting/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpireError::Router(e) => e.kind(),
            SpireError::Execution(ExecutionError::JoinRowLimitExceeded(_)) => {
                ErrorKind::ResourceLimit
            }
            SpireError::Execution(ExecutionError::UnionColumnMismatch { .. }) => {
                ErrorKind::UserError
            }
            SpireError::Execution(ExecutionError::MissingBindVar(_)) => ErrorKind::InternalBug,
            SpireError::Execution(ExecutionError::ColumnOutOfBounds { .. }) => {
                ErrorKind::InternalBug
            }
            SpireError::Execution(ExecutionError::Backend(_)) => ErrorKind::UserError,
            SpireError::Config(_) => ErrorKind::Persistence,
            SpireError::FatalInconsistency { .. } => ErrorKind::Fatal,
            SpireError::Internal(_) | SpireError::InternalBug { .. } => ErrorKind::InternalBug,
        }
    }

    /// Returns true if this error resulted directly from the client's query.
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    /// Returns true if the host process must stop serving routes.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }

    /// Returns true if this is an internal bug that should never occur.
    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Map to a MySQL error number.
    pub fn mysql_code(&self) -> u16 {
        match self {
            SpireError::Router(RouterError::NoDatabaseSelected) => 1046, // ER_NO_DB_ERROR
            SpireError::Router(RouterError::UnknownDatabase(_)) => 1049, // ER_BAD_DB_ERROR
            SpireError::Router(RouterError::NoSuchTable { .. }) => 1146, // ER_NO_SUCH_TABLE
            SpireError::Router(RouterError::DatabaseExists(_)) => 1007, // ER_DB_CREATE_EXISTS
            SpireError::Router(RouterError::TableExists { .. }) => 1050, // ER_TABLE_EXISTS_ERROR
            // ER_WRONG_NUMBER_OF_COLUMNS_IN_SELECT
            SpireError::Execution(ExecutionError::UnionColumnMismatch { .. }) => 1222,
            _ => 1105, // ER_UNKNOWN_ERROR
        }
    }

    /// Map to the SQLSTATE sent alongside `mysql_code`.
    pub fn sql_state(&self) -> &'static str {
        match self.mysql_code() {
            1046 => "3D000",
            1049 => "42000",
            1146 => "42S02",
            1050 => "42S01",
            1222 => "21000",
            _ => "HY000",
        }
    }

    /// Construct an internal bug error with error code and context.
    pub fn internal_bug(
        error_code: &'static str,
        message: impl Into<String>,
        debug_context: impl Into<String>,
    ) -> Self {
        SpireError::InternalBug {
            error_code,
            message: message.into(),
            debug_context: debug_context.into(),
        }
    }

    /// Construct a fatal inconsistency error and log it at error level.
    pub fn fatal(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        let operation = operation.into();
        let reason = reason.into();
        tracing::error!(
            operation = %operation,
            reason = %reason,
            "routing metadata diverged from disk, process must restart"
        );
        SpireError::FatalInconsistency { operation, reason }
    }

    /// Add context string to an error, **preserving error classification**
    /// for the structured variants.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            SpireError::Internal(msg) => SpireError::Internal(format!("{ctx}: {msg}")),
            SpireError::InternalBug {
                error_code,
                message,
                debug_context,
            } => SpireError::InternalBug {
                error_code,
                message: format!("{ctx}: {message}"),
                debug_context,
            },
            SpireError::FatalInconsistency { operation, reason } => {
                SpireError::FatalInconsistency {
                    operation,
                    reason: format!("{ctx}: {reason}"),
                }
            }
            other => other,
        }
    }
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::NoDatabaseSelected
            | RouterError::UnknownDatabase(_)
            | RouterError::NoSuchTable { .. }
            | RouterError::TableExists { .. }
            | RouterError::DatabaseExists(_)
            | RouterError::KeyTypeMismatch { .. }
            | RouterError::UnsupportedKeyType(_)
            | RouterError::InvalidKeyLiteral(_)
            | RouterError::NoPartitionForValue(_)
            | RouterError::BackendNotFound { .. }
            | RouterError::BackendAlreadyHasTable { .. } => ErrorKind::UserError,
            RouterError::Io { .. } | RouterError::Json { .. } => ErrorKind::Persistence,
            RouterError::SegmentIndexOutOfRange { .. } => ErrorKind::InternalBug,
            _ => ErrorKind::Configuration,
        }
    }

    /// Wrap an I/O failure on a metadata path.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RouterError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a JSON (de)serialization failure on a metadata path.
    pub fn from_json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        RouterError::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_errors_map_to_mysql_codes() {
        let e: SpireError = RouterError::NoDatabaseSelected.into();
        assert_eq!(e.mysql_code(), 1046);
        assert_eq!(e.sql_state(), "3D000");
        assert!(e.is_user_error());

        let e: SpireError = RouterError::UnknownDatabase("xx".into()).into();
        assert_eq!(e.mysql_code(), 1049);
        assert_eq!(e.to_string(), "Unknown database 'xx'");

        let e: SpireError = RouterError::NoSuchTable {
            db: "sbtest".into(),
            table: "t1".into(),
        }
        .into();
        assert_eq!(e.mysql_code(), 1146);
        assert_eq!(e.to_string(), "Table 'sbtest.t1' doesn't exist");
    }

    #[test]
    fn test_join_row_limit_message() {
        let e: SpireError = ExecutionError::JoinRowLimitExceeded(10).into();
        assert_eq!(
            e.to_string(),
            "unsupported: join.row.count.exceeded.allowed.limit.of.'10'"
        );
        assert_eq!(e.kind(), ErrorKind::ResourceLimit);
    }

    #[test]
    fn test_build_errors_are_configuration() {
        let e: SpireError = RouterError::SegmentOverlapped {
            segment: "0-32".into(),
            slot: 3,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert!(!e.is_user_error());
    }

    #[test]
    fn test_fatal_kind_and_context() {
        let e = SpireError::fatal("create_table", "version update failed");
        assert!(e.is_fatal());
        let e = e.with_context("sbtest.t1");
        match e {
            SpireError::FatalInconsistency { reason, .. } => {
                assert_eq!(reason, "sbtest.t1: version update failed")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_internal_bug_context() {
        let e = SpireError::internal_bug("E-UNION-001", "unreachable", "exec_bind_vars");
        assert!(e.is_internal_bug());
        assert!(e.to_string().contains("E-UNION-001"));
    }
}
