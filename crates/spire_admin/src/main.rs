//! spire-admin: inspect and edit the router's partition rules on disk.

use std::process;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use spire_common::config::{AutoIncrement, ProxyConfig};
use spire_common::version::read_version;
use spire_common::{SqlVal, SqlValKind};
use spire_router::{ListPartitionDef, Router, TableSpec};

#[derive(Parser, Debug)]
#[command(name = "spire-admin", about = "Spire partition rule administration", version)]
struct Cli {
    /// Config file path.
    #[arg(short, long, default_value = "spire.toml")]
    config: String,

    /// Metadata directory (overrides config).
    #[arg(long)]
    meta_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump every table's segments as JSON.
    Rules,
    /// Show the segments a shard-key value routes to.
    Lookup {
        db: String,
        table: String,
        /// Shard-key literal; omit for every segment.
        #[arg(long)]
        key: Option<String>,
        #[arg(long, value_enum, default_value_t = KeyKind::Int)]
        kind: KeyKind,
    },
    CreateDatabase {
        db: String,
    },
    DropDatabase {
        db: String,
    },
    /// Lay out a new table uniformly over the given backends.
    CreateTable {
        db: String,
        table: String,
        #[arg(long, default_value = "HASH")]
        shard_type: String,
        #[arg(long, default_value = "")]
        shard_key: String,
        #[arg(long, value_delimiter = ',')]
        backends: Vec<String>,
        /// LIST partition as `backend=v1,v2`; repeatable.
        #[arg(long = "list")]
        list: Vec<String>,
        #[arg(long)]
        auto_increment: Option<String>,
    },
    DropTable {
        db: String,
        table: String,
    },
    RenameTable {
        db: String,
        from: String,
        to: String,
    },
    /// Re-read one table's rule file.
    RefreshTable {
        db: String,
        table: String,
    },
    /// Move a partition from one backend to another.
    Shift {
        from: String,
        to: String,
        db: String,
        /// Physical table name of the partition, e.g. `t_0003`.
        table: String,
    },
    /// Print the metadata version.
    Version,
    /// Print the default configuration as TOML.
    PrintDefaultConfig,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyKind {
    Int,
    Float,
    Str,
}

impl From<KeyKind> for SqlValKind {
    fn from(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Int => SqlValKind::Int,
            KeyKind::Float => SqlValKind::Float,
            KeyKind::Str => SqlValKind::Str,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(out) => {
            if !out.is_empty() {
                println!("{out}");
            }
        }
        Err(e) => {
            eprintln!("spire-admin: error: {:#}", e);
            process::exit(1);
        }
    }
}

fn load_router(cli: &Cli) -> Result<Router> {
    let mut config = ProxyConfig::load_or_default(&cli.config);
    if let Some(ref dir) = cli.meta_dir {
        config.meta_dir = dir.clone();
    }
    let router = Router::new(&config.meta_dir, config.router);
    router
        .load_config()
        .with_context(|| format!("loading rules from {}", config.meta_dir))?;
    Ok(router)
}

fn parse_list(defs: &[String]) -> Result<Vec<ListPartitionDef>> {
    defs.iter()
        .map(|def| {
            let (backend, values) = def
                .split_once('=')
                .ok_or_else(|| anyhow!("bad --list '{def}', want backend=v1,v2"))?;
            Ok(ListPartitionDef {
                backend: backend.to_string(),
                values: values.split(',').map(str::to_string).collect(),
            })
        })
        .collect()
}

fn run(cli: Cli) -> Result<String> {
    if let Command::PrintDefaultConfig = cli.command {
        return Ok(ProxyConfig::default().to_toml()?);
    }
    let router = load_router(&cli)?;

    match cli.command {
        Command::Rules => Ok(router.json()?),
        Command::Lookup {
            db,
            table,
            key,
            kind,
        } => {
            let key = key.map(|text| SqlVal::new(kind.into(), text));
            let segments = router
                .lookup(&db, &table, key.as_ref(), key.as_ref())
                .with_context(|| format!("lookup {db}.{table}"))?;
            Ok(serde_json::to_string_pretty(&segments)?)
        }
        Command::CreateDatabase { db } => {
            router.create_database(&db)?;
            info!(db = %db, "database created");
            Ok(String::new())
        }
        Command::DropDatabase { db } => {
            router.drop_database(&db)?;
            info!(db = %db, "database dropped");
            Ok(String::new())
        }
        Command::CreateTable {
            db,
            table,
            shard_type,
            shard_key,
            backends,
            list,
            auto_increment,
        } => {
            if backends.is_empty() && list.is_empty() {
                bail!("create-table needs --backends or --list");
            }
            let spec = TableSpec {
                name: table.clone(),
                shard_type,
                shard_key,
                backends,
                list_partitions: parse_list(&list)?,
                auto_increment: auto_increment.map(|column| AutoIncrement { column }),
            };
            router
                .create_table(&db, &spec)
                .with_context(|| format!("create table {db}.{table}"))?;
            info!(db = %db, table = %table, "table created");
            Ok(String::new())
        }
        Command::DropTable { db, table } => {
            router.drop_table(&db, &table)?;
            info!(db = %db, table = %table, "table dropped");
            Ok(String::new())
        }
        Command::RenameTable { db, from, to } => {
            router.rename_table(&db, &from, &to)?;
            info!(db = %db, from = %from, to = %to, "table renamed");
            Ok(String::new())
        }
        Command::RefreshTable { db, table } => {
            router.refresh_table(&db, &table)?;
            info!(db = %db, table = %table, "table refreshed");
            Ok(String::new())
        }
        Command::Shift {
            from,
            to,
            db,
            table,
        } => {
            router
                .partition_rule_shift(&from, &to, &db, &table)
                .with_context(|| format!("shift {db}.{table} from {from} to {to}"))?;
            info!(db = %db, table = %table, from = %from, to = %to, "partition shifted");
            Ok(String::new())
        }
        Command::Version => Ok(read_version(router.meta_dir())?.to_string()),
        Command::PrintDefaultConfig => Ok(String::new()),
    }
}
