//! Shared types for the spire sharding middleware: error taxonomy, the value/row
//! model exchanged with backends, shard-key literals, request contexts and the
//! on-disk table configuration format.

pub mod config;
pub mod error;
pub mod literal;
pub mod request_context;
pub mod value;
pub mod version;

pub use error::{ErrorKind, SpireError, SpireResult};
pub use literal::{SqlVal, SqlValKind};
pub use value::{Field, QueryResult, Row, Value};
