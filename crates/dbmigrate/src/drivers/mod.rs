//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB source reader
//! - [`postgres`]: PostgreSQL target writer
//! - [`common`]: Shared utilities (TLS)

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mysql::MysqlReader;
pub use postgres::PostgresWriter;
