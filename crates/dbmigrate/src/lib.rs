//! # dbmigrate
//!
//! MySQL/MariaDB to PostgreSQL migration library for prefixed application
//! schemas (such as Moodle's `mdl_` tables).
//!
//! A run reads the source catalog, synthesizes PostgreSQL tables with their
//! primary keys and unique indexes, copies every row in keyset-paged windows
//! using the COPY protocol, and finally moves each serial sequence past the
//! copied keys.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dbmigrate::{Config, LogOperator, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> dbmigrate::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let operator = Arc::new(LogOperator { assume_yes: true });
//!     let result = Orchestrator::connect(config, operator).await?.run().await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod sequences;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use self::core::{
    Batch, ColumnMeta, IndexKind, IndexMeta, MigrationPlan, PlanSummary, SequenceColumn,
    SequenceRecord, SourceReader, SqlNullType, SqlValue, TableMeta, TargetWriter, WindowCursor,
    WindowRequest,
};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationResult, Orchestrator, RowCountMismatch, RunState};
pub use progress::{LogOperator, Operator, ProgressEvent};
pub use transfer::{TransferConfig, TransferEngine, TransferStats};
