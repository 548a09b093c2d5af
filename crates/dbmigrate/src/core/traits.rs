//! Driver seams for the migration engine.
//!
//! - [`SourceReader`]: reads the catalog and row windows from the source
//! - [`TargetWriter`]: applies DDL, loads rows and maintains sequences on the target
//!
//! The orchestrator only ever talks to `Arc<dyn SourceReader>` and
//! `Arc<dyn TargetWriter>`, which lets tests drive a full run against
//! in-memory implementations.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::Result;

use super::schema::{ColumnMeta, IndexMeta, SequenceColumn, SequenceRecord, TableMeta};
use super::value::{Batch, Row};

/// Where a copy window starts.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowCursor {
    /// First window of the table.
    Start,
    /// Rows whose copy key sorts strictly after these key values.
    After(Row),
    /// Rows after skipping this many in full-column order (tables without a usable key).
    Offset(u64),
}

/// A request for one window of rows.
#[derive(Debug, Clone)]
pub struct WindowRequest<'a> {
    /// Source schema.
    pub schema: &'a str,
    /// Table being copied.
    pub table: &'a TableMeta,
    /// Window start.
    pub cursor: WindowCursor,
    /// Maximum rows in the window.
    pub limit: usize,
}

/// Source database reader.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List base tables whose names start with `prefix`, sorted by name.
    /// Returned names have the prefix removed.
    async fn list_tables(&self, schema: &str, prefix: &str) -> Result<Vec<String>>;

    /// Exact row count of a table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;

    /// Columns of a table in ordinal order.
    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnMeta>>;

    /// Primary key and unique indexes keyed by name, in discovery order.
    async fn load_indexes(&self, schema: &str, table: &str)
        -> Result<IndexMap<String, IndexMeta>>;

    /// Read one window of rows.
    ///
    /// The returned batch owns its rows; no cursor outlives the call. It must
    /// be marked final (`Batch::mark_final`) when no rows follow it, and at
    /// the latest when it holds fewer than `limit` rows.
    async fn read_window(&self, request: WindowRequest<'_>) -> Result<Batch>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}

/// Target database writer.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Check if a table exists.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// Execute a single DDL statement.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Load a window of rows. Returns the number of rows written.
    async fn write_batch(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        batch: Batch,
    ) -> Result<u64>;

    /// Columns on prefixed tables whose default draws from a sequence.
    async fn list_sequences(&self, schema: &str, prefix: &str) -> Result<Vec<SequenceColumn>>;

    /// Move a sequence so its next value is `MAX(key) + 1` (1 for an empty table).
    /// Returns the value the next `nextval` will yield.
    async fn set_sequence(&self, schema: &str, record: &SequenceRecord) -> Result<i64>;

    /// Exact row count of a table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}
