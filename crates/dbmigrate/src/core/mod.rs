//! Core abstractions for the migration.
//!
//! - [`schema`]: table, column, index and plan metadata
//! - [`value`]: SQL values and copy windows
//! - [`traits`]: source and target driver seams
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    ColumnMeta, IndexKind, IndexMeta, MigrationPlan, PlanSummary, SequenceColumn, SequenceRecord,
    TableMeta,
};
pub use traits::{SourceReader, TargetWriter, WindowCursor, WindowRequest};
pub use value::{Batch, Row, SqlNullType, SqlValue};
