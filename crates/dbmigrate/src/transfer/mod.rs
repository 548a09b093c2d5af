//! Batch copier: moves every row of the planned tables in keyset windows.
//!
//! Each table is read by one task in increasing copy-key order. A window is
//! `SELECT .. ORDER BY key LIMIT page_size`, continued with
//! `WHERE (key) > (last key)`, and written with one COPY. A table without a
//! usable key falls back to LIMIT/OFFSET over every column, which is only
//! exact while the source is quiescent.
//!
//! Tables run in parallel up to `workers`. The first failing table cancels
//! the others and its error is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::schema::{MigrationPlan, TableMeta};
use crate::core::traits::{SourceReader, TargetWriter, WindowCursor, WindowRequest};
use crate::error::{MigrateError, Result};
use crate::progress::{Operator, ProgressEvent, ProgressTracker};

/// Copier settings.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per window.
    pub page_size: usize,

    /// Tables copied concurrently.
    pub workers: usize,

    /// Schema the rows are read from.
    pub source_schema: String,

    /// Schema the rows are written to.
    pub target_schema: String,
}

/// Statistics for one table.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Target table name.
    pub table: String,

    /// Rows written.
    pub rows: i64,

    /// Windows read, including the final short or empty one.
    pub windows: usize,

    /// Time spent reading.
    pub read_time: Duration,

    /// Time spent writing.
    pub write_time: Duration,

    /// Whether the table was paged by offset instead of by key.
    pub offset_paging: bool,
}

/// Copies planned tables from source to target.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    operator: Arc<dyn Operator>,
    config: TransferConfig,
    tracker: Arc<ProgressTracker>,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        operator: Arc<dyn Operator>,
        config: TransferConfig,
        total_rows: i64,
    ) -> Self {
        Self {
            source,
            target,
            operator,
            config,
            tracker: Arc::new(ProgressTracker::new(total_rows)),
        }
    }

    /// Rows written so far across all tables.
    pub fn rows_copied(&self) -> i64 {
        self.tracker.rows()
    }

    /// Copy every table of the plan, in plan order, with bounded parallelism.
    pub async fn copy_all(
        self: &Arc<Self>,
        plan: &MigrationPlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<TransferStats>> {
        let workers = self.config.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let run_cancel = cancel.child_token();

        info!(
            "Copying {} tables with {} workers, {} rows per window",
            plan.len(),
            workers,
            self.config.page_size
        );

        let mut handles = Vec::with_capacity(plan.len());

        for table in plan.tables() {
            if run_cancel.is_cancelled() {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| MigrateError::Cancelled)?;

            let engine = Arc::clone(self);
            let table = Arc::new(table.clone());
            let token = run_cancel.clone();
            let name = table.qualified_name.clone();

            let handle = tokio::spawn(async move {
                let result = engine.copy_table(&table, &token).await;
                if result.is_err() {
                    token.cancel();
                }
                drop(permit);
                result
            });
            handles.push((name, handle));
        }

        let mut stats = Vec::with_capacity(handles.len());
        let mut first_error: Option<MigrateError> = None;

        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(MigrateError::transfer(&name, format!("task failed: {}", e))),
            };
            match outcome {
                Ok(s) => stats.push(s),
                Err(e) => {
                    // Prefer the error that caused the cancellation over the cancellations
                    let replace = match &first_error {
                        None => true,
                        Some(MigrateError::Cancelled) => !matches!(e, MigrateError::Cancelled),
                        Some(_) => false,
                    };
                    if replace {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        info!(
            "Copied {} rows across {} tables ({:.0} rows/s)",
            self.tracker.rows(),
            stats.len(),
            self.tracker.rows_per_second()
        );
        Ok(stats)
    }

    /// Copy one table window by window.
    pub async fn copy_table(
        &self,
        table: &TableMeta,
        cancel: &CancellationToken,
    ) -> Result<TransferStats> {
        let name = table.qualified_name.clone();
        let page_size = self.config.page_size.max(1);
        let columns = table.column_names();
        let key_positions = table.copy_key_positions();

        let mut stats = TransferStats {
            table: name.clone(),
            offset_paging: key_positions.is_none(),
            ..Default::default()
        };

        let mut cursor = match key_positions {
            Some(_) => WindowCursor::Start,
            None => {
                warn!(
                    "{}: no primary key or NOT NULL unique index, paging by offset; \
                     rows are only copied exactly once if the source is not being written",
                    name
                );
                WindowCursor::Offset(0)
            }
        };

        self.operator.progress(&ProgressEvent::TableStarted {
            table: name.clone(),
            rows: table.row_count,
        });

        loop {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            let read_start = Instant::now();
            let mut batch = self
                .source
                .read_window(WindowRequest {
                    schema: &self.config.source_schema,
                    table,
                    cursor: cursor.clone(),
                    limit: page_size,
                })
                .await?;
            stats.read_time += read_start.elapsed();
            stats.windows += 1;

            let fetched = batch.len();
            let is_last = batch.is_last;
            if fetched > page_size {
                return Err(MigrateError::transfer(
                    &name,
                    format!("window returned {} rows, limit was {}", fetched, page_size),
                ));
            }

            if let Some(positions) = &key_positions {
                batch = batch.with_key_from(positions);
            }
            let last_key = batch.last_key.take();

            if fetched > 0 {
                let write_start = Instant::now();
                let written = self
                    .target
                    .write_batch(&self.config.target_schema, &name, &columns, batch)
                    .await?;
                stats.write_time += write_start.elapsed();
                stats.rows += written as i64;

                let total_copied = self.tracker.add_rows(written as i64);
                self.operator.progress(&ProgressEvent::Window {
                    table: name.clone(),
                    table_copied: stats.rows,
                    table_rows: table.row_count,
                    total_copied,
                    total_rows: self.tracker.total_rows(),
                });
            }

            if is_last || fetched == 0 {
                break;
            }

            cursor = match (cursor, last_key) {
                (WindowCursor::Offset(offset), _) => WindowCursor::Offset(offset + fetched as u64),
                (_, Some(key)) => WindowCursor::After(key),
                (_, None) => {
                    return Err(MigrateError::transfer(
                        &name,
                        "window has no key values to continue from",
                    ))
                }
            };
        }

        debug!(
            "{}: {} rows in {} windows (read {:?}, write {:?})",
            name, stats.rows, stats.windows, stats.read_time, stats.write_time
        );
        self.operator.progress(&ProgressEvent::TableFinished {
            table: name,
            rows: stats.rows,
        });

        Ok(stats)
    }
}
