//! Operator seam: pre-flight summary, confirmation and progress reporting.
//!
//! The library never prints or prompts directly. The CLI supplies an
//! [`Operator`] backed by the terminal; tests supply a scripted one.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use tracing::info;

use crate::core::schema::PlanSummary;

/// Something the operator may want to see while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// DDL for a table finished.
    SchemaApplied { table: String, created: bool },
    /// Copy of a table started.
    TableStarted { table: String, rows: i64 },
    /// A window was written.
    Window {
        table: String,
        table_copied: i64,
        table_rows: i64,
        total_copied: i64,
        total_rows: i64,
    },
    /// Copy of a table finished.
    TableFinished { table: String, rows: i64 },
    /// A sequence was moved past the loaded keys.
    SequenceReset { sequence: String, next_value: i64 },
}

impl ProgressEvent {
    /// Percentage of the whole run covered so far, for window events.
    pub fn total_percent(&self) -> Option<f64> {
        match self {
            ProgressEvent::Window {
                total_copied,
                total_rows,
                ..
            } => Some(percent(*total_copied, *total_rows)),
            _ => None,
        }
    }

    /// Percentage of the current table covered so far, for window events.
    pub fn table_percent(&self) -> Option<f64> {
        match self {
            ProgressEvent::Window {
                table_copied,
                table_rows,
                ..
            } => Some(percent(*table_copied, *table_rows)),
            _ => None,
        }
    }
}

/// `done / total` as a percentage, capped at 100. An empty total counts as done.
pub fn percent(done: i64, total: i64) -> f64 {
    if total <= 0 {
        return 100.0;
    }
    (done as f64 * 100.0 / total as f64).min(100.0)
}

/// The human (or script) driving a run.
pub trait Operator: Send + Sync {
    /// Show the pre-flight summary.
    fn show_summary(&self, summary: &PlanSummary);

    /// Ask whether to continue when existing target tables would be truncated.
    /// Only `true` lets the run proceed.
    fn confirm(&self, summary: &PlanSummary) -> bool;

    /// Report progress.
    fn progress(&self, event: &ProgressEvent);

    /// Show the statements a dry run would execute for one table.
    fn ddl_preview(&self, table: &str, statements: &[String]) {
        let _ = (table, statements);
    }
}

/// Non-interactive operator that reports through `tracing`.
///
/// Confirmation is answered by `assume_yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOperator {
    pub assume_yes: bool,
}

impl Operator for LogOperator {
    fn show_summary(&self, summary: &PlanSummary) {
        info!(
            "Plan: {} source tables, {} to migrate ({} existing, {} to create), {} rows",
            summary.source_table_count,
            summary.to_migrate,
            summary.already_present,
            summary.to_create,
            summary.total_rows
        );
    }

    fn confirm(&self, _summary: &PlanSummary) -> bool {
        self.assume_yes
    }

    fn progress(&self, event: &ProgressEvent) {
        if let ProgressEvent::TableFinished { table, rows } = event {
            info!("{}: {} rows copied", table, rows);
        }
    }

    fn ddl_preview(&self, table: &str, statements: &[String]) {
        for sql in statements {
            info!("{}: {}", table, sql);
        }
    }
}

/// Thread-safe row counter shared by copy workers.
#[derive(Debug)]
pub struct ProgressTracker {
    rows_copied: AtomicI64,
    total_rows: i64,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_rows: i64) -> Self {
        Self {
            rows_copied: AtomicI64::new(0),
            total_rows,
            start_time: Instant::now(),
        }
    }

    /// Add rows to the counter and return the new running total.
    pub fn add_rows(&self, count: i64) -> i64 {
        self.rows_copied.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn rows(&self) -> i64 {
        self.rows_copied.load(Ordering::Relaxed)
    }

    pub fn total_rows(&self) -> i64 {
        self.total_rows
    }

    /// Throughput since the tracker was created.
    pub fn rows_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.rows() as f64 / elapsed
        } else {
            0.0
        }
    }
}
