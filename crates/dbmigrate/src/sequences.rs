//! Sequence reconciliation after the bulk load.
//!
//! COPY bypasses column defaults, so serial sequences still sit at their
//! start value after the load. Each sequence backing a planned table is moved
//! so the next `nextval` yields `MAX(key) + 1`.

use tracing::{debug, info, warn};

use crate::core::schema::{MigrationPlan, SequenceColumn, SequenceRecord};
use crate::core::traits::TargetWriter;
use crate::error::Result;
use crate::progress::{Operator, ProgressEvent};

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceReport {
    pub reset: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Extract the sequence name from a `nextval('<name>'::regclass)` default.
pub fn parse_sequence_name(column_default: &str) -> Option<String> {
    let rest = column_default.trim().strip_prefix("nextval('")?;
    let end = rest.find("'::regclass)")?;
    let name = &rest[..end];
    if name.is_empty() {
        None
    } else {
        Some(name.replace("''", "'"))
    }
}

/// Keep the sequences whose table belongs to the plan.
pub fn plan_sequences(plan: &MigrationPlan, prefix: &str, columns: &[SequenceColumn]) -> Vec<SequenceRecord> {
    columns
        .iter()
        .filter_map(|col| {
            let logical = col.table_name.strip_prefix(prefix)?;
            if !plan.contains(logical) {
                return None;
            }
            let Some(sequence_name) = parse_sequence_name(&col.column_default) else {
                warn!(
                    "{}.{}: cannot parse sequence from default {}",
                    col.table_name, col.column_name, col.column_default
                );
                return None;
            };
            Some(SequenceRecord {
                sequence_name,
                table_name: col.table_name.clone(),
                key_column: col.column_name.clone(),
            })
        })
        .collect()
}

/// Reset every sequence backing a planned table.
///
/// Failures are logged and counted; they never fail the run.
pub async fn reconcile(
    plan: &MigrationPlan,
    target: &dyn TargetWriter,
    target_schema: &str,
    prefix: &str,
    operator: &dyn Operator,
) -> Result<SequenceReport> {
    let mut report = SequenceReport::default();

    let columns = match target.list_sequences(target_schema, prefix).await {
        Ok(columns) => columns,
        Err(e) => {
            warn!("Could not list target sequences, skipping reset: {}", e);
            report.failed += 1;
            return Ok(report);
        }
    };

    let records = plan_sequences(plan, prefix, &columns);
    report.skipped = columns.len() - records.len();

    for record in &records {
        match target.set_sequence(target_schema, record).await {
            Ok(next_value) => {
                debug!(
                    "Sequence {} for {}.{} next value {}",
                    record.sequence_name, record.table_name, record.key_column, next_value
                );
                report.reset += 1;
                operator.progress(&ProgressEvent::SequenceReset {
                    sequence: record.sequence_name.clone(),
                    next_value,
                });
            }
            Err(e) => {
                warn!(
                    "Failed to reset sequence {} for {}.{}: {}",
                    record.sequence_name, record.table_name, record.key_column, e
                );
                report.failed += 1;
            }
        }
    }

    info!(
        "Sequences: {} reset, {} failed, {} outside the plan",
        report.reset, report.failed, report.skipped
    );
    Ok(report)
}
