//! Schema synthesis: PostgreSQL DDL for each planned table.
//!
//! A table already present on the target is truncated and reloaded. Any
//! other table is created with its primary key and unique indexes. All
//! statements for a table are rendered before the first one is sent, so a
//! column with an unmapped type leaves that table untouched.

use tracing::{debug, info};

use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::schema::{IndexKind, MigrationPlan, TableMeta};
use crate::core::traits::TargetWriter;
use crate::error::{MigrateError, Result};
use crate::progress::{Operator, ProgressEvent};
use crate::typemap;

/// Outcome of applying the schema for a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub tables_created: usize,
    pub tables_truncated: usize,
}

/// Render the statements that prepare one table on the target.
pub fn table_statements(table: &TableMeta, target_schema: &str, exists: bool) -> Result<Vec<String>> {
    let qualified = qualify_pg(target_schema, &table.qualified_name)?;

    if exists {
        return Ok(vec![format!("TRUNCATE TABLE {}", qualified)]);
    }

    if table.columns.is_empty() {
        return Err(MigrateError::SchemaExtraction(format!(
            "table {} has no columns",
            table.qualified_name
        )));
    }

    let mut column_defs = Vec::with_capacity(table.columns.len());
    for col in &table.columns {
        let fragment = typemap::map_column(&table.qualified_name, col)?;
        column_defs.push(format!("  {} {}", quote_pg(&col.name)?, fragment));
    }

    let mut statements = vec![format!(
        "CREATE TABLE {} (\n{}\n)",
        qualified,
        column_defs.join(",\n")
    )];

    for index in table.indexes.values() {
        let cols = index
            .columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        statements.push(match index.kind {
            IndexKind::Primary => {
                format!("ALTER TABLE {} ADD PRIMARY KEY ({})", qualified, cols)
            }
            IndexKind::Unique => format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                quote_pg(&index.name)?,
                qualified,
                cols
            ),
        });
    }

    Ok(statements)
}

/// Render the statements for every table of a plan, in plan order.
pub fn plan_statements(plan: &MigrationPlan, target_schema: &str) -> Result<Vec<(String, Vec<String>)>> {
    plan.tables()
        .map(|table| {
            let exists = plan.exists_on_target(&table.logical_name);
            table_statements(table, target_schema, exists)
                .map(|sql| (table.qualified_name.clone(), sql))
        })
        .collect()
}

/// Prepare every planned table on the target.
///
/// Stops at the first failing statement. Tables prepared before the failure
/// are left as they are.
pub async fn apply_schema(
    plan: &MigrationPlan,
    target: &dyn TargetWriter,
    target_schema: &str,
    operator: &dyn Operator,
) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();

    for table in plan.tables() {
        let exists = plan.exists_on_target(&table.logical_name);
        let statements = table_statements(table, target_schema, exists)?;

        for sql in &statements {
            debug!("{}: {}", table.qualified_name, sql);
            target
                .execute(sql)
                .await
                .map_err(|e| MigrateError::ddl(&table.qualified_name, e))?;
        }

        if exists {
            report.tables_truncated += 1;
        } else {
            report.tables_created += 1;
        }

        operator.progress(&ProgressEvent::SchemaApplied {
            table: table.qualified_name.clone(),
            created: !exists,
        });
    }

    info!(
        "Schema applied: {} tables created, {} truncated",
        report.tables_created, report.tables_truncated
    );
    Ok(report)
}
