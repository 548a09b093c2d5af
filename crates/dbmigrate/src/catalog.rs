//! Catalog reading: builds the [`MigrationPlan`] from the source catalog.

use indexmap::IndexSet;
use tracing::{debug, info};

use crate::config::Config;
use crate::core::schema::{MigrationPlan, TableMeta};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};

/// Which tables a run covers and where they live.
#[derive(Debug, Clone, Default)]
pub struct CatalogScope {
    pub source_schema: String,
    pub target_schema: String,
    pub prefix: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl CatalogScope {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_schema: config.source.effective_schema().to_string(),
            target_schema: config.target.schema.clone(),
            prefix: config.migration.prefix.clone(),
            include: config.migration.include_tables.clone(),
            exclude: config.migration.exclude_tables.clone(),
        }
    }
}

/// Resolve the selected logical table names.
///
/// A non-empty `include` list replaces the catalog listing; `exclude` is then
/// subtracted. Order follows the list the names came from, duplicates are
/// dropped, and blank entries are ignored. An included name the catalog does
/// not contain is an error.
pub fn select_tables(catalog: &[String], include: &[String], exclude: &[String]) -> Result<Vec<String>> {
    let clean = |names: &[String]| -> IndexSet<String> {
        names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    };

    let include = clean(include);
    let exclude = clean(exclude);

    let base: IndexSet<String> = if include.is_empty() {
        catalog.iter().cloned().collect()
    } else {
        let missing: Vec<&str> = include
            .iter()
            .filter(|name| !catalog.contains(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(MigrateError::SchemaExtraction(format!(
                "tables not found in source: {}",
                missing.join(", ")
            )));
        }
        include
    };

    Ok(base
        .into_iter()
        .filter(|name| !exclude.contains(name))
        .collect())
}

/// Read the source catalog and check the target for every selected table.
pub async fn build_plan(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    scope: &CatalogScope,
) -> Result<MigrationPlan> {
    let catalog = source
        .list_tables(&scope.source_schema, &scope.prefix)
        .await?;
    info!(
        "Found {} tables with prefix '{}' in source schema '{}'",
        catalog.len(),
        scope.prefix,
        scope.source_schema
    );

    let selected = select_tables(&catalog, &scope.include, &scope.exclude)?;
    let mut plan = MigrationPlan::new(catalog.len());

    for logical in selected {
        let mut table = TableMeta::new(&scope.prefix, logical);
        let name = table.qualified_name.clone();

        table.row_count = source.row_count(&scope.source_schema, &name).await?;
        table.columns = source.load_columns(&scope.source_schema, &name).await?;
        table.indexes = source.load_indexes(&scope.source_schema, &name).await?;

        if table.columns.is_empty() {
            return Err(MigrateError::SchemaExtraction(format!(
                "no columns found for {}.{}",
                scope.source_schema, name
            )));
        }

        let exists = target.table_exists(&scope.target_schema, &name).await?;
        debug!(
            "{}: {} rows, {} columns, {} indexes, exists on target: {}",
            name,
            table.row_count,
            table.columns.len(),
            table.indexes.len(),
            exists
        );

        plan.insert(table, exists);
    }

    Ok(plan)
}
