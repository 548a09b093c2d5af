//! Migration orchestrator - main workflow coordinator.
//!
//! Drives one run through its phases:
//!
//! 1. read the source catalog into a [`MigrationPlan`]
//! 2. show the summary and, when target tables would be truncated, ask to continue
//! 3. create or truncate every table
//! 4. copy all rows
//! 5. reset sequences
//! 6. optionally compare row counts

mod state;

pub use state::{RowCountMismatch, RunContext, RunState};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::{self, CatalogScope};
use crate::config::Config;
use crate::core::schema::MigrationPlan;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::ddl;
use crate::drivers::{MysqlReader, PostgresWriter};
use crate::error::{MigrateError, Result};
use crate::progress::Operator;
use crate::sequences;
use crate::transfer::{TransferConfig, TransferEngine};

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final state: done or aborted.
    pub status: RunState,

    /// Whether only the plan and DDL preview were produced.
    pub dry_run: bool,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Tables in the plan.
    pub tables_total: usize,

    /// Tables created on the target.
    pub tables_created: usize,

    /// Existing target tables truncated and reloaded.
    pub tables_truncated: usize,

    /// Total rows transferred.
    pub rows_transferred: i64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    pub sequences_reset: usize,
    pub sequences_failed: usize,

    /// Tables whose target row count differs from the source (validation only).
    pub row_count_mismatches: Vec<RowCountMismatch>,
}

impl MigrationResult {
    fn from_context(ctx: &RunContext, dry_run: bool) -> Self {
        let completed_at = Utc::now();
        let duration = (completed_at - ctx.started_at).num_milliseconds() as f64 / 1000.0;
        let rows_per_second = if duration > 0.0 {
            (ctx.rows_transferred as f64 / duration) as i64
        } else {
            0
        };

        Self {
            run_id: ctx.run_id.clone(),
            status: ctx.state(),
            dry_run,
            duration_seconds: duration,
            started_at: ctx.started_at,
            completed_at,
            tables_total: ctx.tables_total,
            tables_created: ctx.tables_created,
            tables_truncated: ctx.tables_truncated,
            rows_transferred: ctx.rows_transferred,
            rows_per_second,
            sequences_reset: ctx.sequences_reset,
            sequences_failed: ctx.sequences_failed,
            row_count_mismatches: ctx.row_count_mismatches.clone(),
        }
    }

    /// Serialize the result as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    operator: Arc<dyn Operator>,
    cancel: CancellationToken,
    dry_run: bool,
}

impl Orchestrator {
    /// Create an orchestrator over already-connected drivers.
    pub fn new(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            operator,
            cancel: CancellationToken::new(),
            dry_run: false,
        }
    }

    /// Open the MySQL source and PostgreSQL target pools.
    pub async fn connect(config: Config, operator: Arc<dyn Operator>) -> Result<Self> {
        let source_conns = config.migration.get_max_source_connections();
        let source = MysqlReader::new(&config.source, source_conns).await?;

        let pg_conns = config.migration.get_max_pg_connections();
        let target = PostgresWriter::new(&config.target, pg_conns).await?;

        Ok(Self::new(config, Arc::new(source), Arc::new(target), operator))
    }

    /// Use an external cancellation token (e.g. wired to SIGINT).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Only build the plan and preview the DDL.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the migration.
    pub async fn run(self) -> Result<MigrationResult> {
        let mut ctx = RunContext::new();
        info!("Starting migration run: {}", ctx.run_id);

        let outcome = self.execute(&mut ctx).await;

        self.source.close().await;
        self.target.close().await;

        match outcome {
            Ok(()) => {
                let result = MigrationResult::from_context(&ctx, self.dry_run);
                info!(
                    "Migration {}: {} tables, {} rows in {:.1}s ({} rows/s)",
                    result.status,
                    result.tables_total,
                    result.rows_transferred,
                    result.duration_seconds,
                    result.rows_per_second
                );
                Ok(result)
            }
            Err(e) => {
                let failed_in = ctx.state();
                ctx.fail();
                error!("Migration failed during {}: {}", failed_in, e);
                Err(e)
            }
        }
    }

    async fn execute(&self, ctx: &mut RunContext) -> Result<()> {
        let scope = CatalogScope::from_config(&self.config);

        // Phase 1: Catalog
        info!(
            "Phase 1: Reading {} catalog for prefix '{}'",
            self.source.db_type(),
            scope.prefix
        );
        let plan = catalog::build_plan(self.source.as_ref(), self.target.as_ref(), &scope).await?;
        ctx.tables_total = plan.len();
        ctx.advance(RunState::PlanBuilt)?;

        // Phase 2: Summary and confirmation
        let summary = plan.summary();
        self.operator.show_summary(&summary);
        self.log_maintenance_notice();

        if self.dry_run {
            for (table, statements) in ddl::plan_statements(&plan, &scope.target_schema)? {
                self.operator.ddl_preview(&table, &statements);
            }
            info!("Dry run: no changes made to the target");
            return ctx.advance(RunState::Done);
        }

        if summary.already_present > 0 && !self.config.migration.force {
            if !self.operator.confirm(&summary) {
                info!("Migration aborted by operator; target left unchanged");
                return ctx.advance(RunState::Aborted);
            }
        } else if summary.already_present > 0 {
            warn!(
                "{} existing target tables will be truncated (force)",
                summary.already_present
            );
        }
        ctx.advance(RunState::SummaryConfirmed)?;
        self.check_cancelled()?;

        // Phase 3: Schema
        info!("Phase 3: Preparing {} target tables", plan.len());
        let report = ddl::apply_schema(
            &plan,
            self.target.as_ref(),
            &scope.target_schema,
            self.operator.as_ref(),
        )
        .await?;
        ctx.tables_created = report.tables_created;
        ctx.tables_truncated = report.tables_truncated;
        ctx.advance(RunState::SchemaApplied)?;
        self.check_cancelled()?;

        // Phase 4: Data
        info!("Phase 4: Copying {} rows", plan.total_rows());
        let engine = Arc::new(TransferEngine::new(
            self.source.clone(),
            self.target.clone(),
            self.operator.clone(),
            TransferConfig {
                page_size: self.config.migration.page_size,
                workers: self.config.migration.get_workers(),
                source_schema: scope.source_schema.clone(),
                target_schema: scope.target_schema.clone(),
            },
            plan.total_rows(),
        ));
        let copied = engine.copy_all(&plan, &self.cancel).await;
        ctx.rows_transferred = engine.rows_copied();
        copied?;
        ctx.advance(RunState::DataCopied)?;
        self.check_cancelled()?;

        // Phase 5: Sequences
        if self.config.migration.reset_sequences {
            info!("Phase 5: Resetting sequences");
            let report = sequences::reconcile(
                &plan,
                self.target.as_ref(),
                &scope.target_schema,
                &scope.prefix,
                self.operator.as_ref(),
            )
            .await?;
            ctx.sequences_reset = report.reset;
            ctx.sequences_failed = report.failed;
        } else {
            info!("Phase 5: Sequence reset disabled");
        }
        ctx.advance(RunState::SequencesReconciled)?;

        // Phase 6: Validation
        if self.config.migration.validate_row_counts {
            info!("Phase 6: Validating row counts");
            ctx.row_count_mismatches = self.validate(&plan, &scope.target_schema).await?;
        }

        ctx.advance(RunState::Done)
    }

    /// Compare each table's target row count with its plan-time source count.
    async fn validate(&self, plan: &MigrationPlan, target_schema: &str) -> Result<Vec<RowCountMismatch>> {
        let mut mismatches = Vec::new();

        for table in plan.tables() {
            let target_rows = self
                .target
                .row_count(target_schema, &table.qualified_name)
                .await?;
            if target_rows != table.row_count {
                warn!(
                    "{}: row count mismatch (source {}, target {})",
                    table.qualified_name, table.row_count, target_rows
                );
                mismatches.push(RowCountMismatch {
                    table: table.qualified_name.clone(),
                    source_rows: table.row_count,
                    target_rows,
                });
            }
        }

        if mismatches.is_empty() {
            info!("Row counts match for all {} tables", plan.len());
        }
        Ok(mismatches)
    }

    fn log_maintenance_notice(&self) {
        if self.config.migration.maintenance {
            info!("Maintenance mode asserted: source must not be written during the run");
        } else {
            warn!(
                "Source is not declared to be in maintenance mode; writes during the run \
                 may be missed or copied twice"
            );
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(MigrateError::Cancelled)
        } else {
            Ok(())
        }
    }
}
