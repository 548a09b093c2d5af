//! Run state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Phase of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Connecting,
    PlanBuilt,
    SummaryConfirmed,
    SchemaApplied,
    DataCopied,
    SequencesReconciled,
    Done,
    /// A fatal error stopped the run.
    Failed,
    /// The operator declined to continue; nothing was written.
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Aborted)
    }

    /// Whether `next` may follow `self`.
    ///
    /// Any live state may fail. A dry run finishes straight after the plan.
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Connecting, PlanBuilt)
                | (PlanBuilt, SummaryConfirmed)
                | (PlanBuilt, Aborted)
                | (PlanBuilt, Done)
                | (SummaryConfirmed, SchemaApplied)
                | (SchemaApplied, DataCopied)
                | (DataCopied, SequencesReconciled)
                | (SequencesReconciled, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Connecting => "connecting",
            RunState::PlanBuilt => "plan_built",
            RunState::SummaryConfirmed => "summary_confirmed",
            RunState::SchemaApplied => "schema_applied",
            RunState::DataCopied => "data_copied",
            RunState::SequencesReconciled => "sequences_reconciled",
            RunState::Done => "done",
            RunState::Failed => "failed",
            RunState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source and target row counts that disagree after the copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCountMismatch {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
}

/// The one mutable record of a run. Stages borrow it in turn.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    state: RunState,
    pub started_at: DateTime<Utc>,
    transitions: Vec<(RunState, DateTime<Utc>)>,
    pub tables_total: usize,
    pub tables_created: usize,
    pub tables_truncated: usize,
    pub rows_transferred: i64,
    pub sequences_reset: usize,
    pub sequences_failed: usize,
    pub row_count_mismatches: Vec<RowCountMismatch>,
}

impl RunContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            state: RunState::Connecting,
            started_at: now,
            transitions: vec![(RunState::Connecting, now)],
            tables_total: 0,
            tables_created: 0,
            tables_truncated: 0,
            rows_transferred: 0,
            sequences_reset: 0,
            sequences_failed: 0,
            row_count_mismatches: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// States visited so far, in order.
    pub fn history(&self) -> Vec<RunState> {
        self.transitions.iter().map(|(s, _)| *s).collect()
    }

    /// Move to `next`, rejecting moves the state machine does not allow.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(MigrateError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.transitions.push((next, Utc::now()));
        Ok(())
    }

    /// Mark the run failed unless it already ended.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = RunState::Failed;
            self.transitions.push((RunState::Failed, Utc::now()));
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
