//! Terminal operator: summary, confirmation prompt and progress lines.

use std::io::{BufRead, IsTerminal, Write};

use dbmigrate::{Operator, PlanSummary, ProgressEvent};
use dialoguer::Confirm;
use tracing::warn;

/// Prints to stdout, or to stderr when stdout is reserved for JSON output.
pub struct TerminalOperator {
    to_stderr: bool,
}

impl TerminalOperator {
    pub fn new(json_output: bool) -> Self {
        Self {
            to_stderr: json_output,
        }
    }

    fn line(&self, text: &str) {
        if self.to_stderr {
            eprintln!("{}", text);
        } else {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", text);
        }
    }
}

impl Operator for TerminalOperator {
    fn show_summary(&self, summary: &PlanSummary) {
        self.line("");
        self.line("Migration summary:");
        self.line(&format!(
            "  Tables in source:        {}",
            summary.source_table_count
        ));
        self.line(&format!("  Tables to migrate:       {}", summary.to_migrate));
        self.line(&format!(
            "  Already in target:       {} (will be truncated)",
            summary.already_present
        ));
        self.line(&format!("  To be created:           {}", summary.to_create));
        self.line(&format!("  Rows to copy:            {}", summary.total_rows));
        self.line("");
    }

    fn confirm(&self, summary: &PlanSummary) -> bool {
        self.line(&format!(
            "{} target tables already exist and will be emptied before loading.",
            summary.already_present
        ));
        if !std::io::stdin().is_terminal() {
            self.line("Continue? (Y,y,N,n)");
            return match read_answer(std::io::stdin().lock()) {
                Ok(answer) => answer,
                Err(e) => {
                    warn!("Could not read confirmation, not continuing: {}", e);
                    false
                }
            };
        }
        match Confirm::new()
            .with_prompt("Continue? (Y,y,N,n)")
            .default(false)
            .show_default(false)
            .wait_for_newline(true)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Could not read confirmation, not continuing: {}", e);
                false
            }
        }
    }

    fn progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::SchemaApplied { table, created } => {
                let action = if *created { "created" } else { "truncated" };
                self.line(&format!("  {} {}", action, table));
            }
            ProgressEvent::TableStarted { table, rows } => {
                self.line(&format!("Copying {} ({} rows)", table, rows));
            }
            ProgressEvent::Window { table, .. } => {
                self.line(&format!(
                    "  {}: {:5.1}% of table, {:5.1}% overall",
                    table,
                    event.table_percent().unwrap_or(100.0),
                    event.total_percent().unwrap_or(100.0)
                ));
            }
            ProgressEvent::TableFinished { table, rows } => {
                self.line(&format!("  {}: done, {} rows", table, rows));
            }
            ProgressEvent::SequenceReset {
                sequence,
                next_value,
            } => {
                self.line(&format!("  sequence {} -> {}", sequence, next_value));
            }
        }
    }

    fn ddl_preview(&self, table: &str, statements: &[String]) {
        self.line(&format!("-- {}", table));
        for sql in statements {
            self.line(&format!("{};", sql));
        }
    }
}

/// Read one answer line from piped input. Only `Y` or `y` continues.
fn read_answer<R: BufRead>(mut input: R) -> std::io::Result<bool> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(matches!(line.trim(), "Y" | "y"))
}
