//! In-memory source, target and operator used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use dbmigrate::core::Row;
use dbmigrate::{
    Batch, ColumnMeta, Config, IndexKind, IndexMeta, MigrateError, Operator, PlanSummary,
    ProgressEvent, Result, SequenceColumn, SequenceRecord, SourceReader, SqlNullType, SqlValue,
    TargetWriter, WindowCursor, WindowRequest,
};

pub const PREFIX: &str = "mdl_";

pub fn config(page_size: usize) -> Config {
    let yaml = format!(
        r#"
source:
  host: mysql.local
  database: moodle
  user: moodle
  password: secret
target:
  host: pg.local
  database: moodle
  user: postgres
  password: secret
migration:
  page_size: {}
  workers: 2
"#,
        page_size
    );
    Config::from_yaml(&yaml).unwrap()
}

// ----- column and row builders -----

pub fn id_column() -> ColumnMeta {
    ColumnMeta {
        name: "id".to_string(),
        source_type: "bigint".to_string(),
        display_type: "bigint(10)".to_string(),
        nullable: false,
        default_value: None,
        numeric_precision: Some(19),
        numeric_scale: Some(0),
        is_auto_increment: true,
    }
}

pub fn bigint(name: &str) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        source_type: "bigint".to_string(),
        display_type: "bigint(10)".to_string(),
        nullable: false,
        default_value: Some("0".to_string()),
        numeric_precision: Some(19),
        numeric_scale: Some(0),
        is_auto_increment: false,
    }
}

pub fn varchar(name: &str, nullable: bool) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        source_type: "varchar".to_string(),
        display_type: "varchar(255)".to_string(),
        nullable,
        default_value: None,
        numeric_precision: None,
        numeric_scale: None,
        is_auto_increment: false,
    }
}

pub fn primary(columns: &[&str]) -> (String, IndexMeta) {
    let mut index = IndexMeta::new("PRIMARY", IndexKind::Primary);
    for (i, c) in columns.iter().enumerate() {
        index.set_column(i + 1, *c);
    }
    (index.name.clone(), index)
}

pub fn unique(name: &str, columns: &[&str]) -> (String, IndexMeta) {
    let mut index = IndexMeta::new(name, IndexKind::Unique);
    for (i, c) in columns.iter().enumerate() {
        index.set_column(i + 1, *c);
    }
    (index.name.clone(), index)
}

pub fn text(s: &str) -> SqlValue<'static> {
    SqlValue::Text(s.to_string().into())
}

pub fn null_text() -> SqlValue<'static> {
    SqlValue::Null(SqlNullType::String)
}

/// Rows `(id, "name-<id>")` for the given ids.
pub fn id_rows(ids: impl IntoIterator<Item = i64>) -> Vec<Row> {
    ids.into_iter()
        .map(|id| vec![SqlValue::I64(id), text(&format!("name-{}", id))])
        .collect()
}

fn as_i64(value: &SqlValue<'_>) -> i64 {
    match value {
        SqlValue::I16(v) => *v as i64,
        SqlValue::I32(v) => *v as i64,
        SqlValue::I64(v) => *v,
        other => panic!("fake key must be an integer, got {:?}", other),
    }
}

fn key_of(row: &Row, positions: &[usize]) -> Vec<i64> {
    positions.iter().map(|&p| as_i64(&row[p])).collect()
}

// ----- source -----

pub struct SourceTable {
    pub columns: Vec<ColumnMeta>,
    pub indexes: IndexMap<String, IndexMeta>,
    pub rows: Vec<Row>,
}

#[derive(Default)]
pub struct FakeSource {
    pub tables: BTreeMap<String, SourceTable>,
    pub windows_read: AtomicUsize,
    /// Mark the window that reaches the end of the table as final, even when full.
    pub knows_end: bool,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knowing_end(mut self) -> Self {
        self.knows_end = true;
        self
    }

    pub fn with_table(
        mut self,
        name: &str,
        columns: Vec<ColumnMeta>,
        indexes: Vec<(String, IndexMeta)>,
        rows: Vec<Row>,
    ) -> Self {
        self.tables.insert(
            name.to_string(),
            SourceTable {
                columns,
                indexes: indexes.into_iter().collect(),
                rows,
            },
        );
        self
    }

    /// A `(id, name)` table keyed by an auto-increment primary key.
    pub fn with_id_table(self, name: &str, rows: Vec<Row>) -> Self {
        self.with_table(
            name,
            vec![id_column(), varchar("name", true)],
            vec![primary(&["id"])],
            rows,
        )
    }

    fn table(&self, name: &str) -> Result<&SourceTable> {
        self.tables
            .get(name)
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no such table {}", name)))
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn list_tables(&self, _schema: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .keys()
            .filter_map(|name| name.strip_prefix(prefix))
            .map(str::to_string)
            .collect())
    }

    async fn row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.table(table)?.rows.len() as i64)
    }

    async fn load_columns(&self, _schema: &str, table: &str) -> Result<Vec<ColumnMeta>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn load_indexes(
        &self,
        _schema: &str,
        table: &str,
    ) -> Result<IndexMap<String, IndexMeta>> {
        Ok(self.table(table)?.indexes.clone())
    }

    async fn read_window(&self, request: WindowRequest<'_>) -> Result<Batch> {
        self.windows_read.fetch_add(1, Ordering::SeqCst);
        let source = self.table(&request.table.qualified_name)?;

        let remaining: Vec<Row> = match &request.cursor {
            WindowCursor::Offset(offset) => {
                source.rows.iter().skip(*offset as usize).cloned().collect()
            }
            cursor => {
                let positions = request
                    .table
                    .copy_key_positions()
                    .expect("keyset window requires a key");
                let mut sorted = source.rows.clone();
                sorted.sort_by_key(|row| key_of(row, &positions));

                let after = match cursor {
                    WindowCursor::After(key) => Some(key.iter().map(as_i64).collect::<Vec<_>>()),
                    _ => None,
                };
                sorted
                    .into_iter()
                    .filter(|row| match &after {
                        Some(last) => key_of(row, &positions) > *last,
                        None => true,
                    })
                    .collect()
            }
        };

        let is_last = if self.knows_end {
            remaining.len() <= request.limit
        } else {
            remaining.len() < request.limit
        };
        let rows: Vec<Row> = remaining.into_iter().take(request.limit).collect();
        let batch = Batch::new(rows);
        Ok(if is_last { batch.mark_final() } else { batch })
    }

    fn db_type(&self) -> &str {
        "fake-mysql"
    }

    async fn close(&self) {}
}

// ----- target -----

#[derive(Debug, Default, Clone)]
pub struct TargetTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct TargetState {
    pub tables: BTreeMap<String, TargetTable>,
    pub executed: Vec<String>,
    pub sequences: Vec<SequenceColumn>,
    pub sequence_values: HashMap<String, i64>,
    pub copies: usize,
}

#[derive(Default)]
pub struct FakeTarget {
    pub state: Mutex<TargetState>,
    pub fail_write_on: Option<String>,
    pub fail_sequence: Option<String>,
    pub fail_sequence_listing: bool,
}

/// Table name out of `... "schema"."table" ...`.
fn table_in(sql: &str) -> String {
    let start = sql.find("\".\"").map(|i| i + 3).unwrap_or(0);
    let rest = &sql[start..];
    rest[..rest.find('"').unwrap_or(rest.len())].to_string()
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(table: &str) -> Self {
        Self {
            fail_write_on: Some(table.to_string()),
            ..Self::default()
        }
    }

    /// `setval` fails for this sequence only.
    pub fn failing_sequence(sequence: &str) -> Self {
        Self {
            fail_sequence: Some(sequence.to_string()),
            ..Self::default()
        }
    }

    /// The sequence catalog query fails.
    pub fn failing_sequence_listing() -> Self {
        Self {
            fail_sequence_listing: true,
            ..Self::default()
        }
    }

    /// Pre-existing target table with rows.
    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            TargetTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn copies(&self) -> usize {
        self.state.lock().unwrap().copies
    }

    pub fn sequence_value(&self, sequence: &str) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .sequence_values
            .get(sequence)
            .copied()
    }
}

#[async_trait]
impl TargetWriter for FakeTarget {
    async fn table_exists(&self, _schema: &str, table: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().tables.contains_key(table))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        let name = table_in(sql);

        if sql.starts_with("CREATE TABLE") {
            let mut table = TargetTable::default();
            for line in sql.lines().skip(1) {
                let Some(rest) = line.trim().strip_prefix('"') else {
                    continue;
                };
                let column = rest[..rest.find('"').unwrap_or(rest.len())].to_string();
                if line.contains("serial") {
                    state.sequences.push(SequenceColumn {
                        table_name: name.clone(),
                        column_name: column.clone(),
                        column_default: format!("nextval('{}_{}_seq'::regclass)", name, column),
                    });
                }
                table.columns.push(column);
            }
            state.tables.insert(name, table);
        } else if sql.starts_with("TRUNCATE") {
            match state.tables.get_mut(&name) {
                Some(table) => table.rows.clear(),
                None => return Err(MigrateError::ddl(name, "relation does not exist")),
            }
        }
        Ok(())
    }

    async fn write_batch(
        &self,
        _schema: &str,
        table: &str,
        _cols: &[String],
        batch: Batch,
    ) -> Result<u64> {
        if self.fail_write_on.as_deref() == Some(table) {
            return Err(MigrateError::transfer(table, "COPY send: connection reset"));
        }
        let mut state = self.state.lock().unwrap();
        state.copies += 1;
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::transfer(table, "relation does not exist"))?;
        let n = batch.rows.len() as u64;
        target.rows.extend(batch.rows);
        Ok(n)
    }

    async fn list_sequences(&self, _schema: &str, prefix: &str) -> Result<Vec<SequenceColumn>> {
        if self.fail_sequence_listing {
            return Err(MigrateError::pool(
                "permission denied for information_schema",
                "listing sequences",
            ));
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .sequences
            .iter()
            .filter(|s| s.table_name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn set_sequence(&self, _schema: &str, record: &SequenceRecord) -> Result<i64> {
        if self.fail_sequence.as_deref() == Some(record.sequence_name.as_str()) {
            return Err(MigrateError::pool(
                "permission denied for sequence",
                record.sequence_name.clone(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        let table = state
            .tables
            .get(&record.table_name)
            .ok_or_else(|| MigrateError::transfer(&record.table_name, "relation does not exist"))?;
        let position = table
            .columns
            .iter()
            .position(|c| c == &record.key_column)
            .ok_or_else(|| MigrateError::transfer(&record.table_name, "no such column"))?;
        let max = table
            .rows
            .iter()
            .map(|row| as_i64(&row[position]))
            .max()
            .unwrap_or(0);
        let next = max + 1;
        state
            .sequence_values
            .insert(record.sequence_name.clone(), next);
        Ok(next)
    }

    async fn row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.rows(table).len() as i64)
    }

    fn db_type(&self) -> &str {
        "fake-postgres"
    }

    async fn close(&self) {}
}

// ----- operator -----

/// Operator with a fixed answer that records everything it is shown.
#[derive(Default)]
pub struct ScriptedOperator {
    pub answer: bool,
    pub confirms: AtomicUsize,
    pub summaries: Mutex<Vec<PlanSummary>>,
    pub events: Mutex<Vec<ProgressEvent>>,
    pub previews: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedOperator {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }

    pub fn confirm_count(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Operator for ScriptedOperator {
    fn show_summary(&self, summary: &PlanSummary) {
        self.summaries.lock().unwrap().push(*summary);
    }

    fn confirm(&self, _summary: &PlanSummary) -> bool {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        self.answer
    }

    fn progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn ddl_preview(&self, table: &str, statements: &[String]) {
        self.previews
            .lock()
            .unwrap()
            .push((table.to_string(), statements.to_vec()));
    }
}
