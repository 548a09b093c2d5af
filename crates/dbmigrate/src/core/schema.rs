//! Schema and plan types for the migration.
//!
//! Catalog rows are decoded into these types at the driver boundary. They are
//! read-only snapshots: built once while the plan is assembled and never
//! mutated after the operator has confirmed the run.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Column metadata as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,

    /// Base type name (MySQL `DATA_TYPE`), lowercased.
    pub source_type: String,

    /// Full declared type (MySQL `COLUMN_TYPE`), e.g. `varchar(255)`.
    pub display_type: String,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Declared default, verbatim from the catalog.
    pub default_value: Option<String>,

    /// Numeric precision, when the catalog reports one.
    pub numeric_precision: Option<i64>,

    /// Numeric scale, when the catalog reports one.
    pub numeric_scale: Option<i64>,

    /// Whether the column is auto-incremented by the source engine.
    pub is_auto_increment: bool,
}

impl ColumnMeta {
    /// Whether the declared type carries MySQL's `unsigned` modifier.
    pub fn is_unsigned(&self) -> bool {
        self.display_type.to_lowercase().contains("unsigned")
    }
}

/// Kind of key an index enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Primary,
    Unique,
}

impl IndexKind {
    /// Map an `INFORMATION_SCHEMA.TABLE_CONSTRAINTS.CONSTRAINT_TYPE` value.
    pub fn from_constraint_type(constraint_type: &str) -> Option<Self> {
        match constraint_type.to_uppercase().as_str() {
            "PRIMARY KEY" => Some(IndexKind::Primary),
            "UNIQUE" => Some(IndexKind::Unique),
            _ => None,
        }
    }
}

/// Primary key or unique index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index (constraint) name.
    pub name: String,

    /// Primary or unique.
    pub kind: IndexKind,

    /// Key columns in key order.
    pub columns: Vec<String>,
}

impl IndexMeta {
    pub fn new(name: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: Vec::new(),
        }
    }

    /// Place `column` at the 1-based key position `seq`.
    ///
    /// A position that is already filled is overwritten, so a column never
    /// appears twice for the same position. Positions past the end extend the
    /// list; the catalog reports positions 1..n so no gap survives a full load.
    pub fn set_column(&mut self, seq: usize, column: impl Into<String>) {
        let idx = seq.saturating_sub(1);
        let column = column.into();
        if idx < self.columns.len() {
            self.columns[idx] = column;
        } else {
            self.columns.resize(idx, String::new());
            self.columns.push(column);
        }
    }

    pub fn is_primary(&self) -> bool {
        self.kind == IndexKind::Primary
    }
}

/// Table metadata plus the row count captured when the plan was built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    /// Name without the installation prefix.
    pub logical_name: String,

    /// Prefix + logical name, as stored in both databases.
    pub qualified_name: String,

    /// Row count at plan time.
    pub row_count: i64,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnMeta>,

    /// Primary and unique indexes in discovery order.
    pub indexes: IndexMap<String, IndexMeta>,
}

impl TableMeta {
    pub fn new(prefix: &str, logical_name: impl Into<String>) -> Self {
        let logical_name = logical_name.into();
        Self {
            qualified_name: format!("{}{}", prefix, logical_name),
            logical_name,
            row_count: 0,
            columns: Vec::new(),
            indexes: IndexMap::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key(&self) -> Option<&IndexMeta> {
        self.indexes.values().find(|i| i.is_primary())
    }

    /// Columns that give a total, stable order for paging.
    ///
    /// The primary key when present, otherwise the first unique index whose
    /// columns are all NOT NULL. `None` means no such key exists.
    pub fn copy_key(&self) -> Option<&IndexMeta> {
        self.primary_key().or_else(|| {
            self.indexes.values().find(|idx| {
                !idx.columns.is_empty()
                    && idx
                        .columns
                        .iter()
                        .all(|c| self.column(c).is_some_and(|col| !col.nullable))
            })
        })
    }

    /// Positions of the copy key columns within [`TableMeta::columns`].
    pub fn copy_key_positions(&self) -> Option<Vec<usize>> {
        let key = self.copy_key()?;
        key.columns
            .iter()
            .map(|k| self.columns.iter().position(|c| &c.name == k))
            .collect()
    }
}

/// Immutable set of tables selected for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Logical name -> table, in plan order.
    tables: IndexMap<String, TableMeta>,

    /// Logical names of tables already present on the target.
    existing_on_target: IndexSet<String>,

    /// Number of prefixed tables found in the source catalog.
    source_table_count: usize,
}

impl MigrationPlan {
    pub fn new(source_table_count: usize) -> Self {
        Self {
            source_table_count,
            ..Default::default()
        }
    }

    /// Add a table and record whether the target already has it.
    pub fn insert(&mut self, table: TableMeta, exists_on_target: bool) {
        let name = table.logical_name.clone();
        if exists_on_target {
            self.existing_on_target.insert(name.clone());
        } else {
            self.existing_on_target.shift_remove(&name);
        }
        self.tables.insert(name, table);
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.values()
    }

    pub fn get(&self, logical_name: &str) -> Option<&TableMeta> {
        self.tables.get(logical_name)
    }

    pub fn contains(&self, logical_name: &str) -> bool {
        self.tables.contains_key(logical_name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn exists_on_target(&self, logical_name: &str) -> bool {
        self.existing_on_target.contains(logical_name)
    }

    /// Tables that will be created, in plan order.
    pub fn tables_to_create(&self) -> Vec<&TableMeta> {
        self.tables
            .values()
            .filter(|t| !self.existing_on_target.contains(&t.logical_name))
            .collect()
    }

    /// Tables that will be truncated and reloaded, in plan order.
    pub fn tables_existing(&self) -> Vec<&TableMeta> {
        self.tables
            .values()
            .filter(|t| self.existing_on_target.contains(&t.logical_name))
            .collect()
    }

    pub fn total_rows(&self) -> i64 {
        self.tables.values().map(|t| t.row_count).sum()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            source_table_count: self.source_table_count,
            to_migrate: self.tables.len(),
            already_present: self.existing_on_target.len(),
            to_create: self.tables.len() - self.existing_on_target.len(),
            total_rows: self.total_rows(),
        }
    }
}

/// Pre-flight figures shown to the operator before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub source_table_count: usize,
    pub to_migrate: usize,
    pub already_present: usize,
    pub to_create: usize,
    pub total_rows: i64,
}

/// A target column whose default calls `nextval`, as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceColumn {
    pub table_name: String,
    pub column_name: String,
    pub column_default: String,
}

/// A target sequence backing an auto-increment column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub sequence_name: String,
    /// Target table name (prefix included).
    pub table_name: String,
    pub key_column: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, nullable: bool) -> ColumnMeta {
        ColumnMeta {
            name: name.to_string(),
            source_type: "bigint".to_string(),
            display_type: "bigint(10)".to_string(),
            nullable,
            default_value: None,
            numeric_precision: Some(19),
            numeric_scale: Some(0),
            is_auto_increment: false,
        }
    }

    fn table_with_unique(nullable: bool) -> TableMeta {
        let mut table = TableMeta::new("mdl_", "user_prefs");
        table.columns = vec![column("userid", nullable), column("name", false)];
        let mut idx = IndexMeta::new("mdl_userpref_usenam_uix", IndexKind::Unique);
        idx.set_column(1, "userid");
        idx.set_column(2, "name");
        table.indexes.insert(idx.name.clone(), idx);
        table
    }

    #[test]
    fn test_set_column_overwrites_position() {
        let mut idx = IndexMeta::new("uix", IndexKind::Unique);
        idx.set_column(1, "a");
        idx.set_column(2, "b");
        idx.set_column(1, "c");
        assert_eq!(idx.columns, vec!["c", "b"]);
    }

    #[test]
    fn test_set_column_out_of_order() {
        let mut idx = IndexMeta::new("uix", IndexKind::Unique);
        idx.set_column(2, "b");
        idx.set_column(1, "a");
        assert_eq!(idx.columns, vec!["a", "b"]);
    }

    #[test]
    fn test_unsigned_detection() {
        let mut col = column("id", false);
        assert!(!col.is_unsigned());
        col.display_type = "int(10) unsigned".to_string();
        assert!(col.is_unsigned());
    }

    #[test]
    fn test_copy_key_prefers_primary() {
        let mut table = table_with_unique(false);
        table.columns.insert(0, column("id", false));
        let mut pk = IndexMeta::new("PRIMARY", IndexKind::Primary);
        pk.set_column(1, "id");
        table.indexes.insert(pk.name.clone(), pk);

        assert_eq!(table.copy_key().unwrap().name, "PRIMARY");
        assert_eq!(table.copy_key_positions(), Some(vec![0]));
    }

    #[test]
    fn test_copy_key_unique_not_null() {
        let table = table_with_unique(false);
        assert_eq!(table.copy_key().unwrap().name, "mdl_userpref_usenam_uix");
        assert_eq!(table.copy_key_positions(), Some(vec![0, 1]));
    }

    #[test]
    fn test_copy_key_skips_nullable_unique() {
        let table = table_with_unique(true);
        assert!(table.copy_key().is_none());
    }

    #[test]
    fn test_plan_sets_are_disjoint() {
        let mut plan = MigrationPlan::new(5);
        let mut user = TableMeta::new("mdl_", "user");
        user.row_count = 10;
        let mut course = TableMeta::new("mdl_", "course");
        course.row_count = 3;

        plan.insert(user, true);
        plan.insert(course, false);

        let created: Vec<_> = plan
            .tables_to_create()
            .iter()
            .map(|t| t.logical_name.clone())
            .collect();
        let existing: Vec<_> = plan
            .tables_existing()
            .iter()
            .map(|t| t.logical_name.clone())
            .collect();
        assert_eq!(created, vec!["course"]);
        assert_eq!(existing, vec!["user"]);

        let summary = plan.summary();
        assert_eq!(summary.source_table_count, 5);
        assert_eq!(summary.to_migrate, 2);
        assert_eq!(summary.already_present, 1);
        assert_eq!(summary.to_create, 1);
        assert_eq!(summary.total_rows, 13);
    }

    #[test]
    fn test_plan_reinsert_updates_existence() {
        let mut plan = MigrationPlan::new(1);
        plan.insert(TableMeta::new("mdl_", "user"), true);
        plan.insert(TableMeta::new("mdl_", "user"), false);
        assert_eq!(plan.len(), 1);
        assert!(!plan.exists_on_target("user"));
        assert_eq!(plan.tables_to_create().len(), 1);
    }

    #[test]
    fn test_plan_json_keeps_order_and_existence() {
        let mut plan = MigrationPlan::new(3);
        plan.insert(table_with_unique(false), false);
        plan.insert(TableMeta::new("mdl_", "course"), true);
        plan.insert(TableMeta::new("mdl_", "assign"), false);

        let json = serde_json::to_string(&plan).unwrap();
        let back: MigrationPlan = serde_json::from_str(&json).unwrap();

        let names: Vec<_> = back.tables().map(|t| t.logical_name.as_str()).collect();
        assert_eq!(names, vec!["user_prefs", "course", "assign"]);
        assert!(back.exists_on_target("course"));
        assert!(!back.exists_on_target("assign"));
        assert_eq!(
            back.get("user_prefs").unwrap().indexes["mdl_userpref_usenam_uix"].columns,
            vec!["userid", "name"]
        );
        assert_eq!(back.summary().source_table_count, 3);
    }

    #[test]
    fn test_qualified_name() {
        let table = TableMeta::new("mdl_", "course");
        assert_eq!(table.qualified_name, "mdl_course");
        assert_eq!(table.logical_name, "course");
    }
}
