//! Configuration type definitions with auto-tuning based on system resources.

use std::fmt;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL/MariaDB).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

/// Source database (MySQL/MariaDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type: "mysql" or "mariadb".
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema to read from. Defaults to the database name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// SSL mode: disabled, preferred, required (default: "preferred").
    #[serde(default = "default_preferred")]
    pub ssl_mode: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            r#type: default_mysql(),
            host: String::new(),
            port: default_mysql_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: None,
            ssl_mode: default_preferred(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type: "postgres", "postgresql" or "pgsql".
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            r#type: default_postgres(),
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_public_schema(),
            ssl_mode: default_disable(),
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
/// Performance-related fields use Option<T> to distinguish between
/// "not set" (use auto-tuned default) and "explicitly set" (use provided value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Table prefix shared by every table of the application (default: "mdl_").
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Logical table names to migrate. Empty means every prefixed table.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Logical table names to skip.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Rows per copy window (default: 1000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Number of tables copied in parallel. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Skip the confirmation prompt when target tables already exist.
    #[serde(default)]
    pub force: bool,

    /// Operator asserts the source application is in maintenance mode.
    #[serde(default)]
    pub maintenance: bool,

    /// Reset target sequences after the copy (default: true).
    #[serde(default = "default_true")]
    pub reset_sequences: bool,

    /// Compare source and target row counts after the copy.
    #[serde(default)]
    pub validate_row_counts: bool,

    /// Maximum MySQL connections. Auto-tuned based on workers if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_source_connections: Option<usize>,

    /// Maximum PostgreSQL connections. Auto-tuned based on workers if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pg_connections: Option<usize>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            page_size: default_page_size(),
            workers: None,
            force: false,
            maintenance: false,
            reset_sequences: true,
            validate_row_counts: false,
            max_source_connections: None,
            max_pg_connections: None,
        }
    }
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Half the cores, 1-8: each worker holds a source and a target connection
        let workers = *self
            .workers
            .get_or_insert_with(|| (resources.cpu_cores / 2).clamp(1, 8));

        // One spare connection per side for catalog queries and sequence work
        if self.max_source_connections.is_none() {
            self.max_source_connections = Some(workers + 1);
        }
        if self.max_pg_connections.is_none() {
            self.max_pg_connections = Some(workers + 1);
        }

        info!(
            "Auto-tuned config: workers={}, page_size={}, source_conns={}, pg_conns={}",
            workers,
            self.page_size,
            self.get_max_source_connections(),
            self.get_max_pg_connections(),
        );

        self
    }

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(4)
    }

    pub fn get_max_source_connections(&self) -> usize {
        self.max_source_connections
            .unwrap_or_else(|| self.get_workers() + 1)
    }

    pub fn get_max_pg_connections(&self) -> usize {
        self.max_pg_connections
            .unwrap_or_else(|| self.get_workers() + 1)
    }
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_preferred() -> String {
    "preferred".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_prefix() -> String {
    "mdl_".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}
