//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

const SOURCE_TYPES: &[&str] = &["mysql", "mariadb"];
const TARGET_TYPES: &[&str] = &["postgres", "postgresql", "pgsql"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if !SOURCE_TYPES.contains(&config.source.r#type.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "source.type must be one of {:?}, got '{}'",
            SOURCE_TYPES, config.source.r#type
        )));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if !TARGET_TYPES.contains(&config.target.r#type.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "target.type must be one of {:?}, got '{}'",
            TARGET_TYPES, config.target.r#type
        )));
    }

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let migration = &config.migration;
    if migration.page_size == 0 {
        return Err(MigrateError::Config(
            "migration.page_size must be at least 1".into(),
        ));
    }
    if let Some(0) = migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if migration
        .prefix
        .chars()
        .any(|c| matches!(c, '\'' | '"' | '`' | '\\'))
    {
        return Err(MigrateError::Config(format!(
            "migration.prefix contains a quote character: '{}'",
            migration.prefix
        )));
    }

    Ok(())
}
