//! Type mapping from MySQL/MariaDB to PostgreSQL.
//!
//! [`MYSQL_TO_POSTGRES`] is the only place source types are matched. A type
//! missing from the table is a fatal error; nothing falls back to `text`.

use crate::core::schema::ColumnMeta;
use crate::error::{MigrateError, Result};

/// How the PostgreSQL type is produced for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// The declared `COLUMN_TYPE`, minus MySQL-only modifiers.
    Declared,
    /// `numeric(precision, scale)` from the catalog's numeric metadata, or
    /// unconstrained `numeric` when the scale is unknown.
    Numeric,
    /// A fixed PostgreSQL type name.
    Fixed(&'static str),
    /// Integer family: `serial` variant for auto-increment columns, and a
    /// wider pair for `unsigned` columns whose range exceeds the signed type.
    Integer {
        plain: &'static str,
        serial: &'static str,
        unsigned: &'static str,
        unsigned_serial: &'static str,
    },
}

/// Literal style of a column's declared default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultStyle {
    /// Numeric literal, emitted as-is.
    Verbatim,
    /// String or temporal literal, wrapped in single quotes.
    Quoted,
}

/// One row of the mapping table.
#[derive(Debug, Clone, Copy)]
pub struct TypeRule {
    pub source: &'static [&'static str],
    pub target: TargetType,
    pub default: DefaultStyle,
}

pub const MYSQL_TO_POSTGRES: &[TypeRule] = &[
    TypeRule {
        source: &["varchar", "char", "decimal", "numeric"],
        target: TargetType::Declared,
        default: DefaultStyle::Verbatim,
    },
    TypeRule {
        source: &["float"],
        target: TargetType::Numeric,
        default: DefaultStyle::Verbatim,
    },
    TypeRule {
        source: &["double", "real"],
        target: TargetType::Fixed("double precision"),
        default: DefaultStyle::Verbatim,
    },
    TypeRule {
        source: &["longtext", "mediumtext", "text", "tinytext"],
        target: TargetType::Fixed("text"),
        default: DefaultStyle::Quoted,
    },
    TypeRule {
        source: &["tinyint"],
        target: TargetType::Integer {
            plain: "smallint",
            serial: "smallserial",
            unsigned: "smallint",
            unsigned_serial: "smallserial",
        },
        default: DefaultStyle::Verbatim,
    },
    TypeRule {
        source: &["smallint"],
        target: TargetType::Integer {
            plain: "smallint",
            serial: "smallserial",
            unsigned: "integer",
            unsigned_serial: "serial",
        },
        default: DefaultStyle::Verbatim,
    },
    TypeRule {
        source: &["mediumint", "int", "integer"],
        target: TargetType::Integer {
            plain: "integer",
            serial: "serial",
            unsigned: "bigint",
            unsigned_serial: "bigserial",
        },
        default: DefaultStyle::Verbatim,
    },
    // No serial type covers the upper half of `bigint unsigned`; auto-increment
    // columns stay on bigserial.
    TypeRule {
        source: &["bigint"],
        target: TargetType::Integer {
            plain: "bigint",
            serial: "bigserial",
            unsigned: "numeric(20)",
            unsigned_serial: "bigserial",
        },
        default: DefaultStyle::Verbatim,
    },
    TypeRule {
        source: &[
            "longblob",
            "mediumblob",
            "blob",
            "tinyblob",
            "varbinary",
            "binary",
        ],
        target: TargetType::Fixed("bytea"),
        default: DefaultStyle::Quoted,
    },
    TypeRule {
        source: &["date"],
        target: TargetType::Fixed("date"),
        default: DefaultStyle::Quoted,
    },
    TypeRule {
        source: &["datetime", "timestamp"],
        target: TargetType::Fixed("timestamp"),
        default: DefaultStyle::Quoted,
    },
    TypeRule {
        source: &["time"],
        target: TargetType::Fixed("time"),
        default: DefaultStyle::Quoted,
    },
];

/// Find the rule for a MySQL `DATA_TYPE`.
pub fn lookup(source_type: &str) -> Option<&'static TypeRule> {
    let lower = source_type.to_lowercase();
    MYSQL_TO_POSTGRES
        .iter()
        .find(|rule| rule.source.contains(&lower.as_str()))
}

/// Map a column to its PostgreSQL type name.
pub fn map_type(table: &str, col: &ColumnMeta) -> Result<String> {
    let rule = lookup(&col.source_type).ok_or_else(|| unmapped(table, col))?;
    Ok(render_type(rule, col))
}

/// Map a column to its full definition fragment: `<type> NULL|NOT NULL [DEFAULT <v>]`.
pub fn map_column(table: &str, col: &ColumnMeta) -> Result<String> {
    let rule = lookup(&col.source_type).ok_or_else(|| unmapped(table, col))?;

    let mut fragment = render_type(rule, col);
    fragment.push_str(if col.nullable { " NULL" } else { " NOT NULL" });

    if let Some(default) = render_default(rule, col) {
        fragment.push_str(" DEFAULT ");
        fragment.push_str(&default);
    }

    Ok(fragment)
}

fn unmapped(table: &str, col: &ColumnMeta) -> MigrateError {
    MigrateError::UnmappedType {
        table: table.to_string(),
        column: col.name.clone(),
        data_type: col.source_type.clone(),
    }
}

fn render_type(rule: &TypeRule, col: &ColumnMeta) -> String {
    match rule.target {
        TargetType::Declared => strip_mysql_modifiers(&col.display_type),
        TargetType::Numeric => match (col.numeric_precision, col.numeric_scale) {
            (Some(p), Some(s)) => format!("numeric({},{})", p, s),
            // `numeric(p)` means scale 0 and would round every fraction
            _ => "numeric".to_string(),
        },
        TargetType::Fixed(name) => name.to_string(),
        TargetType::Integer {
            plain,
            serial,
            unsigned,
            unsigned_serial,
        } => {
            let name = match (col.is_unsigned(), col.is_auto_increment) {
                (false, false) => plain,
                (false, true) => serial,
                (true, false) => unsigned,
                (true, true) => unsigned_serial,
            };
            name.to_string()
        }
    }
}

/// Drop `unsigned` and `zerofill`, which PostgreSQL does not accept.
fn strip_mysql_modifiers(display_type: &str) -> String {
    display_type
        .split_whitespace()
        .filter(|word| {
            let w = word.to_lowercase();
            w != "unsigned" && w != "zerofill"
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the DEFAULT clause value, if the column declares one.
///
/// Auto-increment columns never get one: the serial type supplies it.
/// MariaDB reports a NULL default as the bare word `NULL` and quotes string
/// defaults itself; both spellings are accepted.
fn render_default(rule: &TypeRule, col: &ColumnMeta) -> Option<String> {
    if col.is_auto_increment {
        return None;
    }

    let raw = col.default_value.as_deref()?;
    if raw.is_empty() || raw == "NULL" {
        return None;
    }

    if raw.to_lowercase().starts_with("current_timestamp") {
        return Some("CURRENT_TIMESTAMP".to_string());
    }

    let quoted = match rule.target {
        TargetType::Declared => is_character_type(&col.source_type),
        _ => rule.default == DefaultStyle::Quoted,
    };

    if quoted && !raw.starts_with('\'') {
        Some(format!("'{}'", raw.replace('\'', "''")))
    } else {
        Some(raw.to_string())
    }
}

fn is_character_type(source_type: &str) -> bool {
    matches!(source_type.to_lowercase().as_str(), "varchar" | "char")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(source_type: &str, display_type: &str) -> ColumnMeta {
        ColumnMeta {
            name: "c".to_string(),
            source_type: source_type.to_string(),
            display_type: display_type.to_string(),
            nullable: false,
            default_value: None,
            numeric_precision: None,
            numeric_scale: None,
            is_auto_increment: false,
        }
    }

    #[test]
    fn test_every_rule_maps() {
        for rule in MYSQL_TO_POSTGRES {
            for source in rule.source {
                let mut c = col(source, source);
                c.numeric_precision = Some(10);
                c.numeric_scale = Some(2);
                let fragment = map_column("t", &c).unwrap();
                assert!(fragment.ends_with("NOT NULL"), "{} -> {}", source, fragment);
            }
        }
    }

    #[test]
    fn test_unknown_type_is_error() {
        let err = map_column("mdl_map", &col("geometry", "geometry")).unwrap_err();
        match err {
            MigrateError::UnmappedType {
                table,
                column,
                data_type,
            } => {
                assert_eq!(table, "mdl_map");
                assert_eq!(column, "c");
                assert_eq!(data_type, "geometry");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(map_type("t", &col("enum", "enum('a','b')")).is_err());
    }

    #[test]
    fn test_declared_types_pass_through() {
        assert_eq!(
            map_type("t", &col("varchar", "varchar(255)")).unwrap(),
            "varchar(255)"
        );
        assert_eq!(
            map_type("t", &col("decimal", "decimal(10,5)")).unwrap(),
            "decimal(10,5)"
        );
        assert_eq!(
            map_type("t", &col("decimal", "decimal(10,2) unsigned zerofill")).unwrap(),
            "decimal(10,2)"
        );
    }

    #[test]
    fn test_float_uses_numeric_metadata() {
        let mut c = col("float", "float(20,2)");
        c.numeric_precision = Some(20);
        c.numeric_scale = Some(2);
        assert_eq!(map_type("t", &c).unwrap(), "numeric(20,2)");

        c.numeric_precision = None;
        assert_eq!(map_type("t", &c).unwrap(), "numeric");
    }

    #[test]
    fn test_plain_float_keeps_fractions() {
        // MySQL reports a bare FLOAT as precision 12, scale NULL
        let mut c = col("float", "float");
        c.numeric_precision = Some(12);
        c.numeric_scale = None;
        assert_eq!(map_type("t", &c).unwrap(), "numeric");
    }

    #[test]
    fn test_unsigned_integers_widen() {
        let cases = [
            ("tinyint", "tinyint(3) unsigned", "smallint"),
            ("smallint", "smallint(5) unsigned", "integer"),
            ("mediumint", "mediumint(8) unsigned", "bigint"),
            ("int", "int(10) unsigned", "bigint"),
            ("bigint", "bigint(20) unsigned", "numeric(20)"),
        ];
        for (source, display, expected) in cases {
            assert_eq!(map_type("t", &col(source, display)).unwrap(), expected, "{}", display);
        }
    }

    #[test]
    fn test_unsigned_auto_increment_widens_serial() {
        let mut c = col("smallint", "smallint(5) unsigned");
        c.is_auto_increment = true;
        assert_eq!(map_type("t", &c).unwrap(), "serial");

        let mut c = col("bigint", "bigint(20) unsigned");
        c.is_auto_increment = true;
        assert_eq!(map_type("t", &c).unwrap(), "bigserial");
    }

    #[test]
    fn test_integer_family() {
        assert_eq!(map_type("t", &col("tinyint", "tinyint(1)")).unwrap(), "smallint");
        assert_eq!(map_type("t", &col("mediumint", "mediumint(6)")).unwrap(), "integer");
        assert_eq!(map_type("t", &col("int", "int(10)")).unwrap(), "integer");
        assert_eq!(map_type("t", &col("bigint", "bigint(10)")).unwrap(), "bigint");
        assert_eq!(map_type("t", &col("double", "double")).unwrap(), "double precision");
        assert_eq!(map_type("t", &col("longtext", "longtext")).unwrap(), "text");
    }

    #[test]
    fn test_auto_increment_becomes_serial() {
        let mut c = col("bigint", "bigint(10)");
        c.is_auto_increment = true;
        c.default_value = Some("0".to_string());
        assert_eq!(map_column("t", &c).unwrap(), "bigserial NOT NULL");

        let mut c = col("int", "int(10)");
        c.is_auto_increment = true;
        assert_eq!(map_type("t", &c).unwrap(), "serial");
    }

    #[test]
    fn test_nullability_and_numeric_default() {
        let mut c = col("bigint", "bigint(10)");
        c.nullable = true;
        c.default_value = Some("0".to_string());
        assert_eq!(map_column("t", &c).unwrap(), "bigint NULL DEFAULT 0");
    }

    #[test]
    fn test_string_default_quoted() {
        let mut c = col("varchar", "varchar(100)");
        c.default_value = Some("moodle".to_string());
        assert_eq!(
            map_column("t", &c).unwrap(),
            "varchar(100) NOT NULL DEFAULT 'moodle'"
        );

        c.default_value = Some("'moodle'".to_string());
        assert_eq!(
            map_column("t", &c).unwrap(),
            "varchar(100) NOT NULL DEFAULT 'moodle'"
        );

        c.default_value = Some("it's".to_string());
        assert_eq!(
            map_column("t", &c).unwrap(),
            "varchar(100) NOT NULL DEFAULT 'it''s'"
        );
    }

    #[test]
    fn test_empty_or_null_default_omitted() {
        let mut c = col("varchar", "varchar(100)");
        c.nullable = true;
        c.default_value = Some(String::new());
        assert_eq!(map_column("t", &c).unwrap(), "varchar(100) NULL");

        c.default_value = Some("NULL".to_string());
        assert_eq!(map_column("t", &c).unwrap(), "varchar(100) NULL");
    }

    #[test]
    fn test_timestamp_default() {
        let mut c = col("timestamp", "timestamp");
        c.default_value = Some("current_timestamp()".to_string());
        assert_eq!(
            map_column("t", &c).unwrap(),
            "timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"
        );

        let mut c = col("date", "date");
        c.default_value = Some("2020-01-01".to_string());
        assert_eq!(
            map_column("t", &c).unwrap(),
            "date NOT NULL DEFAULT '2020-01-01'"
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(lookup("VARCHAR").is_some());
        assert!(lookup("json").is_none());
    }
}
