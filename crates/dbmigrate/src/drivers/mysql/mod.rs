//! MySQL/MariaDB source driver.
//!
//! Supported versions: MySQL 5.7+, 8.0+ and MariaDB 10.2+. Keyset windows
//! use row-value comparisons, which both support.

mod reader;

pub use reader::MysqlReader;
