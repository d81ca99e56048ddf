//! SQL dialect support

use serde::{Deserialize, Serialize};
use sqlparser::dialect::{Dialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use std::str::FromStr;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    PostgreSQL,
    MySQL,
    MsSql,
}

impl SqlDialect {
    /// Get the sqlparser dialect for parsing
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
            SqlDialect::MySQL => Box::new(MySqlDialect {}),
            SqlDialect::MsSql => Box::new(MsSqlDialect {}),
        }
    }

    /// Get default schema name for this dialect
    ///
    /// Unqualified table references are attributed to this schema. An empty
    /// string means table names are rendered without a schema prefix.
    pub fn default_schema(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "public",
            SqlDialect::MySQL => "",
            SqlDialect::MsSql => "dbo",
        }
    }

    /// Bind-parameter token that stands for the key value in generated SQL
    pub fn key_placeholder(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "$1",
            SqlDialect::MySQL => "?",
            SqlDialect::MsSql => "@key",
        }
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(SqlDialect::PostgreSQL),
            "mysql" | "mysql8" => Ok(SqlDialect::MySQL),
            "mssql" | "sqlserver" | "tsql" => Ok(SqlDialect::MsSql),
            _ => Err(format!(
                "Unknown dialect: '{}'. Supported dialects: postgresql, mysql, mssql.",
                s
            )),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::MySQL => write!(f, "mysql"),
            SqlDialect::MsSql => write!(f, "mssql"),
        }
    }
}
