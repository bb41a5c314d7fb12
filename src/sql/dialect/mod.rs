//! SQL dialect differences that matter for join statistics.
//!
//! Discovery only emits a handful of aggregate and sample queries, so the
//! dialect surface is small:
//!
//! - Identifier quoting: `"` (ANSI/PG/DuckDB/Snowflake), `` ` `` (MySQL), `[]` (T-SQL)
//! - Row limiting: `LIMIT n` vs `TOP n`
//! - Parser dialect used by the read-only guard

pub mod helpers;

use sqlparser::dialect::{
    Dialect as ParserDialect, DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SnowflakeDialect,
};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    DuckDb,
    MySql,
    TSql,
    Snowflake,
}

impl Dialect {
    /// Resolve the dialect for a worker driver name.
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Dialect::Postgres),
            "duckdb" | "duck" => Some(Dialect::DuckDb),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            "mssql" | "sqlserver" | "sql_server" | "tsql" => Some(Dialect::TSql),
            "snowflake" => Some(Dialect::Snowflake),
            _ => None,
        }
    }

    /// Dialect name for display/logging.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::DuckDb => "duckdb",
            Dialect::MySql => "mysql",
            Dialect::TSql => "tsql",
            Dialect::Snowflake => "snowflake",
        }
    }

    /// Quote a single identifier (column, alias).
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => helpers::quote_backtick(ident),
            Dialect::TSql => helpers::quote_bracket(ident),
            Dialect::Postgres | Dialect::DuckDb | Dialect::Snowflake => {
                helpers::quote_double(ident)
            }
        }
    }

    /// Quote a possibly schema-qualified table name.
    pub fn quote_table(&self, table: &str) -> String {
        match self {
            Dialect::MySql => helpers::quote_qualified(table, helpers::quote_backtick),
            Dialect::TSql => helpers::quote_qualified(table, helpers::quote_bracket),
            Dialect::Postgres | Dialect::DuckDb | Dialect::Snowflake => {
                helpers::quote_qualified(table, helpers::quote_double)
            }
        }
    }

    /// Whether row limits are written as `SELECT TOP n` instead of `LIMIT n`.
    pub fn uses_top(&self) -> bool {
        matches!(self, Dialect::TSql)
    }

    /// Parser dialect for statement validation.
    pub fn parser_dialect(&self) -> Box<dyn ParserDialect> {
        match self {
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::DuckDb => Box::new(DuckDbDialect {}),
            Dialect::MySql => Box::new(MySqlDialect {}),
            Dialect::TSql => Box::new(MsSqlDialect {}),
            Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
