//! Identifier quoting helpers shared by the dialects.

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, Snowflake
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Quote each dot-separated part of a possibly schema-qualified name.
///
/// `sales.orders` becomes `"sales"."orders"` with double quotes.
pub fn quote_qualified(name: &str, quote: fn(&str) -> String) -> String {
    name.split('.')
        .map(quote)
        .collect::<Vec<_>>()
        .join(".")
}
