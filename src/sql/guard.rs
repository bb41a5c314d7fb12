//! Read-only statement guard.
//!
//! Every statement sent to a customer database is parsed first and rejected
//! unless it is exactly one query. This is an allowlist: anything the parser
//! does not recognise as a plain query is refused, and so are queries that
//! write (`SELECT ... INTO`) or take row locks (`FOR UPDATE`).

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::parser::Parser;
use thiserror::Error;

use super::dialect::Dialect;

/// A statement was refused by the guard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadOnlyViolation {
    #[error("statement could not be parsed for {dialect}: {message}")]
    Unparsable { dialect: Dialect, message: String },

    #[error("expected exactly one statement, found {0}")]
    StatementCount(usize),

    #[error("only read-only queries are allowed")]
    NotAQuery,
}

/// Ensure `sql` is a single read-only query.
pub fn ensure_read_only(sql: &str, dialect: Dialect) -> Result<(), ReadOnlyViolation> {
    let parser_dialect = dialect.parser_dialect();
    let statements =
        Parser::parse_sql(&*parser_dialect, sql).map_err(|e| ReadOnlyViolation::Unparsable {
            dialect,
            message: e.to_string(),
        })?;

    if statements.len() != 1 {
        return Err(ReadOnlyViolation::StatementCount(statements.len()));
    }

    match &statements[0] {
        Statement::Query(query) if is_pure_query(query) => Ok(()),
        Statement::Query(_) => {
            tracing::warn!("rejected query with side effects");
            Err(ReadOnlyViolation::NotAQuery)
        }
        other => {
            tracing::warn!(statement_type = ?std::mem::discriminant(other), "rejected non-read-only statement");
            Err(ReadOnlyViolation::NotAQuery)
        }
    }
}

fn is_pure_query(query: &Query) -> bool {
    if !query.locks.is_empty() {
        return false;
    }
    let ctes_pure = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_pure_query(&cte.query)));
    ctes_pure && is_pure_body(&query.body)
}

fn is_pure_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_pure_query(query),
        SetExpr::SetOperation { left, right, .. } => is_pure_body(left) && is_pure_body(right),
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}
