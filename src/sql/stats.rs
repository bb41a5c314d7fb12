//! Join-statistics and sample queries.
//!
//! Each candidate pair is measured with three aggregate queries plus one
//! sample fetch per side. All of them are plain `SELECT`s so they pass the
//! read-only guard.

use super::dialect::Dialect;

/// Output column names shared with the collector.
pub mod columns {
    pub const MATCHED_ROWS: &str = "matched_rows";
    pub const MATCHED_SOURCE_DISTINCT: &str = "matched_source_distinct";
    pub const MATCHED_TARGET_DISTINCT: &str = "matched_target_distinct";
    pub const ORPHAN_COUNT: &str = "orphan_count";
    pub const REVERSE_ORPHAN_COUNT: &str = "reverse_orphan_count";
}

/// The three statistics queries for one source → target pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStatsQueries {
    /// Matching rows plus distinct matched values on each side.
    pub matches: String,
    /// Distinct non-null source values with no target row.
    pub orphans: String,
    /// Distinct non-null target values no source row references.
    pub reverse_orphans: String,
}

impl JoinStatsQueries {
    pub fn build(
        dialect: Dialect,
        source_table: &str,
        source_column: &str,
        target_table: &str,
        target_column: &str,
    ) -> Self {
        let st = dialect.quote_table(source_table);
        let tt = dialect.quote_table(target_table);
        let sc = format!("s.{}", dialect.quote_identifier(source_column));
        let tc = format!("t.{}", dialect.quote_identifier(target_column));

        let matches = format!(
            "SELECT COUNT(*) AS {}, COUNT(DISTINCT {sc}) AS {}, COUNT(DISTINCT {tc}) AS {} \
             FROM {st} s JOIN {tt} t ON {sc} = {tc}",
            columns::MATCHED_ROWS,
            columns::MATCHED_SOURCE_DISTINCT,
            columns::MATCHED_TARGET_DISTINCT,
        );

        let orphans = format!(
            "SELECT COUNT(DISTINCT {sc}) AS {} FROM {st} s \
             WHERE {sc} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM {tt} t WHERE {tc} = {sc})",
            columns::ORPHAN_COUNT,
        );

        let reverse_orphans = format!(
            "SELECT COUNT(DISTINCT {tc}) AS {} FROM {tt} t \
             WHERE {tc} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM {st} s WHERE {sc} = {tc})",
            columns::REVERSE_ORPHAN_COUNT,
        );

        Self {
            matches,
            orphans,
            reverse_orphans,
        }
    }
}

/// Distinct non-null sample values from one column.
pub fn sample_query(dialect: Dialect, table: &str, column: &str, limit: usize) -> String {
    let t = dialect.quote_table(table);
    let c = dialect.quote_identifier(column);
    if dialect.uses_top() {
        format!("SELECT DISTINCT TOP {limit} {c} FROM {t} WHERE {c} IS NOT NULL")
    } else {
        format!("SELECT DISTINCT {c} FROM {t} WHERE {c} IS NOT NULL LIMIT {limit}")
    }
}
