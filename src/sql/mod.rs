//! SQL generation for join analysis.
//!
//! - [`dialect`] - identifier quoting and row limits per database
//! - [`stats`] - join-statistics and sample queries
//! - [`guard`] - read-only statement allowlist

pub mod dialect;
pub mod guard;
pub mod stats;

pub use dialect::Dialect;
pub use guard::{ensure_read_only, ReadOnlyViolation};
pub use stats::{sample_query, JoinStatsQueries};
