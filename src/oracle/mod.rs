//! Semantic oracle interface.
//!
//! The oracle is an external judgment service that looks at one candidate
//! relationship and says whether it is a real foreign key. The engine talks to
//! it through [`SemanticOracle`], a single request/response method, so a mock,
//! an HTTP client or a cache can be swapped in without touching discovery.
//!
//! The oracle returns raw text; [`parse_verdict`] turns it into a
//! [`ValidationVerdict`](crate::discovery::ValidationVerdict).

mod http;
mod parse;
mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discovery::{JoinStatistics, RelationshipCandidate};
use crate::metadata::ColumnProfile;

pub use http::HttpOracle;
pub use parse::parse_verdict;
pub use prompt::{render_user_message, SYSTEM_PROMPT};

/// Errors from an oracle round-trip.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("unparsable oracle response: {0}")]
    Unparsable(String),

    #[error("oracle misconfigured: {0}")]
    Config(String),
}

/// Judges one candidate relationship.
///
/// Implementations must be safe to call concurrently; every call carries
/// all the state it needs.
#[async_trait]
pub trait SemanticOracle: Send + Sync {
    /// Return the oracle's raw answer for one candidate.
    async fn judge(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// One column as presented to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub role: Option<String>,
    pub purpose: Option<String>,
    pub distinct_count: Option<i64>,
    pub null_rate: Option<f64>,
    pub sample_values: Vec<String>,
}

impl ColumnDescription {
    fn describe(profile: &ColumnProfile, samples: &[String]) -> Self {
        Self {
            table: profile.table.clone(),
            column: profile.column.clone(),
            data_type: profile.data_type.clone(),
            is_primary_key: profile.is_primary_key,
            is_unique: profile.is_unique,
            role: profile.role.map(|r| r.as_str().to_string()),
            purpose: profile.purpose.map(|p| p.as_str().to_string()),
            distinct_count: profile.distinct_count,
            null_rate: profile.null_rate,
            sample_values: samples.to_vec(),
        }
    }
}

/// Everything the oracle is told about one candidate.
///
/// Built purely from data already on the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub question: String,
    pub source: ColumnDescription,
    pub target: ColumnDescription,
    pub join_statistics: JoinStatistics,
}

impl OracleRequest {
    pub fn from_candidate(candidate: &RelationshipCandidate) -> Self {
        let source =
            ColumnDescription::describe(&candidate.source, candidate.effective_source_samples());
        let target =
            ColumnDescription::describe(&candidate.target, candidate.effective_target_samples());
        Self {
            question: question_for(&source, &target),
            source,
            target,
            join_statistics: candidate.stats.clone(),
        }
    }

    /// `source.column -> target.column`, for logs.
    pub fn pair_label(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.source.table, self.source.column, self.target.table, self.target.column
        )
    }
}

fn question_for(source: &ColumnDescription, target: &ColumnDescription) -> String {
    format!(
        "Is {}.{} a foreign key referencing {}.{}, and if so what is its cardinality and semantic role?",
        source.table, source.column, target.table, target.column
    )
}
