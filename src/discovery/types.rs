//! Core types for relationship discovery.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metadata::ColumnProfile;

/// Cardinality of a relationship, read from source to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "1:1")]
    OneToOne,
    #[serde(rename = "N:1")]
    ManyToOne,
    #[serde(rename = "1:N")]
    OneToMany,
    #[serde(rename = "N:M")]
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::ManyToOne => "N:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToMany => "N:M",
        }
    }

    /// Cardinality implied by uniqueness on each side.
    pub fn from_uniqueness(source_unique: bool, target_unique: bool) -> Self {
        match (source_unique, target_unique) {
            (true, true) => Cardinality::OneToOne,
            (true, false) => Cardinality::OneToMany,
            (false, true) => Cardinality::ManyToOne,
            (false, false) => Cardinality::ManyToMany,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised cardinality label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cardinality '{0}'")]
pub struct ParseCardinalityError(pub String);

impl FromStr for Cardinality {
    type Err = ParseCardinalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "1:1" => Ok(Cardinality::OneToOne),
            "N:1" | "M:1" => Ok(Cardinality::ManyToOne),
            "1:N" | "1:M" => Ok(Cardinality::OneToMany),
            "N:M" | "M:N" | "N:N" | "M:M" => Ok(Cardinality::ManyToMany),
            _ => Err(ParseCardinalityError(s.to_string())),
        }
    }
}

/// Identity of a relationship: (source table, source column, target table,
/// target column), compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

impl RelationshipKey {
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            source_column: source_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
        }
    }

    /// Lowercased parts, used wherever the key is stored or hashed.
    pub fn normalized(&self) -> (String, String, String, String) {
        (
            self.source_table.to_lowercase(),
            self.source_column.to_lowercase(),
            self.target_table.to_lowercase(),
            self.target_column.to_lowercase(),
        )
    }
}

impl PartialEq for RelationshipKey {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for RelationshipKey {}

impl std::hash::Hash for RelationshipKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source_table, self.source_column, self.target_table, self.target_column
        )
    }
}

/// Join analysis between a source and a target column.
///
/// Every field is `None` until its query has succeeded, so partial
/// collection failures stay visible to the oracle and to tier-2 checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinStatistics {
    /// Source rows that found a matching target row.
    pub matched_rows: Option<i64>,
    /// Distinct source values that matched.
    pub matched_source_distinct: Option<i64>,
    /// Distinct target values that were matched.
    pub matched_target_distinct: Option<i64>,
    /// Distinct non-null source values with no target row.
    pub orphan_count: Option<i64>,
    /// Distinct target values never referenced.
    pub reverse_orphan_count: Option<i64>,
}

impl JoinStatistics {
    pub fn is_complete(&self) -> bool {
        self.matched_rows.is_some()
            && self.matched_source_distinct.is_some()
            && self.matched_target_distinct.is_some()
            && self.orphan_count.is_some()
            && self.reverse_orphan_count.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fraction of distinct source values with no target row.
    pub fn orphan_ratio(&self) -> Option<f64> {
        let orphans = self.orphan_count?;
        let matched = self.matched_source_distinct?;
        let total = orphans + matched;
        if total == 0 {
            return None;
        }
        Some(orphans as f64 / total as f64)
    }

    /// Cardinality observed in the data, assuming a unique target.
    pub fn observed_cardinality(&self) -> Option<Cardinality> {
        let rows = self.matched_rows?;
        let distinct = self.matched_source_distinct?;
        if rows == distinct {
            Some(Cardinality::OneToOne)
        } else {
            Some(Cardinality::ManyToOne)
        }
    }
}

/// A proposed directed edge from a source column to a target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub source: ColumnProfile,
    pub target: ColumnProfile,
    #[serde(default)]
    pub stats: JoinStatistics,
    /// Live samples from the source column.
    #[serde(default)]
    pub source_samples: Vec<String>,
    /// Live samples from the target column.
    #[serde(default)]
    pub target_samples: Vec<String>,
}

impl RelationshipCandidate {
    pub fn new(source: ColumnProfile, target: ColumnProfile) -> Self {
        Self {
            source,
            target,
            stats: JoinStatistics::default(),
            source_samples: Vec::new(),
            target_samples: Vec::new(),
        }
    }

    pub fn key(&self) -> RelationshipKey {
        RelationshipKey::new(
            &self.source.table,
            &self.source.column,
            &self.target.table,
            &self.target.column,
        )
    }

    /// Samples to describe the source with: live ones, else profiled ones.
    pub fn effective_source_samples(&self) -> &[String] {
        if self.source_samples.is_empty() {
            &self.source.sample_values
        } else {
            &self.source_samples
        }
    }

    /// Samples to describe the target with: live ones, else profiled ones.
    pub fn effective_target_samples(&self) -> &[String] {
        if self.target_samples.is_empty() {
            &self.target.sample_values
        } else {
            &self.target_samples
        }
    }
}

/// The oracle's judgment for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    /// Between 0.0 and 1.0.
    pub confidence: f64,
    pub cardinality: Cardinality,
    pub reasoning: String,
    /// Semantic role of the source column, e.g. "owner".
    #[serde(default)]
    pub source_role: Option<String>,
}

/// Evidence tier that justified a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    DbConstraint,
    ColumnFeatures,
    OracleInference,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::DbConstraint => "db_constraint",
            Provenance::ColumnFeatures => "column_features",
            Provenance::OracleInference => "oracle_inference",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "db_constraint" => Ok(Provenance::DbConstraint),
            "column_features" => Ok(Provenance::ColumnFeatures),
            "oracle_inference" => Ok(Provenance::OracleInference),
            other => Err(format!("unknown provenance '{}'", other)),
        }
    }
}

/// How a relationship was settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Resolved by a higher-precedence signal; the oracle was not consulted.
    Trusted { cardinality: Cardinality },
    /// Judged by the oracle.
    Verdict(ValidationVerdict),
}

impl Resolution {
    pub fn cardinality(&self) -> Cardinality {
        match self {
            Resolution::Trusted { cardinality } => *cardinality,
            Resolution::Verdict(v) => v.cardinality,
        }
    }

    pub fn source_role(&self) -> Option<&str> {
        match self {
            Resolution::Trusted { .. } => None,
            Resolution::Verdict(v) => v.source_role.as_deref(),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Resolution::Trusted { .. } => 1.0,
            Resolution::Verdict(v) => v.confidence,
        }
    }
}

/// A candidate paired with its resolution. The unit persisted downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRelationship {
    pub candidate: RelationshipCandidate,
    pub resolution: Resolution,
    pub provenance: Provenance,
}

impl ValidatedRelationship {
    pub fn trusted(
        candidate: RelationshipCandidate,
        cardinality: Cardinality,
        provenance: Provenance,
    ) -> Self {
        Self {
            candidate,
            resolution: Resolution::Trusted { cardinality },
            provenance,
        }
    }

    pub fn validated(candidate: RelationshipCandidate, verdict: ValidationVerdict) -> Self {
        Self {
            candidate,
            resolution: Resolution::Verdict(verdict),
            provenance: Provenance::OracleInference,
        }
    }

    pub fn key(&self) -> RelationshipKey {
        self.candidate.key()
    }
}

/// Aggregate outcome of one discovery run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResult {
    /// Candidates considered across all tiers.
    pub candidates_evaluated: usize,
    pub relationships_created: usize,
    pub relationships_rejected: usize,
    /// Open-inference candidates whose validation failed or never ran.
    pub candidates_unresolved: usize,
    pub duration: Duration,
}
