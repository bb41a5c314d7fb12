//! Persistence of discovered relationships.
//!
//! Accepted relationships and rejected candidates are kept apart:
//! [`RelationshipStore::list_relationships`] is the primary read path and
//! never returns rejections, which exist only as an internal audit trail.
//! A key lives in at most one of the two: recording one side removes the
//! other, so a later run can withdraw an earlier acceptance.

mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::discovery::{Cardinality, Provenance, RelationshipKey, Resolution, ValidatedRelationship};

pub use sqlite::SqliteStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i32, supported: i32 },

    #[error("corrupt store record: {0}")]
    Corrupt(String),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An accepted relationship as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub project_id: Uuid,
    pub datasource_id: Uuid,
    pub key: RelationshipKey,
    pub cardinality: Cardinality,
    pub source_role: Option<String>,
    pub provenance: Provenance,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

impl RelationshipRecord {
    pub fn from_validated(
        project_id: Uuid,
        datasource_id: Uuid,
        relationship: &ValidatedRelationship,
    ) -> Self {
        let reasoning = match &relationship.resolution {
            Resolution::Trusted { .. } => None,
            Resolution::Verdict(v) => Some(v.reasoning.clone()).filter(|r| !r.is_empty()),
        };
        Self {
            project_id,
            datasource_id,
            key: relationship.key(),
            cardinality: relationship.resolution.cardinality(),
            source_role: relationship.resolution.source_role().map(str::to_string),
            provenance: relationship.provenance,
            confidence: relationship.resolution.confidence(),
            reasoning,
        }
    }
}

/// A candidate that was considered and turned down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub project_id: Uuid,
    pub datasource_id: Uuid,
    pub key: RelationshipKey,
    /// Tier that rejected the candidate.
    pub provenance: Provenance,
    pub reason: String,
    pub confidence: Option<f64>,
}

/// Persists accepted relationships and the rejection audit trail.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Insert or replace a relationship, keyed by project, datasource and
    /// the four-part relationship key.
    async fn upsert_relationship(&self, record: &RelationshipRecord) -> StoreResult<()>;

    /// Record a rejected candidate for internal audit.
    async fn record_rejection(&self, record: &RejectionRecord) -> StoreResult<()>;

    /// Accepted relationships for a datasource.
    async fn list_relationships(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<RelationshipRecord>>;

    /// Rejection audit trail for a datasource.
    async fn list_rejections(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<RejectionRecord>>;
}
