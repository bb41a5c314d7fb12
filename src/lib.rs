//! # Keystone
//!
//! Foreign-key relationship discovery for unfamiliar relational schemas.
//!
//! ## Architecture
//!
//! Keystone is a library invoked by a pipeline scheduler. It reads column
//! profiles left by earlier stages, measures candidate joins against the
//! customer database, asks a semantic oracle for a verdict, and persists the
//! confident results:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Column metadata (profiles, declared FKs)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [tier 1 + tier 2]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Declared constraints, prior inference + statistics   │
//! └─────────────────────────────────────────────────────────┘
//!                          │ unresolved columns
//!                          ▼ [collector]
//! ┌─────────────────────────────────────────────────────────┐
//! │  Candidates + join statistics (read-only worker queries) │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validator]
//! ┌─────────────────────────────────────────────────────────┐
//! │          Oracle verdicts (bounded worker pool)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [store]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Relationships + rejection audit trail             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod datasource;
pub mod discovery;
pub mod metadata;
pub mod oracle;
pub mod sql;
pub mod store;
pub mod worker;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{DiscoverySettings, Settings};
    pub use crate::datasource::{DatasourceConnector, QueryExecutor, QueryRows};
    pub use crate::discovery::{
        Cardinality, DiscoveryError, DiscoveryOrchestrator, DiscoveryResult, ProgressFn,
        Provenance, RelationshipCandidate, ValidationVerdict,
    };
    pub use crate::metadata::{ColumnMetadataReader, ColumnProfile, SchemaSnapshot};
    pub use crate::oracle::{OracleRequest, SemanticOracle};
    pub use crate::sql::Dialect;
    pub use crate::store::{RelationshipStore, SqliteStore};
}
