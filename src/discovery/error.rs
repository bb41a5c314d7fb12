//! Error types for relationship discovery.

use thiserror::Error;

use super::validator::ValidationOutcome;
use crate::datasource::DatasourceError;
use crate::metadata::MetadataError;
use crate::store::StoreError;

/// Errors that abort a discovery run.
///
/// Per-candidate problems never show up here; they are logged and end up as
/// partial statistics or unresolved candidates.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Column metadata could not be loaded at all.
    #[error("cannot load column metadata: {0}")]
    Metadata(#[from] MetadataError),

    /// No query-capable connection to the datasource.
    #[error("cannot connect to datasource: {0}")]
    Connect(#[source] DatasourceError),

    /// The validation batch failed as a whole.
    #[error(transparent)]
    Validation(#[from] ValidatorError),

    /// Relationships could not be persisted.
    #[error("cannot persist relationships: {0}")]
    Store(#[from] StoreError),

    /// The caller's cancellation signal fired.
    #[error("discovery cancelled")]
    Cancelled,
}

/// Errors from a validation batch.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Every candidate in a non-empty batch failed.
    #[error("all {count} candidates failed validation, last error: {last_error}")]
    AllFailed { count: usize, last_error: String },

    /// Cancellation fired; carries whatever had completed, in input order.
    #[error("validation cancelled after {} of {} candidates", completed(.outcomes), .outcomes.len())]
    Cancelled { outcomes: Vec<ValidationOutcome> },
}

fn completed(outcomes: &[ValidationOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| !matches!(o, ValidationOutcome::Skipped))
        .count()
}
