//! ColumnMetadataReader trait definition.
//!
//! The reader abstracts over wherever earlier pipeline stages left their
//! column profiles. Discovery only ever reads through this trait.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::types::SchemaSnapshot;

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while loading column metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// No metadata has been recorded for the datasource.
    #[error("no column metadata for project {project_id} datasource {datasource_id}")]
    NotFound {
        project_id: Uuid,
        datasource_id: Uuid,
    },

    /// The backing store could not be read.
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),

    /// Stored metadata could not be decoded.
    #[error("corrupt column metadata: {0}")]
    Corrupt(String),
}

/// Trait for reading column profiles and declared constraints.
///
/// # Example
///
/// ```ignore
/// use keystone::metadata::ColumnMetadataReader;
///
/// async fn example(reader: &impl ColumnMetadataReader) -> MetadataResult<()> {
///     let snapshot = reader.load_schema(project_id, datasource_id).await?;
///     println!("{} columns", snapshot.columns.len());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ColumnMetadataReader: Send + Sync {
    /// Load every column profile and declared foreign key for a datasource.
    ///
    /// An error here is fatal for a discovery run.
    async fn load_schema(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> MetadataResult<SchemaSnapshot>;
}
