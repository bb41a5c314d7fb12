//! Read-only query access to the customer database.
//!
//! Discovery acquires one [`QueryExecutor`] per run through a
//! [`DatasourceConnector`] and reuses it for every statistics query. The
//! executor runs one read-only statement and returns its rows.

mod rows;
mod worker_executor;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::sql::{Dialect, ReadOnlyViolation};
use crate::worker::WorkerError;

pub use rows::QueryRows;
pub use worker_executor::{WorkerConnector, WorkerQueryExecutor};

/// Result type for datasource operations.
pub type DatasourceResult<T> = Result<T, DatasourceError>;

/// Errors raised while talking to the customer database.
#[derive(Error, Debug)]
pub enum DatasourceError {
    /// The datasource is not known to the connector.
    #[error("unknown datasource {0}")]
    UnknownDatasource(Uuid),

    /// No query-capable connection could be established.
    #[error("cannot connect to datasource {datasource_id}: {message}")]
    Connect {
        datasource_id: Uuid,
        message: String,
    },

    /// The statement was refused before being sent.
    #[error(transparent)]
    ReadOnly(#[from] ReadOnlyViolation),

    /// The worker failed to run the statement.
    #[error("query failed: {0}")]
    Worker(#[from] WorkerError),

    /// The statement ran but returned something unusable.
    #[error("unexpected query result: {0}")]
    UnexpectedResult(String),
}

/// Runs read-only statements against one datasource.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// SQL dialect statements must be written in.
    fn dialect(&self) -> Dialect;

    /// Run one read-only statement and return its rows.
    async fn query(&self, sql: &str) -> DatasourceResult<QueryRows>;
}

/// Opens query executors for datasources.
#[async_trait]
pub trait DatasourceConnector: Send + Sync {
    /// Establish a query-capable connection.
    ///
    /// An error here is fatal for a discovery run.
    async fn connect(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> DatasourceResult<Arc<dyn QueryExecutor>>;
}
