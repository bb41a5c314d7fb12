//! QueryExecutor implementation backed by the database worker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{DatasourceConnector, DatasourceError, DatasourceResult, QueryExecutor, QueryRows};
use crate::config::{DatasourceSettings, Settings};
use crate::sql::{ensure_read_only, Dialect};
use crate::worker::{DatasourceTarget, WorkerClient};

/// Statement used to prove a connection is usable.
const CONNECTIVITY_SQL: &str = "SELECT 1";

/// Executes guarded read-only statements through a [`WorkerClient`].
pub struct WorkerQueryExecutor {
    client: Arc<WorkerClient>,
    target: DatasourceTarget,
    dialect: Dialect,
}

impl WorkerQueryExecutor {
    pub fn new(client: Arc<WorkerClient>, target: DatasourceTarget, dialect: Dialect) -> Self {
        Self {
            client,
            target,
            dialect,
        }
    }
}

#[async_trait]
impl QueryExecutor for WorkerQueryExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn query(&self, sql: &str) -> DatasourceResult<QueryRows> {
        ensure_read_only(sql, self.dialect)?;

        let result = self.client.run_query(&self.target, sql).await?;
        Ok(QueryRows::new(result.columns, result.rows))
    }
}

/// Resolves datasource ids to worker-backed executors.
///
/// All executors share one worker process; the worker owns the driver
/// connection pools.
pub struct WorkerConnector {
    client: Arc<WorkerClient>,
    datasources: HashMap<Uuid, DatasourceSettings>,
}

impl WorkerConnector {
    pub fn new(client: Arc<WorkerClient>, datasources: HashMap<Uuid, DatasourceSettings>) -> Self {
        Self {
            client,
            datasources,
        }
    }

    /// Build a connector from the datasources section of the settings.
    pub fn from_settings(client: Arc<WorkerClient>, settings: &Settings) -> Self {
        Self::new(client, settings.datasources.clone())
    }
}

#[async_trait]
impl DatasourceConnector for WorkerConnector {
    async fn connect(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
    ) -> DatasourceResult<Arc<dyn QueryExecutor>> {
        let ds = self
            .datasources
            .get(&datasource_id)
            .ok_or(DatasourceError::UnknownDatasource(datasource_id))?;

        let connect_error = |message: String| DatasourceError::Connect {
            datasource_id,
            message,
        };

        let dialect = ds.dialect().map_err(|e| connect_error(e.to_string()))?;
        let connection_string = ds
            .resolved_connection_string()
            .map_err(|e| connect_error(e.to_string()))?;

        let executor = WorkerQueryExecutor::new(
            self.client.clone(),
            DatasourceTarget {
                driver: ds.driver.clone(),
                connection_string,
            },
            dialect,
        );

        if let Err(e) = executor.query(CONNECTIVITY_SQL).await {
            let unreachable = matches!(&e, DatasourceError::Worker(w) if w.is_unreachable());
            tracing::warn!(%datasource_id, unreachable, error = %e, "datasource connectivity check failed");
            return Err(connect_error(e.to_string()));
        }

        tracing::debug!(%project_id, %datasource_id, driver = %ds.driver, "datasource connection established");
        Ok(Arc::new(executor))
    }
}
