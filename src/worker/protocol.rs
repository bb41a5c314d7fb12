//! Wire types exchanged with the database worker.
//!
//! One JSON object per line in each direction. Requests carry a numeric
//! `id` that the worker echoes back on the matching reply, so replies may
//! arrive in any order.

use serde::{Deserialize, Serialize};

/// Method for running one SQL statement.
pub const RUN_QUERY: &str = "sql.query";

/// Failure codes the worker reports.
pub mod codes {
    pub const WORKER_GONE: &str = "WORKER_GONE";
    pub const DRIVER_MISSING: &str = "DRIVER_MISSING";
    pub const CONNECT_FAILED: &str = "CONNECT_FAILED";
    pub const QUERY_FAILED: &str = "QUERY_FAILED";
}

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: u64,
    #[serde(flatten)]
    pub body: ReplyBody,
}

/// Either the method's data or a coded failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyBody {
    Ok {
        #[serde(default)]
        data: serde_json::Value,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ReplyBody {
    pub(crate) fn failure(code: &str, message: impl Into<String>) -> Self {
        ReplyBody::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Which database a statement runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceTarget {
    /// Worker driver name (`postgres`, `mssql`, ...).
    pub driver: String,
    pub connection_string: String,
}

#[derive(Debug, Serialize)]
pub struct QueryParams<'a> {
    #[serde(flatten)]
    pub target: &'a DatasourceTarget,
    pub sql: &'a str,
}

/// Rows returned by [`RUN_QUERY`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}
