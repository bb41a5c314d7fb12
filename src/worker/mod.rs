//! Database worker process.
//!
//! Keystone links no database drivers. Every statement against a customer
//! database is handed to a separate worker process that owns the drivers
//! and their pools, over newline-delimited JSON on stdin/stdout:
//!
//! ```text
//!  keystone                               keystone-worker
//!  ┌──────────────────────┐   request    ┌──────────────────────┐
//!  │ WorkerClient         │ ───────────▶ │ driver pools         │
//!  │  pending: id → slot  │ ◀─────────── │ (postgres, mssql...) │
//!  └──────────────────────┘    reply     └──────────────────────┘
//! ```

mod client;
mod error;
pub mod protocol;

pub use client::WorkerClient;
pub use error::{WorkerError, WorkerResult};
pub use protocol::DatasourceTarget;
