//! Column metadata module.
//!
//! Discovery consumes column profiles computed by earlier pipeline stages:
//! structural flags (primary key, unique, declared type), profiling numbers
//! (distinct count, null rate, samples) and classifier tags (role, purpose,
//! joinable, prior target inference).
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │  feature classification  │ ───▶ │  ColumnMetadataReader    │
//! │  (earlier stage)         │      │  load_schema()           │
//! └──────────────────────────┘      └──────────────────────────┘
//!                                                │
//!                                                ▼
//!                                     SchemaSnapshot (read-only)
//! ```

mod provider;
mod types;

pub use provider::{ColumnMetadataReader, MetadataError, MetadataResult};
pub use types::*;
