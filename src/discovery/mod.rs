//! Relationship discovery engine.
//!
//! Infers foreign-key relationships in a schema without numeric heuristics:
//!
//! - [`collector`] enumerates type-compatible source/target pairs and
//!   measures them against the live database
//! - [`validator`] asks the semantic oracle about each pair concurrently
//! - [`orchestrator`] merges declared constraints, prior inferences and
//!   oracle verdicts, and persists the confident ones

pub mod collector;
pub mod compat;
mod error;
pub mod orchestrator;
mod progress;
mod types;
pub mod validator;

pub use collector::{CandidateCollector, STATS_PROGRESS_INTERVAL};
pub use compat::{TypeCompatibility, TypeFamily};
pub use error::{DiscoveryError, ValidatorError};
pub use orchestrator::DiscoveryOrchestrator;
pub use progress::ProgressFn;
pub use types::*;
pub use validator::{ValidationOutcome, Validator};
