//! Candidate collection.
//!
//! Turns column profiles into a type-safe, statistically enriched candidate
//! list. Every filtering decision here is structural (source tags, target
//! uniqueness, self-reference, type compatibility); how well two columns
//! actually line up is left entirely to the validator.
//!
//! # Pipeline
//!
//! ```text
//! profiles ─► identify_sources ─┐
//!                               ├─► generate_pairs ─► samples ─► join statistics
//! profiles ─► identify_targets ─┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::compat::{TypeCompatibility, TypeFamily};
use super::error::DiscoveryError;
use super::progress::{report, ProgressFn};
use super::types::{JoinStatistics, RelationshipCandidate};
use crate::config::DiscoverySettings;
use crate::datasource::{DatasourceConnector, QueryExecutor};
use crate::metadata::{
    ColumnMetadataReader, ColumnProfile, ColumnPurpose, ColumnRole, SchemaSnapshot,
    MAX_SAMPLE_VALUES,
};
use crate::sql::stats::columns;
use crate::sql::{sample_query, JoinStatsQueries};

/// Statistics progress is reported every this many candidates.
pub const STATS_PROGRESS_INTERVAL: usize = 10;

/// Lowercased (table, column) identity.
pub type ColumnKey = (String, String);

pub fn column_key(table: &str, column: &str) -> ColumnKey {
    (table.to_lowercase(), column.to_lowercase())
}

/// Columns eligible as foreign-key sources.
///
/// Eligible when tagged `role = foreign_key`, `purpose = identifier`, or
/// flagged joinable. Primary keys and timestamp, boolean or JSON columns
/// are never sources. Column names are not consulted.
pub fn identify_sources(columns: &[ColumnProfile]) -> Vec<&ColumnProfile> {
    columns
        .iter()
        .filter(|c| {
            c.role == Some(ColumnRole::ForeignKey)
                || c.purpose == Some(ColumnPurpose::Identifier)
                || c.is_joinable
        })
        .filter(|c| !c.is_primary_key)
        .filter(|c| !TypeFamily::parse(&c.data_type).is_excluded_source())
        .collect()
}

/// Columns eligible as foreign-key targets: declared primary keys and
/// unique columns, nothing else.
pub fn identify_targets(columns: &[ColumnProfile]) -> Vec<&ColumnProfile> {
    columns.iter().filter(|c| c.is_unique_key()).collect()
}

/// Cross product of sources and targets without self-pairs or
/// type-incompatible pairs.
pub fn generate_pairs(
    sources: &[&ColumnProfile],
    targets: &[&ColumnProfile],
) -> Vec<RelationshipCandidate> {
    let mut candidates = Vec::new();
    for source in sources {
        for target in targets {
            if source.is_same_column(&target.table, &target.column) {
                continue;
            }
            let compat = TypeCompatibility::check(&source.data_type, &target.data_type);
            if !compat.is_compatible {
                tracing::trace!(
                    source = %source.qualified_name(),
                    target = %target.qualified_name(),
                    reason = %compat.explanation,
                    "pair dropped"
                );
                continue;
            }
            candidates.push(RelationshipCandidate::new(
                (*source).clone(),
                (*target).clone(),
            ));
        }
    }
    candidates
}

/// Run the three join-statistics queries for one pair.
///
/// A failing query is logged and leaves its fields `None`; the others still
/// run.
pub async fn collect_join_statistics(
    executor: &dyn QueryExecutor,
    source: &ColumnProfile,
    target: &ColumnProfile,
) -> JoinStatistics {
    let queries = JoinStatsQueries::build(
        executor.dialect(),
        &source.table,
        &source.column,
        &target.table,
        &target.column,
    );
    let mut stats = JoinStatistics::default();

    match executor.query(&queries.matches).await {
        Ok(rows) => {
            stats.matched_rows = rows.first_i64(columns::MATCHED_ROWS);
            stats.matched_source_distinct = rows.first_i64(columns::MATCHED_SOURCE_DISTINCT);
            stats.matched_target_distinct = rows.first_i64(columns::MATCHED_TARGET_DISTINCT);
        }
        Err(e) => warn_stats_failure(source, target, "match counts", &e),
    }

    match executor.query(&queries.orphans).await {
        Ok(rows) => stats.orphan_count = rows.first_i64(columns::ORPHAN_COUNT),
        Err(e) => warn_stats_failure(source, target, "orphan count", &e),
    }

    match executor.query(&queries.reverse_orphans).await {
        Ok(rows) => stats.reverse_orphan_count = rows.first_i64(columns::REVERSE_ORPHAN_COUNT),
        Err(e) => warn_stats_failure(source, target, "reverse orphan count", &e),
    }

    stats
}

fn warn_stats_failure(
    source: &ColumnProfile,
    target: &ColumnProfile,
    what: &str,
    error: &dyn std::fmt::Display,
) {
    tracing::warn!(
        source = %source.qualified_name(),
        target = %target.qualified_name(),
        error = %error,
        "failed to collect {}", what
    );
}

/// Builds enriched candidates for one datasource.
pub struct CandidateCollector {
    reader: Arc<dyn ColumnMetadataReader>,
    connector: Arc<dyn DatasourceConnector>,
    stats_concurrency: usize,
    sample_limit: usize,
}

impl CandidateCollector {
    pub fn new(
        reader: Arc<dyn ColumnMetadataReader>,
        connector: Arc<dyn DatasourceConnector>,
        settings: &DiscoverySettings,
    ) -> Self {
        Self {
            reader,
            connector,
            stats_concurrency: settings.stats_concurrency.max(1),
            sample_limit: settings.sample_limit.clamp(1, MAX_SAMPLE_VALUES),
        }
    }

    /// Load metadata, connect, and build the full candidate list.
    ///
    /// Fails only when metadata cannot be loaded, no connection can be
    /// established, or the run is cancelled.
    pub async fn collect(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelationshipCandidate>, DiscoveryError> {
        let schema = self.reader.load_schema(project_id, datasource_id).await?;
        let executor = self
            .connector
            .connect(project_id, datasource_id)
            .await
            .map_err(DiscoveryError::Connect)?;

        self.collect_with(&schema, executor.as_ref(), &HashSet::new(), progress, cancel)
            .await
    }

    /// Build candidates from an already loaded schema and connection.
    ///
    /// Columns in `excluded_sources` were settled by a higher-precedence
    /// signal and never become sources here.
    pub async fn collect_with(
        &self,
        schema: &SchemaSnapshot,
        executor: &dyn QueryExecutor,
        excluded_sources: &HashSet<ColumnKey>,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelationshipCandidate>, DiscoveryError> {
        let sources: Vec<&ColumnProfile> = identify_sources(&schema.columns)
            .into_iter()
            .filter(|c| !excluded_sources.contains(&column_key(&c.table, &c.column)))
            .collect();
        report(
            progress,
            0,
            0,
            &format!("Identified {} foreign key source columns", sources.len()),
        );

        let targets = identify_targets(&schema.columns);
        report(
            progress,
            0,
            0,
            &format!("Identified {} foreign key target columns", targets.len()),
        );

        let mut candidates = generate_pairs(&sources, &targets);
        let total = candidates.len();
        report(
            progress,
            0,
            total,
            &format!("Generated {} relationship candidates", total),
        );
        tracing::info!(
            sources = sources.len(),
            targets = targets.len(),
            candidates = total,
            "candidate pairs generated"
        );

        if candidates.is_empty() {
            return Ok(candidates);
        }

        self.attach_samples(executor, &mut candidates, cancel).await?;
        self.enrich(executor, candidates, progress, cancel).await
    }

    /// Fetch samples once per distinct column and attach them.
    async fn attach_samples(
        &self,
        executor: &dyn QueryExecutor,
        candidates: &mut [RelationshipCandidate],
        cancel: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        let mut samples: HashMap<ColumnKey, Vec<String>> = HashMap::new();

        for candidate in candidates.iter_mut() {
            for is_source in [true, false] {
                let profile = if is_source {
                    &candidate.source
                } else {
                    &candidate.target
                };
                let key = column_key(&profile.table, &profile.column);
                if !samples.contains_key(&key) {
                    if cancel.is_cancelled() {
                        return Err(DiscoveryError::Cancelled);
                    }
                    let fetched = self.fetch_samples(executor, profile).await;
                    samples.insert(key.clone(), fetched);
                }
                let values = samples.get(&key).cloned().unwrap_or_default();
                if is_source {
                    candidate.source_samples = values;
                } else {
                    candidate.target_samples = values;
                }
            }
        }
        Ok(())
    }

    async fn fetch_samples(&self, executor: &dyn QueryExecutor, profile: &ColumnProfile) -> Vec<String> {
        let sql = sample_query(
            executor.dialect(),
            &profile.table,
            &profile.column,
            self.sample_limit,
        );
        match executor.query(&sql).await {
            Ok(rows) => {
                let mut values = rows.first_column_strings();
                values.truncate(self.sample_limit);
                values
            }
            Err(e) => {
                tracing::warn!(
                    column = %profile.qualified_name(),
                    error = %e,
                    "failed to fetch sample values"
                );
                Vec::new()
            }
        }
    }

    /// Collect join statistics for every candidate.
    ///
    /// Runs up to `stats_concurrency` candidates at once. Results are placed
    /// back at their input index by this loop alone.
    async fn enrich(
        &self,
        executor: &dyn QueryExecutor,
        candidates: Vec<RelationshipCandidate>,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelationshipCandidate>, DiscoveryError> {
        let total = candidates.len();
        let mut slots: Vec<Option<RelationshipCandidate>> = vec![None; total];

        let mut pending = stream::iter(candidates.into_iter().enumerate())
            .map(|(index, mut candidate)| async move {
                candidate.stats =
                    collect_join_statistics(executor, &candidate.source, &candidate.target).await;
                (index, candidate)
            })
            .buffer_unordered(self.stats_concurrency);

        let mut done = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                next = pending.next() => next,
            };
            let Some((index, candidate)) = next else {
                break;
            };

            if !candidate.stats.is_complete() {
                tracing::debug!(
                    source = %candidate.source.qualified_name(),
                    target = %candidate.target.qualified_name(),
                    "candidate kept with partial statistics"
                );
            }
            slots[index] = Some(candidate);
            done += 1;

            if done % STATS_PROGRESS_INTERVAL == 0 || done == total {
                report(
                    progress,
                    done,
                    total,
                    &format!("Collected join statistics for {} of {} candidates", done, total),
                );
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
