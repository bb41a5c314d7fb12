//! Discovery orchestration across precedence tiers.
//!
//! Tiers are settled in order and each one removes its source columns from
//! the tiers below it:
//!
//! 1. Declared foreign-key constraints, accepted as-is.
//! 2. High-confidence prior inference, re-checked against join statistics.
//! 3. Open inference through the collector and validator.
//!
//! Only confident outcomes are persisted. Everything turned down is written
//! to the rejection audit trail and never surfaced as an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use super::collector::{collect_join_statistics, column_key, CandidateCollector, ColumnKey};
use super::compat::TypeCompatibility;
use super::error::{DiscoveryError, ValidatorError};
use super::progress::{report, ProgressFn};
use super::types::{
    Cardinality, DiscoveryResult, Provenance, RelationshipCandidate, RelationshipKey,
    ValidatedRelationship,
};
use super::validator::{ValidationOutcome, Validator};
use crate::config::DiscoverySettings;
use crate::datasource::{DatasourceConnector, QueryExecutor};
use crate::metadata::{ColumnMetadataReader, ColumnProfile, PriorInference, SchemaSnapshot};
use crate::oracle::SemanticOracle;
use crate::store::{RejectionRecord, RelationshipRecord, RelationshipStore};

/// Runs discovery for one datasource at a time.
///
/// All tuning comes from the [`DiscoverySettings`] passed in, so concurrent
/// runs with different settings do not interfere.
pub struct DiscoveryOrchestrator {
    reader: Arc<dyn ColumnMetadataReader>,
    connector: Arc<dyn DatasourceConnector>,
    store: Arc<dyn RelationshipStore>,
    collector: CandidateCollector,
    validator: Validator,
    settings: DiscoverySettings,
}

/// Per-run context shared by the tiers.
struct Run<'a> {
    project_id: Uuid,
    datasource_id: Uuid,
    executor: &'a dyn QueryExecutor,
    result: DiscoveryResult,
}

impl DiscoveryOrchestrator {
    pub fn new(
        reader: Arc<dyn ColumnMetadataReader>,
        connector: Arc<dyn DatasourceConnector>,
        oracle: Arc<dyn SemanticOracle>,
        store: Arc<dyn RelationshipStore>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            collector: CandidateCollector::new(reader.clone(), connector.clone(), &settings),
            validator: Validator::new(oracle, settings.concurrency),
            reader,
            connector,
            store,
            settings,
        }
    }

    /// Resolve and persist the relationship set for a datasource.
    #[instrument(skip_all, fields(%project_id, %datasource_id))]
    pub async fn discover_relationships(
        &self,
        cancel: &CancellationToken,
        project_id: Uuid,
        datasource_id: Uuid,
        on_progress: Option<ProgressFn>,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let started = Instant::now();
        let progress = on_progress.as_ref();

        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }

        report(progress, 0, 0, "Loading column metadata");
        let schema = self.reader.load_schema(project_id, datasource_id).await?;

        report(progress, 0, 0, "Connecting to datasource");
        let executor = self
            .connector
            .connect(project_id, datasource_id)
            .await
            .map_err(DiscoveryError::Connect)?;

        let mut run = Run {
            project_id,
            datasource_id,
            executor: executor.as_ref(),
            result: DiscoveryResult::default(),
        };
        let mut resolved: HashSet<ColumnKey> = HashSet::new();

        report(progress, 0, 0, "Applying declared foreign keys");
        self.apply_declared_constraints(&mut run, &schema, &mut resolved)
            .await?;

        report(progress, 0, 0, "Checking prior column inferences");
        self.apply_prior_inferences(&mut run, &schema, &mut resolved, cancel)
            .await?;

        self.apply_open_inference(&mut run, &schema, &resolved, progress, cancel)
            .await?;

        run.result.duration = started.elapsed();
        tracing::info!(
            evaluated = run.result.candidates_evaluated,
            created = run.result.relationships_created,
            rejected = run.result.relationships_rejected,
            unresolved = run.result.candidates_unresolved,
            elapsed = ?run.result.duration,
            "relationship discovery complete"
        );
        report(
            progress,
            run.result.relationships_created,
            run.result.candidates_evaluated,
            &format!(
                "Discovered {} relationships from {} candidates",
                run.result.relationships_created, run.result.candidates_evaluated
            ),
        );
        Ok(run.result)
    }

    /// Tier 1: every single-column declared constraint is accepted.
    async fn apply_declared_constraints(
        &self,
        run: &mut Run<'_>,
        schema: &SchemaSnapshot,
        resolved: &mut HashSet<ColumnKey>,
    ) -> Result<(), DiscoveryError> {
        for fk in &schema.foreign_keys {
            if fk.is_composite() {
                tracing::debug!(constraint = %fk.name, "skipping composite foreign key");
                continue;
            }
            let (Some(source_column), Some(target_column)) =
                (fk.source_columns.first(), fk.target_columns.first())
            else {
                tracing::debug!(constraint = %fk.name, "skipping foreign key without columns");
                continue;
            };

            let source = schema
                .find_column(&fk.source_table, source_column)
                .cloned()
                .unwrap_or_else(|| ColumnProfile::new(&fk.source_table, source_column, ""));
            let target = schema
                .find_column(&fk.target_table, target_column)
                .cloned()
                .unwrap_or_else(|| ColumnProfile::new(&fk.target_table, target_column, ""));

            let cardinality = if source.is_unique_key() {
                Cardinality::OneToOne
            } else {
                Cardinality::ManyToOne
            };
            resolved.insert(column_key(&source.table, &source.column));

            let relationship = ValidatedRelationship::trusted(
                RelationshipCandidate::new(source, target),
                cardinality,
                Provenance::DbConstraint,
            );
            run.result.candidates_evaluated += 1;
            self.persist(run, &relationship).await?;
        }
        Ok(())
    }

    /// Tier 2: prior inferences above the confidence bar, checked against
    /// join statistics only.
    async fn apply_prior_inferences(
        &self,
        run: &mut Run<'_>,
        schema: &SchemaSnapshot,
        resolved: &mut HashSet<ColumnKey>,
        cancel: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        for source in &schema.columns {
            let Some(prior) = &source.prior_inference else {
                continue;
            };
            if prior.confidence < self.settings.prior_inference_confidence {
                continue;
            }
            let key = column_key(&source.table, &source.column);
            if resolved.contains(&key) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
            // Settled here either way; never re-proposed to the oracle.
            resolved.insert(key);
            run.result.candidates_evaluated += 1;

            let relationship_key = RelationshipKey::new(
                &source.table,
                &source.column,
                &prior.target_table,
                &prior.target_column,
            );

            let target = match prior_target(schema, source, prior) {
                Ok(target) => target,
                Err(reason) => {
                    tracing::debug!(relationship = %relationship_key, %reason, "prior inference rejected");
                    self.reject(
                        run,
                        relationship_key,
                        Provenance::ColumnFeatures,
                        reason,
                        Some(prior.confidence),
                    )
                    .await?;
                    continue;
                }
            };

            let mut candidate = RelationshipCandidate::new(source.clone(), target.clone());
            candidate.stats = collect_join_statistics(run.executor, source, target).await;

            match self.check_prior_statistics(&candidate) {
                Ok(cardinality) => {
                    let relationship = ValidatedRelationship::trusted(
                        candidate,
                        cardinality,
                        Provenance::ColumnFeatures,
                    );
                    self.persist(run, &relationship).await?;
                }
                Err(reason) => {
                    tracing::debug!(relationship = %relationship_key, %reason, "prior inference rejected");
                    self.reject(
                        run,
                        relationship_key,
                        Provenance::ColumnFeatures,
                        reason,
                        Some(prior.confidence),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    /// Accept a prior inference only when the data backs it.
    fn check_prior_statistics(&self, candidate: &RelationshipCandidate) -> Result<Cardinality, String> {
        let stats = &candidate.stats;
        let (Some(matched_rows), Some(matched_target)) =
            (stats.matched_rows, stats.matched_target_distinct)
        else {
            return Err("join statistics unavailable".to_string());
        };
        if matched_rows <= 0 || matched_target <= 0 {
            return Err("no source rows match the inferred target".to_string());
        }
        let Some(orphan_ratio) = stats.orphan_ratio() else {
            return Err("orphan statistics unavailable".to_string());
        };
        if orphan_ratio > self.settings.prior_orphan_tolerance {
            return Err(format!(
                "orphan ratio {:.4} exceeds tolerance {:.4}",
                orphan_ratio, self.settings.prior_orphan_tolerance
            ));
        }
        stats
            .observed_cardinality()
            .ok_or_else(|| "join statistics unavailable".to_string())
    }

    /// Tier 3: collector and validator over everything still open.
    async fn apply_open_inference(
        &self,
        run: &mut Run<'_>,
        schema: &SchemaSnapshot,
        resolved: &HashSet<ColumnKey>,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        let candidates = self
            .collector
            .collect_with(schema, run.executor, resolved, progress, cancel)
            .await?;
        run.result.candidates_evaluated += candidates.len();
        if candidates.is_empty() {
            return Ok(());
        }

        let (outcomes, cancelled) = match self
            .validator
            .validate_batch(&candidates, progress, cancel)
            .await
        {
            Ok(outcomes) => (outcomes, false),
            Err(ValidatorError::Cancelled { outcomes }) => (outcomes, true),
            Err(e) => return Err(e.into()),
        };

        for (candidate, outcome) in candidates.into_iter().zip(outcomes) {
            let verdict = match outcome {
                ValidationOutcome::Resolved(verdict) => verdict,
                ValidationOutcome::Failed(_) | ValidationOutcome::Skipped => {
                    run.result.candidates_unresolved += 1;
                    continue;
                }
            };

            if verdict.accepted && verdict.confidence >= self.settings.acceptance_confidence {
                let relationship = ValidatedRelationship::validated(candidate, verdict);
                self.persist(run, &relationship).await?;
                continue;
            }

            let reason = if verdict.accepted {
                format!(
                    "confidence {:.2} below acceptance bar {:.2}: {}",
                    verdict.confidence, self.settings.acceptance_confidence, verdict.reasoning
                )
            } else {
                verdict.reasoning.clone()
            };
            self.reject(
                run,
                candidate.key(),
                Provenance::OracleInference,
                reason,
                Some(verdict.confidence),
            )
            .await?;
        }

        if cancelled {
            return Err(DiscoveryError::Cancelled);
        }
        Ok(())
    }

    async fn persist(
        &self,
        run: &mut Run<'_>,
        relationship: &ValidatedRelationship,
    ) -> Result<(), DiscoveryError> {
        let record = RelationshipRecord::from_validated(run.project_id, run.datasource_id, relationship);
        self.store.upsert_relationship(&record).await?;
        tracing::debug!(
            relationship = %record.key,
            provenance = %record.provenance,
            cardinality = %record.cardinality,
            "relationship persisted"
        );
        run.result.relationships_created += 1;
        Ok(())
    }

    async fn reject(
        &self,
        run: &mut Run<'_>,
        key: RelationshipKey,
        provenance: Provenance,
        reason: String,
        confidence: Option<f64>,
    ) -> Result<(), DiscoveryError> {
        let record = RejectionRecord {
            project_id: run.project_id,
            datasource_id: run.datasource_id,
            key,
            provenance,
            reason,
            confidence,
        };
        self.store.record_rejection(&record).await?;
        run.result.relationships_rejected += 1;
        Ok(())
    }
}

/// Structural checks on a prior inference, run before any query is sent.
fn prior_target<'a>(
    schema: &'a SchemaSnapshot,
    source: &ColumnProfile,
    prior: &PriorInference,
) -> Result<&'a ColumnProfile, String> {
    if source.is_same_column(&prior.target_table, &prior.target_column) {
        return Err("inferred target is the source column itself".to_string());
    }
    let target = schema
        .find_column(&prior.target_table, &prior.target_column)
        .ok_or_else(|| "inferred target column does not exist".to_string())?;
    if !target.is_unique_key() {
        return Err("inferred target is neither a primary key nor unique".to_string());
    }
    let compat = TypeCompatibility::check(&source.data_type, &target.data_type);
    if !compat.is_compatible {
        return Err(compat.explanation);
    }
    Ok(target)
}
