//! Concurrent semantic validation.
//!
//! Each candidate gets its own oracle request. A fixed pool of worker tasks
//! pulls jobs from a bounded queue and sends results over a channel; the
//! batch call is the only owner of the output slots and writes each result
//! at its input index.
//!
//! ```text
//!              jobs (bounded)              results
//! dispatcher ───────────────► worker 1 ─┐
//!                         └─► worker 2 ─┼──────────► owner loop ─► slots[index]
//!                         └─► worker N ─┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::error::ValidatorError;
use super::progress::{report, ProgressFn};
use super::types::{RelationshipCandidate, ValidationVerdict};
use crate::oracle::{parse_verdict, OracleError, OracleRequest, SemanticOracle};

/// Progress is reported at least this often during validation.
pub const VALIDATION_PROGRESS_INTERVAL: usize = 5;

/// Result slot for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The oracle answered and the answer parsed.
    Resolved(ValidationVerdict),
    /// The oracle call failed or its answer was unusable.
    Failed(String),
    /// Never completed, because the batch was cancelled.
    Skipped,
}

impl ValidationOutcome {
    pub fn verdict(&self) -> Option<&ValidationVerdict> {
        match self {
            ValidationOutcome::Resolved(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ValidationOutcome::Resolved(_))
    }
}

type Job = (usize, OracleRequest);
type JobResult = (usize, Result<ValidationVerdict, OracleError>);

/// Dispatches candidates to the oracle through a bounded worker pool.
pub struct Validator {
    oracle: Arc<dyn SemanticOracle>,
    concurrency: usize,
}

impl Validator {
    pub fn new(oracle: Arc<dyn SemanticOracle>, concurrency: usize) -> Self {
        Self {
            oracle,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Validate every candidate; output index `i` belongs to input `i`.
    ///
    /// Errors only when all candidates failed or `cancel` fired. In the
    /// latter case results that completed before the signal are returned
    /// inside the error and later ones are discarded.
    pub async fn validate_batch(
        &self,
        candidates: &[RelationshipCandidate],
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidationOutcome>, ValidatorError> {
        let total = candidates.len();
        let mut outcomes = vec![ValidationOutcome::Skipped; total];
        if total == 0 {
            return Ok(outcomes);
        }

        let workers = self.concurrency.min(total);
        let (job_tx, job_rx) = mpsc::channel::<Job>(workers);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));

        for worker_id in 0..workers {
            tokio::spawn(run_worker(
                worker_id,
                self.oracle.clone(),
                job_rx.clone(),
                result_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(result_tx);

        let jobs: Vec<Job> = candidates
            .iter()
            .map(OracleRequest::from_candidate)
            .enumerate()
            .collect();
        tokio::spawn(dispatch(jobs, job_tx, cancel.clone()));

        let mut completed = 0;
        let mut failed = 0;
        let mut last_error = String::new();

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(completed, total, "validation cancelled");
                    return Err(ValidatorError::Cancelled { outcomes });
                }
                received = result_rx.recv() => received,
            };
            let Some((index, result)) = received else {
                break;
            };

            outcomes[index] = match result {
                Ok(verdict) => ValidationOutcome::Resolved(verdict),
                Err(e) => {
                    let candidate = &candidates[index];
                    tracing::warn!(
                        index,
                        source = %candidate.source.qualified_name(),
                        target = %candidate.target.qualified_name(),
                        error = %e,
                        "candidate validation failed"
                    );
                    failed += 1;
                    last_error = e.to_string();
                    ValidationOutcome::Failed(last_error.clone())
                }
            };
            completed += 1;

            if completed % VALIDATION_PROGRESS_INTERVAL == 0 || completed == total {
                report(
                    progress,
                    completed,
                    total,
                    &format!("Validated {} of {} candidates", completed, total),
                );
            }
        }

        // The channel only closes early if a worker died mid-batch.
        if completed < total {
            tracing::warn!(completed, total, "validation workers exited early");
        }

        let resolved = outcomes.iter().filter(|o| o.is_resolved()).count();
        if resolved == 0 {
            return Err(ValidatorError::AllFailed {
                count: total,
                last_error: if last_error.is_empty() {
                    "no result received".to_string()
                } else {
                    last_error
                },
            });
        }

        tracing::info!(resolved, failed, total, "validation batch complete");
        Ok(outcomes)
    }
}

async fn dispatch(jobs: Vec<Job>, job_tx: mpsc::Sender<Job>, cancel: CancellationToken) {
    for job in jobs {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = job_tx.send(job) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    oracle: Arc<dyn SemanticOracle>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    cancel: CancellationToken,
) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some((index, request)) = job else {
            break;
        };
        if cancel.is_cancelled() {
            break;
        }

        tracing::debug!(worker_id, index, pair = %request.pair_label(), "judging candidate");
        let result = match oracle.judge(&request).await {
            Ok(raw) => parse_verdict(&raw),
            Err(e) => Err(e),
        };

        if results.send((index, result)).await.is_err() {
            break;
        }
    }
}
