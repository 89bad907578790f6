//! Store-backed driver: read snapshot, reconcile, write with optimistic concurrency.
//!
//! A version conflict restarts from a fresh snapshot. Patches are never merged.

use crate::analyzer::Analyzer;
use crate::gate::{Gate, Reconciliation, SkipReason};
use crate::resolver::ContextResolver;
use approver_core::{ApprovalPatch, ApprovalTask, ReviewDecision};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("conflict writing {key}: expected resourceVersion {expected:?}, found {actual:?}")]
    Conflict {
        key: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("gave up on {key} after {attempts} conflicting writes")]
    RetriesExhausted { key: String, attempts: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Where ApprovalTasks live. `apply_patch` must fail with
/// [`StoreError::Conflict`] when the stored version differs from `expected_version`.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<ApprovalTask, StoreError>;

    async fn apply_patch(
        &self,
        namespace: &str,
        name: &str,
        expected_version: Option<&str>,
        patch: &ApprovalPatch,
    ) -> Result<ApprovalTask, StoreError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum DriveOutcome {
    Skipped(SkipReason),
    Applied {
        decision: ReviewDecision,
        patch: ApprovalPatch,
        attempts: usize,
    },
}

/// Reconcile one task end to end against a store.
pub async fn reconcile_with_store(
    gate: &Gate,
    store: &dyn TaskStore,
    namespace: &str,
    name: &str,
    resolver: &dyn ContextResolver,
    analyzer: &dyn Analyzer,
) -> Result<DriveOutcome, StoreError> {
    let max_retries = gate.config().approver.max_conflict_retries;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let task = store.get(namespace, name).await?;

        let (decision, patch) = match gate.reconcile(&task, resolver, analyzer).await {
            Reconciliation::Skip(reason) => return Ok(DriveOutcome::Skipped(reason)),
            Reconciliation::Patch { decision, patch } => (decision, patch),
        };

        match store
            .apply_patch(namespace, name, task.resource_version(), &patch)
            .await
        {
            Ok(_) => {
                info!(
                    "Patched ApprovalTask '{}' ({}) after {} attempt(s)",
                    task.key(),
                    decision.verdict,
                    attempts
                );
                return Ok(DriveOutcome::Applied {
                    decision,
                    patch,
                    attempts,
                });
            }
            Err(e @ StoreError::Conflict { .. }) => {
                if attempts > max_retries {
                    return Err(StoreError::RetriesExhausted {
                        key: task.key(),
                        attempts,
                    });
                }
                warn!("{}; reconciling again from a fresh snapshot", e);
            }
            Err(e) => return Err(e),
        }
    }
}
