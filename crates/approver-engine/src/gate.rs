//! Reconciliation gate - decides whether a review is owed and produces the patch
//!
//! Holds no mutable state: the snapshot comes in, a patch (or a skip) goes
//! out. Safe to run concurrently for different tasks.

use crate::analyzer::{Analyzer, AnalyzerError};
use crate::decision;
use crate::prompt::{self, PromptError, PromptFacts};
use crate::resolver::ContextResolver;
use approver_core::{
    AnalysisRequest, ApprovalPatch, ApprovalTask, ApproverConfig, ApproverInput, ReviewDecision,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a task needs no review.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The reviewed-marker annotation is already present.
    AlreadyReviewed { at: String },
    /// The automated approver is not in `spec.approvers`.
    ApproverAbsent,
    /// The automated approver already has a terminal input.
    AlreadyDecided { input: ApproverInput },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyReviewed { at } => write!(f, "already reviewed at {}", at),
            Self::ApproverAbsent => f.write_str("automated approver not in approvers list"),
            Self::AlreadyDecided { input } => write!(f, "approver already provided input '{}'", input),
        }
    }
}

/// Result of one reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub enum Reconciliation {
    Skip(SkipReason),
    Patch {
        decision: ReviewDecision,
        patch: ApprovalPatch,
    },
}

impl Reconciliation {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    pub fn patch(&self) -> Option<&ApprovalPatch> {
        match self {
            Self::Patch { patch, .. } => Some(patch),
            Self::Skip(_) => None,
        }
    }

    pub fn decision(&self) -> Option<&ReviewDecision> {
        match self {
            Self::Patch { decision, .. } => Some(decision),
            Self::Skip(_) => None,
        }
    }
}

pub struct Gate {
    config: Arc<ApproverConfig>,
}

impl Gate {
    pub fn new(config: Arc<ApproverConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ApproverConfig {
        &self.config
    }

    /// Steps 1-3: marker, eligibility, freshness. Returns the approver index
    /// when a review is owed.
    pub fn check(&self, task: &ApprovalTask) -> Result<usize, SkipReason> {
        let identity = &self.config.approver;

        if let Some(at) = task.annotation(&identity.reviewed_annotation) {
            return Err(SkipReason::AlreadyReviewed { at: at.to_string() });
        }

        let index = task
            .approver_index(&identity.name)
            .ok_or(SkipReason::ApproverAbsent)?;

        match task.spec.approvers[index].input() {
            Some(input) if !input.is_pending() => Err(SkipReason::AlreadyDecided { input }),
            _ => Ok(index),
        }
    }

    /// Gather prompt facts. A pipeline spec that cannot be resolved only
    /// reduces the facts.
    pub async fn facts(
        &self,
        task: &ApprovalTask,
        resolver: &dyn ContextResolver,
        capability_names: Vec<String>,
    ) -> PromptFacts {
        let pipeline_run_name = task
            .label(&self.config.pipeline_run_label())
            .unwrap_or_default()
            .to_string();
        let pipeline_name = task
            .label(&self.config.pipeline_label())
            .unwrap_or_default()
            .to_string();

        let repository = if pipeline_run_name.is_empty() {
            None
        } else {
            match resolver
                .resolve_pipeline_run(&pipeline_run_name, task.namespace())
                .await
            {
                Ok(Some(spec)) => {
                    let info = spec.git_info();
                    if info.is_none() {
                        debug!("PipelineRun {} has no git-clone task", pipeline_run_name);
                    }
                    info
                }
                Ok(None) => {
                    info!(
                        "PipelineRun {} spec unavailable, continuing with reduced context",
                        pipeline_run_name
                    );
                    None
                }
                Err(e) => {
                    warn!(
                        "Failed to resolve PipelineRun {}: {}; continuing with reduced context",
                        pipeline_run_name, e
                    );
                    None
                }
            }
        };

        PromptFacts {
            pipeline_run_name,
            pipeline_name,
            description: task.spec.description.clone(),
            capability_names,
            repository,
        }
    }

    /// Compile the request the analyzer would receive for this task.
    pub async fn compile_request(
        &self,
        task: &ApprovalTask,
        resolver: &dyn ContextResolver,
        capability_names: Vec<String>,
    ) -> Result<AnalysisRequest, PromptError> {
        let facts = self.facts(task, resolver, capability_names).await;
        prompt::compile(&self.config.prompt, &facts)
    }

    pub async fn reconcile(
        &self,
        task: &ApprovalTask,
        resolver: &dyn ContextResolver,
        analyzer: &dyn Analyzer,
    ) -> Reconciliation {
        self.reconcile_with_clock(task, resolver, analyzer, Utc::now)
            .await
    }

    /// Same as [`Gate::reconcile`] with a fixed review timestamp.
    pub async fn reconcile_at(
        &self,
        task: &ApprovalTask,
        resolver: &dyn ContextResolver,
        analyzer: &dyn Analyzer,
        now: DateTime<Utc>,
    ) -> Reconciliation {
        self.reconcile_with_clock(task, resolver, analyzer, move || now)
            .await
    }

    async fn reconcile_with_clock(
        &self,
        task: &ApprovalTask,
        resolver: &dyn ContextResolver,
        analyzer: &dyn Analyzer,
        clock: impl FnOnce() -> DateTime<Utc>,
    ) -> Reconciliation {
        let key = task.key();
        let index = match self.check(task) {
            Ok(i) => i,
            Err(reason) => {
                info!("ApprovalTask '{}': {}. Skipping.", key, reason);
                return Reconciliation::Skip(reason);
            }
        };

        info!(
            "Processing ApprovalTask '{}' for '{}'",
            key, self.config.approver.name
        );

        let facts = self
            .facts(task, resolver, analyzer.advertise_capabilities())
            .await;
        debug!(
            "Facts for '{}': pipelineRun={} pipeline={} tools={}",
            key,
            facts.pipeline_run_name,
            facts.pipeline_name,
            facts.capability_names.len()
        );

        let decision = self.analyze(&key, &facts, analyzer).await;
        info!("Decision for '{}': {}", key, decision.verdict);

        let mut approvers = task.spec.approvers.clone();
        approvers[index].set_input(decision.verdict);
        approvers[index].set_message(decision.message.clone());

        let reviewed_at = clock().to_rfc3339_opts(SecondsFormat::Micros, false);
        let patch = ApprovalPatch::new(
            self.config.approver.reviewed_annotation.clone(),
            reviewed_at,
            approvers,
        );

        Reconciliation::Patch { decision, patch }
    }

    /// Compile, run, parse. Every failure becomes a fail-safe reject.
    async fn analyze(
        &self,
        key: &str,
        facts: &PromptFacts,
        analyzer: &dyn Analyzer,
    ) -> ReviewDecision {
        let request = match prompt::compile(&self.config.prompt, facts) {
            Ok(r) => r,
            Err(e) => {
                error!("Prompt compilation failed for '{}': {}", key, e);
                return ReviewDecision::fail_safe(e);
            }
        };

        let timeout = self.config.analysis_timeout();
        debug!("Running analysis for '{}' ({} chars)", key, request.as_str().len());

        match tokio::time::timeout(timeout, analyzer.run(&request)).await {
            Ok(Ok(text)) => decision::parse(&text),
            Ok(Err(e)) => {
                warn!("Analysis failed for '{}': {}", key, e);
                ReviewDecision::fail_safe(e)
            }
            Err(_) => {
                let e = AnalyzerError::Timeout(timeout);
                warn!("Analysis failed for '{}': {}", key, e);
                ReviewDecision::fail_safe(e)
            }
        }
    }
}
