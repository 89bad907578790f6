//! Patch document produced by a review.
//!
//! Serializes as a JSON merge patch: the whole `spec.approvers` sequence is
//! replaced and the reviewed-marker annotation is added in the same document.

use crate::types::{ApprovalTask, Approver};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApprovalPatch {
    pub metadata: PatchMetadata,
    pub spec: PatchSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatchMetadata {
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatchSpec {
    pub approvers: Vec<Approver>,
}

impl ApprovalPatch {
    pub fn new(
        marker_key: impl Into<String>,
        reviewed_at: impl Into<String>,
        approvers: Vec<Approver>,
    ) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(marker_key.into(), reviewed_at.into());
        Self {
            metadata: PatchMetadata { annotations },
            spec: PatchSpec { approvers },
        }
    }

    pub fn approvers(&self) -> &[Approver] {
        &self.spec.approvers
    }

    pub fn approver(&self, name: &str) -> Option<&Approver> {
        self.spec.approvers.iter().find(|a| a.name == name)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(|s| s.as_str())
    }

    /// Merge this patch into a snapshot the way the API server would.
    pub fn apply_to(&self, task: &mut ApprovalTask) {
        for (k, v) in &self.metadata.annotations {
            task.metadata.annotations.insert(k.clone(), v.clone());
        }
        task.spec.approvers = self.spec.approvers.clone();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
