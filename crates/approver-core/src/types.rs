//! Core types for the approver: the ApprovalTask resource and review outcomes

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Unknown fields carried through untouched so full-sequence rewrites never drop data.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// An ApprovalTask custom resource snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApprovalTaskSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ApprovalTaskSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub approvers: Vec<Approver>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One entry of `spec.approvers`. Order within the task is significant.
///
/// Everything besides `name`, `input` and `message` included, stays in
/// `extra` exactly as read so rewriting the sequence leaves other entries
/// untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Approver {
    pub name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Approver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<ApproverInput>) -> Self {
        self.set_input(input);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.set_message(message);
        self
    }

    /// Recorded input. Absent, `null` and `""` all read as `None`.
    pub fn input(&self) -> Option<ApproverInput> {
        match self.extra.get("input")? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(ApproverInput::from(s.as_str())),
            other => Some(ApproverInput::Other(other.to_string())),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.extra.get("message").and_then(|v| v.as_str())
    }

    pub fn set_input(&mut self, input: impl Into<ApproverInput>) {
        let input = input.into();
        self.extra
            .insert("input".into(), serde_json::Value::String(input.as_str().to_string()));
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.extra
            .insert("message".into(), serde_json::Value::String(message.into()));
    }

    /// True when no terminal decision has been recorded (absent or `pending`).
    pub fn is_undecided(&self) -> bool {
        match self.input() {
            None => true,
            Some(input) => input.is_pending(),
        }
    }
}

/// Value of an approver's `input` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApproverInput {
    Pending,
    Approve,
    Reject,
    /// Anything else a human or another controller wrote. Treated as decided.
    Other(String),
}

impl ApproverInput {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Other(s) => s,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl From<&str> for ApproverInput {
    fn from(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "approve" => Self::Approve,
            "reject" => Self::Reject,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<Verdict> for ApproverInput {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Approve => Self::Approve,
            Verdict::Reject => Self::Reject,
        }
    }
}

impl std::fmt::Display for ApproverInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ApproverInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ApproverInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

impl ApprovalTask {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let task: Self = serde_json::from_str(json)?;
        if task.metadata.name.is_empty() {
            return Err(crate::Error::invalid_resource("metadata.name is empty"));
        }
        Ok(task)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// `namespace/name`, or just `name` for cluster-scoped snapshots.
    pub fn key(&self) -> String {
        if self.metadata.namespace.is_empty() {
            self.metadata.name.clone()
        } else {
            format!("{}/{}", self.metadata.namespace, self.metadata.name)
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(|s| s.as_str())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(|s| s.as_str())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Index of the first approver with the given name.
    pub fn approver_index(&self, name: &str) -> Option<usize> {
        self.spec.approvers.iter().position(|a| a.name == name)
    }
}

/// Binary review outcome.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully populated review decision.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewDecision {
    pub verdict: Verdict,
    pub message: String,
}

impl ReviewDecision {
    pub fn new(verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            verdict,
            message: message.into(),
        }
    }

    pub fn approve(message: impl Into<String>) -> Self {
        Self::new(Verdict::Approve, message)
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self::new(Verdict::Reject, message)
    }

    /// Decision recorded when analysis could not complete.
    pub fn fail_safe(cause: impl std::fmt::Display) -> Self {
        Self::reject(format!("Error in analysis: {}", cause))
    }
}

/// The compiled analysis request handed to an analyzer. Opaque downstream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnalysisRequest(String);

impl AnalysisRequest {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for AnalysisRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
