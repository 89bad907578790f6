//! Approver Core - ApprovalTask model, patches, pipeline context and configuration

pub mod config;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod types;

pub use config::{ApproverConfig, ApproverIdentity, ModelConfig, PromptPolicy, PromptRule, ToolsConfig};
pub use error::{Error, Result};
pub use patch::ApprovalPatch;
pub use pipeline::{GitInfo, PipelineSpec};
pub use types::*;
