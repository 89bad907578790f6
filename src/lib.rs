//! ai-approver - reviews Tekton ApprovalTasks with an LLM analyzer
//!
//! The engine lives in the workspace crates; this crate adds the file-backed
//! adapters and the command line.

pub mod resolver;
pub mod store;

pub use resolver::DirResolver;
pub use store::FileTaskStore;
