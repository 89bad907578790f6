//! Approver Agent - tool-using LLM analyzer behind the engine's Analyzer seam

pub mod runtime;

pub use runtime::{AgentConfig, LlmAnalyzer};
