//! Approver Engine - decides whether a review is owed, compiles the analysis
//! request, parses the verdict and builds the patch

pub mod analyzer;
pub mod decision;
pub mod driver;
pub mod gate;
pub mod prompt;
pub mod resolver;

pub use analyzer::{Analyzer, AnalyzerError, ReplayAnalyzer};
pub use decision::parse as parse_decision;
pub use driver::{reconcile_with_store, DriveOutcome, StoreError, TaskStore};
pub use gate::{Gate, Reconciliation, SkipReason};
pub use prompt::{compile, PromptError, PromptFacts};
pub use resolver::{ContextResolver, NoContext, ResolveError, StaticResolver};
