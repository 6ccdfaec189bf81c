pub mod analyzer;
pub mod backend;
pub mod cli;
pub mod config;
pub mod diff;
pub mod diff_apply;
pub mod error;
pub mod executor;
mod executor_tests;
pub mod files;
pub mod markup;
pub mod model;
pub mod openrouter;
pub mod operation;
pub mod orchestrator;
pub mod plan;
pub mod source;
pub mod syntax;
pub mod validation;

pub use analyzer::{AnalyzerThresholds, FileAnalysis, analyze, generate_extraction_message};
pub use config::Config;
pub use diff_apply::{DiffApplication, EditBlock, apply_diff};
pub use error::{EngineError, ErrorKind};
pub use executor::{OperationOutcome, apply_operation, apply_operations};
pub use model::CodeModel;
pub use operation::Operation;
pub use orchestrator::{Orchestrator, RefactorRunResult};
pub use source::SourceFile;
