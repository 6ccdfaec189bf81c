//! # Code Model
//!
//! The collaborator seam of the orchestrator. A `CodeModel` produces refactor
//! plans and rewritten file bodies; the engine treats both as untrusted raw
//! text that it parses, strips and validates itself.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Input to plan generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub goal: String,
    pub file_paths: Vec<String>,
}

/// Input to a single-file modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    pub file_path: String,
    pub current_content: String,
    pub change_description: String,
    /// One line per completed step, for cross-file context.
    pub prior_steps_summary: String,
}

/// A trait representing a code-generating collaborator.
///
/// Object-safe, so runs can hold a `&dyn CodeModel` or `Arc<dyn CodeModel>`.
#[async_trait]
pub trait CodeModel: Send + Sync {
    /// Returns the raw plan response, expected to hold a JSON plan.
    async fn generate_plan(&self, request: &PlanRequest) -> Result<String>;

    /// Returns the complete new content of the file, possibly fenced.
    async fn modify_file(&self, request: &StepRequest) -> Result<String>;
}
