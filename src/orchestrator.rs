//! # Multi-File Refactor Orchestrator
//!
//! Runs a natural-language refactor as a sequence of single-file rewrites:
//!
//! ```text
//! PLANNING -> EXECUTING(step 1) -> EXECUTING(step 2) -> ... -> COMPLETED
//!                  \__________________\___________________-> FAILED
//! ```
//!
//! Steps execute strictly in `order`, each against the latest accumulated
//! content of its file. The accumulated contents (keyed by path) and the list
//! of completed steps are the only state a run carries; they are threaded
//! through every step and returned whole when a step fails, so the caller can
//! resume from the failed step without redoing earlier work.

use crate::diff::{LineDelta, line_delta};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::model::{CodeModel, PlanRequest, StepRequest};
use crate::plan::{RefactorPlan, RefactorStep, strip_code_fences};
use crate::source::{SourceFile, short_hash};
use crate::validation::{ValidationSettings, validate_generated_code};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Planning,
    Executing { order: u32 },
    Failed,
    Completed,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub validation: ValidationSettings,
    /// Wall-clock limit for one collaborator call. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStep {
    pub order: u32,
    pub file: String,
    pub change_description: String,
    pub line_delta: LineDelta,
    /// Short SHA-1 of the file content this step produced.
    pub content_hash: String,
}

impl CompletedStep {
    pub fn summary(&self) -> String {
        format!(
            "Step {} ({}): {} [{}]",
            self.order, self.file, self.change_description, self.line_delta
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    /// The step that failed; `None` when the run failed before executing any.
    pub step: Option<RefactorStep>,
    pub error: String,
    pub error_kind: ErrorKind,
}

/// Everything needed to retry only the failed step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePayload {
    pub completed_steps: Vec<CompletedStep>,
    /// Latest content of every file a completed step touched.
    pub modified_files: Vec<SourceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RefactorRunResult {
    #[serde(rename_all = "camelCase")]
    Completed {
        plan: RefactorPlan,
        completed_steps: Vec<CompletedStep>,
        modified_files: Vec<SourceFile>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        plan: Option<RefactorPlan>,
        failure: RunFailure,
        resume: ResumePayload,
    },
}

impl RefactorRunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, RefactorRunResult::Completed { .. })
    }

    pub fn completed_steps(&self) -> &[CompletedStep] {
        match self {
            RefactorRunResult::Completed {
                completed_steps, ..
            } => completed_steps,
            RefactorRunResult::Failed { resume, .. } => &resume.completed_steps,
        }
    }

    /// Latest content per path. On failure this is the resume payload.
    pub fn modified_files(&self) -> &[SourceFile] {
        match self {
            RefactorRunResult::Completed { modified_files, .. } => modified_files,
            RefactorRunResult::Failed { resume, .. } => &resume.modified_files,
        }
    }

    pub fn plan(&self) -> Option<&RefactorPlan> {
        match self {
            RefactorRunResult::Completed { plan, .. } => Some(plan),
            RefactorRunResult::Failed { plan, .. } => plan.as_ref(),
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            RefactorRunResult::Completed { .. } => None,
            RefactorRunResult::Failed { failure, .. } => Some(failure),
        }
    }
}

/// The state threaded through a run.
#[derive(Debug, Default)]
struct RunProgress {
    completed: Vec<CompletedStep>,
    contents: BTreeMap<String, String>,
}

impl RunProgress {
    fn from_payload(payload: &ResumePayload) -> Self {
        Self {
            completed: payload.completed_steps.clone(),
            contents: payload
                .modified_files
                .iter()
                .map(|f| (f.path.clone(), f.content.clone()))
                .collect(),
        }
    }

    fn is_done(&self, order: u32) -> bool {
        self.completed.iter().any(|c| c.order == order)
    }

    fn summary(&self) -> String {
        if self.completed.is_empty() {
            return "No steps completed yet.".to_string();
        }
        self.completed
            .iter()
            .map(CompletedStep::summary)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn files(&self) -> Vec<SourceFile> {
        self.contents
            .iter()
            .map(|(path, content)| SourceFile::new(path.clone(), content.clone()))
            .collect()
    }

    fn into_payload(self) -> ResumePayload {
        ResumePayload {
            modified_files: self.files(),
            completed_steps: self.completed,
        }
    }
}

pub struct Orchestrator {
    model: Arc<dyn CodeModel>,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn CodeModel>) -> Self {
        Self {
            model,
            settings: OrchestratorSettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Uses `token` for cooperative cancellation. It is checked before every
    /// step and interrupts a pending collaborator call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run_refactor(&self, goal: &str, files: &[SourceFile]) -> RefactorRunResult {
        let mut state = RunState::Planning;
        debug!(?state, goal, files = files.len(), "starting refactor run");

        let plan = match self.plan(goal, files).await {
            Ok(plan) => plan,
            Err(e) => {
                transition(&mut state, RunState::Failed);
                warn!(error = %e, "refactor run failed during planning");
                return RefactorRunResult::Failed {
                    plan: None,
                    failure: RunFailure {
                        step: None,
                        error: e.to_string(),
                        error_kind: e.kind(),
                    },
                    resume: ResumePayload::default(),
                };
            }
        };
        info!(steps = plan.steps.len(), "refactor plan accepted");
        self.execute(plan, files, RunProgress::default(), state).await
    }

    /// Continues a failed run: steps recorded in `payload` are skipped and the
    /// remaining ones run against the payload's accumulated contents.
    pub async fn resume(
        &self,
        plan: &RefactorPlan,
        files: &[SourceFile],
        payload: &ResumePayload,
    ) -> RefactorRunResult {
        info!(
            completed = payload.completed_steps.len(),
            total = plan.steps.len(),
            "resuming refactor run"
        );
        self.execute(
            plan.clone(),
            files,
            RunProgress::from_payload(payload),
            RunState::Planning,
        )
        .await
    }

    async fn plan(&self, goal: &str, files: &[SourceFile]) -> EngineResult<RefactorPlan> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled { order: 0 });
        }
        let file_paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        let request = PlanRequest {
            goal: goal.to_string(),
            file_paths: file_paths.clone(),
        };
        let response = self
            .model
            .generate_plan(&request)
            .await
            .map_err(|e| EngineError::PlanGenerationFailed(format!("plan generator error: {e}")))?;
        RefactorPlan::parse(&response, &file_paths)
    }

    async fn execute(
        &self,
        plan: RefactorPlan,
        files: &[SourceFile],
        mut progress: RunProgress,
        mut state: RunState,
    ) -> RefactorRunResult {
        let originals: BTreeMap<&str, &str> = files
            .iter()
            .map(|f| (f.path.as_str(), f.content.as_str()))
            .collect();

        for step in &plan.steps {
            if progress.is_done(step.order) {
                debug!(order = step.order, "step already completed, skipping");
                continue;
            }
            transition(&mut state, RunState::Executing { order: step.order });

            match self.execute_step(step, &originals, &progress).await {
                Ok((completed, content)) => {
                    info!(
                        order = step.order,
                        file = %step.file,
                        added = completed.line_delta.added,
                        removed = completed.line_delta.removed,
                        "step completed"
                    );
                    progress.contents.insert(step.file.clone(), content);
                    progress.completed.push(completed);
                }
                Err(e) => {
                    transition(&mut state, RunState::Failed);
                    warn!(order = step.order, file = %step.file, error = %e, "step failed");
                    let failure = RunFailure {
                        step: Some(step.clone()),
                        error: e.to_string(),
                        error_kind: e.kind(),
                    };
                    return RefactorRunResult::Failed {
                        plan: Some(plan.clone()),
                        failure,
                        resume: progress.into_payload(),
                    };
                }
            }
        }

        transition(&mut state, RunState::Completed);
        info!(
            steps = progress.completed.len(),
            files = progress.contents.len(),
            "refactor run completed"
        );
        RefactorRunResult::Completed {
            plan,
            modified_files: progress.files(),
            completed_steps: progress.completed,
        }
    }

    async fn execute_step(
        &self,
        step: &RefactorStep,
        originals: &BTreeMap<&str, &str>,
        progress: &RunProgress,
    ) -> EngineResult<(CompletedStep, String)> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled { order: step.order });
        }

        let current = progress
            .contents
            .get(&step.file)
            .map(String::as_str)
            .or_else(|| originals.get(step.file.as_str()).copied())
            .ok_or_else(|| EngineError::StepExecutionFailed {
                order: step.order,
                file: step.file.clone(),
                reason: "file is not in the run's file set".to_string(),
            })?;

        let request = StepRequest {
            file_path: step.file.clone(),
            current_content: current.to_string(),
            change_description: step.change_description.clone(),
            prior_steps_summary: progress.summary(),
        };

        let response = self.call_model(step, &request).await?;
        let mut content = strip_code_fences(&response);
        if current.ends_with('\n') && !content.ends_with('\n') {
            content.push('\n');
        }
        validate_generated_code(&content, &self.settings.validation)?;

        let completed = CompletedStep {
            order: step.order,
            file: step.file.clone(),
            change_description: step.change_description.clone(),
            line_delta: line_delta(current, &content),
            content_hash: short_hash(&content),
        };
        Ok((completed, content))
    }

    async fn call_model(&self, step: &RefactorStep, request: &StepRequest) -> EngineResult<String> {
        let call = self.model.modify_file(request);
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return Err(EngineError::Cancelled { order: step.order }),
            outcome = async {
                match self.settings.step_timeout {
                    Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| limit),
                    None => Ok(call.await),
                }
            } => outcome,
        };
        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(EngineError::StepExecutionFailed {
                order: step.order,
                file: step.file.clone(),
                reason: e.to_string(),
            }),
            Err(limit) => Err(EngineError::Timeout {
                order: step.order,
                limit,
            }),
        }
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!(from = ?state, to = ?next, "run state transition");
    *state = next;
}
