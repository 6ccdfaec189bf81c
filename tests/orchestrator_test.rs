use anyhow::{Result, anyhow};
use async_trait::async_trait;
use remodel::model::{CodeModel, PlanRequest, StepRequest};
use remodel::orchestrator::{Orchestrator, OrchestratorSettings, RefactorRunResult};
use remodel::{ErrorKind, SourceFile};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PLAN: &str = r#"```json
{
  "steps": [
    { "order": 1, "file": "src/A.tsx", "changeDescription": "update A" },
    { "order": 2, "file": "src/B.tsx", "changeDescription": "update B", "dependsOn": [1] },
    { "order": 3, "file": "src/C.tsx", "changeDescription": "update C" }
  ]
}
```"#;

fn component(name: &str, body: &str) -> String {
    format!("import React from 'react';\n\nexport function {name}() {{\n  return {body};\n}}\n")
}

fn files() -> Vec<SourceFile> {
    vec![
        SourceFile::new("src/A.tsx", component("A", "<div />")),
        SourceFile::new("src/B.tsx", component("B", "<span />")),
        SourceFile::new("src/C.tsx", component("C", "<p />")),
    ]
}

/// Answers plan and step requests from fixed scripts, keyed by the step's
/// change description, and records every step request it receives.
#[derive(Default)]
struct ScriptedModel {
    plan: String,
    responses: HashMap<String, Result<String, String>>,
    delay: Option<Duration>,
    cancel_after_plan: Option<CancellationToken>,
    calls: Mutex<Vec<StepRequest>>,
}

impl ScriptedModel {
    fn new(plan: &str) -> Self {
        Self {
            plan: plan.to_string(),
            ..Default::default()
        }
    }

    fn respond(mut self, description: &str, response: &str) -> Self {
        self.responses
            .insert(description.to_string(), Ok(response.to_string()));
        self
    }

    fn fail(mut self, description: &str, reason: &str) -> Self {
        self.responses
            .insert(description.to_string(), Err(reason.to_string()));
        self
    }

    fn called_descriptions(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.change_description.clone())
            .collect()
    }
}

#[async_trait]
impl CodeModel for ScriptedModel {
    async fn generate_plan(&self, _request: &PlanRequest) -> Result<String> {
        if let Some(token) = &self.cancel_after_plan {
            token.cancel();
        }
        Ok(self.plan.clone())
    }

    async fn modify_file(&self, request: &StepRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.responses.get(&request.change_description) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(anyhow!(reason.clone())),
            None => Err(anyhow!("no scripted response")),
        }
    }
}

fn all_steps_succeed(plan: &str) -> ScriptedModel {
    ScriptedModel::new(plan)
        .respond("update A", &component("A", "<section />"))
        .respond("update B", &format!("```tsx\n{}```", component("B", "<strong />")))
        .respond("update C", &component("C", "<em />"))
}

#[tokio::test]
async fn test_completed_run_returns_every_modified_file() {
    let model = Arc::new(all_steps_succeed(PLAN));
    let orchestrator = Orchestrator::new(model.clone());

    let result = orchestrator.run_refactor("rename tags", &files()).await;

    assert!(result.is_completed());
    assert_eq!(result.completed_steps().len(), 3);
    let modified = result.modified_files();
    assert_eq!(modified.len(), 3);
    let b = modified.iter().find(|f| f.path == "src/B.tsx").unwrap();
    assert_eq!(b.content, component("B", "<strong />"));
    assert_eq!(
        model.called_descriptions(),
        vec!["update A", "update B", "update C"]
    );

    let second = model.calls.lock().unwrap()[1].clone();
    assert!(second.prior_steps_summary.contains("Step 1 (src/A.tsx): update A"));
    assert_eq!(result.completed_steps()[0].line_delta.added, 1);
    assert_eq!(result.completed_steps()[0].content_hash.len(), 8);
}

#[tokio::test]
async fn test_steps_on_the_same_file_see_accumulated_content() {
    let plan = r#"[
        { "order": 1, "file": "src/A.tsx", "changeDescription": "first" },
        { "order": 2, "file": "src/A.tsx", "changeDescription": "second" }
    ]"#;
    let after_first = component("A", "<section />");
    let model = Arc::new(
        ScriptedModel::new(plan)
            .respond("first", &after_first)
            .respond("second", &component("A", "<main />")),
    );

    let result = Orchestrator::new(model.clone())
        .run_refactor("two passes", &files())
        .await;

    assert!(result.is_completed());
    let calls = model.calls.lock().unwrap();
    assert_eq!(calls[1].current_content, after_first);
    assert_eq!(result.modified_files().len(), 1);
    assert_eq!(result.modified_files()[0].content, component("A", "<main />"));
}

#[tokio::test]
async fn test_failed_step_keeps_earlier_progress_and_stops() {
    let model = Arc::new(
        ScriptedModel::new(PLAN)
            .respond("update A", &component("A", "<section />"))
            .fail("update B", "upstream error")
            .respond("update C", &component("C", "<em />")),
    );

    let result = Orchestrator::new(model.clone())
        .run_refactor("rename tags", &files())
        .await;

    assert!(!result.is_completed());
    assert_eq!(result.completed_steps().len(), 1);
    let failure = result.failure().unwrap();
    assert_eq!(failure.step.as_ref().unwrap().order, 2);
    assert_eq!(failure.error_kind, ErrorKind::StepExecutionFailed);
    assert!(failure.error.contains("upstream error"));

    assert_eq!(
        result.modified_files(),
        &[SourceFile::new("src/A.tsx", component("A", "<section />"))]
    );
    assert_eq!(model.called_descriptions(), vec!["update A", "update B"]);
}

#[tokio::test]
async fn test_resume_runs_only_the_remaining_steps() {
    let first = Arc::new(
        ScriptedModel::new(PLAN)
            .respond("update A", &component("A", "<section />"))
            .fail("update B", "rate limited"),
    );
    let failed = Orchestrator::new(first)
        .run_refactor("rename tags", &files())
        .await;

    // The saved form is what the command line writes with --resume-out.
    let saved = serde_json::to_string(&failed).unwrap();
    let restored: RefactorRunResult = serde_json::from_str(&saved).unwrap();
    let RefactorRunResult::Failed {
        plan: Some(plan),
        resume,
        ..
    } = restored
    else {
        panic!("expected a failed run with a plan");
    };

    let second = Arc::new(all_steps_succeed(PLAN));
    let result = Orchestrator::new(second.clone())
        .resume(&plan, &files(), &resume)
        .await;

    assert!(result.is_completed());
    assert_eq!(second.called_descriptions(), vec!["update B", "update C"]);
    let orders: Vec<u32> = result.completed_steps().iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    let a = result
        .modified_files()
        .iter()
        .find(|f| f.path == "src/A.tsx")
        .unwrap();
    assert_eq!(a.content, component("A", "<section />"));
}

#[tokio::test]
async fn test_prose_around_fenced_output_is_dropped() {
    let chatty = format!(
        "Here is the updated file:\n```tsx\n{}```\nLet me know if you need anything else!",
        component("A", "<section />")
    );
    let model = Arc::new(
        ScriptedModel::new(PLAN)
            .respond("update A", &chatty)
            .respond("update B", &component("B", "<strong />"))
            .respond("update C", &component("C", "<em />")),
    );

    let result = Orchestrator::new(model)
        .run_refactor("rename tags", &files())
        .await;

    assert!(result.is_completed());
    let a = result
        .modified_files()
        .iter()
        .find(|f| f.path == "src/A.tsx")
        .unwrap();
    assert_eq!(a.content, component("A", "<section />"));
}

#[tokio::test]
async fn test_invalid_plan_fails_before_any_step() {
    let model = Arc::new(ScriptedModel::new("I would start by looking at A."));
    let result = Orchestrator::new(model.clone())
        .run_refactor("rename tags", &files())
        .await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.error_kind, ErrorKind::PlanGenerationFailed);
    assert!(failure.step.is_none());
    assert!(result.plan().is_none());
    assert!(model.called_descriptions().is_empty());
}

#[tokio::test]
async fn test_plan_referencing_unknown_file_is_rejected() {
    let plan = r#"{"steps": [{"order": 1, "file": "src/Z.tsx", "changeDescription": "x"}]}"#;
    let result = Orchestrator::new(Arc::new(ScriptedModel::new(plan)))
        .run_refactor("rename tags", &files())
        .await;
    assert_eq!(
        result.failure().unwrap().error_kind,
        ErrorKind::PlanGenerationFailed
    );
}

#[tokio::test]
async fn test_invalid_generated_code_fails_validation() {
    let model = Arc::new(
        ScriptedModel::new(PLAN).respond("update A", "Sure! Here is what I changed."),
    );
    let result = Orchestrator::new(model)
        .run_refactor("rename tags", &files())
        .await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.error_kind, ErrorKind::ValidationFailed);
    assert_eq!(failure.step.as_ref().unwrap().order, 1);
    assert!(result.modified_files().is_empty());
}

#[tokio::test]
async fn test_slow_step_times_out() {
    let model = Arc::new(ScriptedModel {
        delay: Some(Duration::from_millis(500)),
        ..all_steps_succeed(PLAN)
    });
    let orchestrator = Orchestrator::new(model).with_settings(OrchestratorSettings {
        step_timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    });

    let result = orchestrator.run_refactor("rename tags", &files()).await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.error_kind, ErrorKind::Timeout);
    assert_eq!(failure.step.as_ref().unwrap().order, 1);
    assert!(failure.error.ends_with("timed out after 20ms"), "{}", failure.error);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let model = Arc::new(all_steps_succeed(PLAN));
    let result = Orchestrator::new(model.clone())
        .with_cancellation(token)
        .run_refactor("rename tags", &files())
        .await;

    assert_eq!(result.failure().unwrap().error_kind, ErrorKind::Cancelled);
    assert!(model.called_descriptions().is_empty());
}

#[tokio::test]
async fn test_cancelled_between_steps_keeps_the_plan() {
    let token = CancellationToken::new();
    let model = Arc::new(ScriptedModel {
        cancel_after_plan: Some(token.clone()),
        ..all_steps_succeed(PLAN)
    });
    let result = Orchestrator::new(model.clone())
        .with_cancellation(token)
        .run_refactor("rename tags", &files())
        .await;

    assert_eq!(result.failure().unwrap().error_kind, ErrorKind::Cancelled);
    assert_eq!(result.plan().unwrap().steps.len(), 3);
    assert!(result.completed_steps().is_empty());
    assert!(model.called_descriptions().is_empty());
}
