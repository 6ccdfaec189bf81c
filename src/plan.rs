//! Refactor plans: parsing the plan generator's response and checking that it
//! is well-formed before any file is touched.

use crate::error::{EngineError, EngineResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

static CODE_FENCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[\w.+-]*[^\n]*\n(.*?)\n?```\s*$").expect("Invalid regex"));

/// A fenced block anywhere in the text, fence lines on their own lines.
static EMBEDDED_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[^\n`]*\n(.*?)\n?^[ \t]*```[ \t]*$").expect("Invalid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactorStep {
    pub order: u32,
    #[serde(alias = "filePath")]
    pub file: String,
    #[serde(alias = "description")]
    pub change_description: String,
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorPlan {
    pub steps: Vec<RefactorStep>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanPayload {
    Object { steps: Vec<RefactorStep> },
    Steps(Vec<RefactorStep>),
}

/// Extracts the code from a model response. A response that is one fence
/// yields its body; prose around fenced blocks is dropped and the largest
/// block is kept; unfenced text only loses blank leading lines and trailing
/// whitespace.
pub fn strip_code_fences(text: &str) -> String {
    let whole = CODE_FENCE_REGEX
        .captures(text)
        .and_then(|c| c.get(1))
        .filter(|body| !body.as_str().contains("```"));
    if let Some(body) = whole {
        return body.as_str().to_string();
    }
    EMBEDDED_FENCE_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .max_by_key(|m| m.len())
        .map_or_else(|| trim_blank_edges(text), |m| m.as_str())
        .to_string()
}

fn trim_blank_edges(text: &str) -> &str {
    let text = text.trim_end();
    let first = text.find(|c: char| !c.is_whitespace()).unwrap_or(text.len());
    let start = text[..first].rfind('\n').map_or(0, |i| i + 1);
    &text[start..]
}

/// Narrows model output to the outermost JSON object or array it contains.
fn json_slice(text: &str) -> &str {
    let start = text.find(['{', '[']);
    let end = text.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

impl RefactorPlan {
    /// Parses a plan from the generator's raw response and validates it
    /// against the files of the run. Steps come back sorted by `order`.
    pub fn parse(response: &str, file_paths: &[String]) -> EngineResult<Self> {
        let body = strip_code_fences(response);
        let payload: PlanPayload = serde_json::from_str(&body)
            .or_else(|_| serde_json::from_str(json_slice(&body)))
            .map_err(|e| {
                warn!(error = %e, "plan response is not valid plan JSON");
                EngineError::PlanGenerationFailed(format!("response is not a valid plan: {e}"))
            })?;
        let steps = match payload {
            PlanPayload::Object { steps } | PlanPayload::Steps(steps) => steps,
        };
        let plan = Self::new(steps, file_paths)?;
        debug!(steps = plan.steps.len(), "accepted refactor plan");
        Ok(plan)
    }

    pub fn new(mut steps: Vec<RefactorStep>, file_paths: &[String]) -> EngineResult<Self> {
        if steps.is_empty() {
            return Err(EngineError::PlanGenerationFailed(
                "plan contains no steps".to_string(),
            ));
        }
        steps.sort_by_key(|s| s.order);

        let mut seen = BTreeSet::new();
        for step in &steps {
            if !seen.insert(step.order) {
                return Err(EngineError::PlanGenerationFailed(format!(
                    "step order {} appears more than once",
                    step.order
                )));
            }
            if !file_paths.iter().any(|p| *p == step.file) {
                return Err(EngineError::PlanGenerationFailed(format!(
                    "step {} targets '{}', which is not in the file set",
                    step.order, step.file
                )));
            }
            if step.change_description.trim().is_empty() {
                return Err(EngineError::PlanGenerationFailed(format!(
                    "step {} has no change description",
                    step.order
                )));
            }
            // Dependencies must point backwards, which also rules out cycles.
            if let Some(dep) = step.depends_on.iter().find(|&&d| d >= step.order || !seen.contains(&d)) {
                return Err(EngineError::PlanGenerationFailed(format!(
                    "step {} depends on step {dep}, which does not come before it",
                    step.order
                )));
            }
        }
        Ok(Self { steps })
    }

    /// One line per step, for display and for the modification prompt.
    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{}. {}: {}", s.order, s.file, s.change_description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> Vec<String> {
        vec!["src/App.tsx".to_string(), "src/Button.tsx".to_string()]
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```tsx\nconst a = 1;\n```"), "const a = 1;");
        assert_eq!(strip_code_fences("  const a = 1;\n"), "  const a = 1;");
        assert_eq!(strip_code_fences("\n\n  a();\n  b();\n\n"), "  a();\n  b();");
        assert_eq!(strip_code_fences("```\na\nb\n```\n"), "a\nb");
    }

    #[test]
    fn test_strip_code_fences_drops_surrounding_prose() {
        let response = "Here is the updated file:\n```tsx\nconst a = 1;\nexport default a;\n```\nLet me know!";
        assert_eq!(strip_code_fences(response), "const a = 1;\nexport default a;");

        let two_blocks = "First:\n```\nx\n```\nThen:\n```ts\nconst longer = 2;\n```\n";
        assert_eq!(strip_code_fences(two_blocks), "const longer = 2;");

        let fenced_twice = "```tsx\nA;\n```\nand\n```tsx\nconst b = 2;\n```";
        assert_eq!(strip_code_fences(fenced_twice), "const b = 2;");
    }

    #[test]
    fn test_parse_object_plan_sorts_steps() {
        let response = r#"```json
{"steps": [
  {"order": 2, "file": "src/App.tsx", "changeDescription": "use Button", "dependsOn": [1]},
  {"order": 1, "file": "src/Button.tsx", "changeDescription": "add variant prop"}
]}
```"#;
        let plan = RefactorPlan::parse(response, &paths()).unwrap();
        assert_eq!(plan.steps[0].order, 1);
        assert_eq!(plan.steps[1].depends_on, vec![1]);
        assert_eq!(
            plan.summary(),
            "1. src/Button.tsx: add variant prop\n2. src/App.tsx: use Button"
        );
    }

    #[test]
    fn test_parse_bare_array_with_prose() {
        let response = r#"Here is the plan:
[{"order": 1, "filePath": "src/App.tsx", "description": "rename state"}]
Let me know."#;
        let plan = RefactorPlan::parse(response, &paths()).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].file, "src/App.tsx");
    }

    #[test]
    fn test_rejects_unparseable_response() {
        let err = RefactorPlan::parse("I could not do that.", &paths()).unwrap_err();
        assert!(matches!(err, EngineError::PlanGenerationFailed(_)));
    }

    #[test]
    fn test_rejects_unknown_file_and_bad_dependencies() {
        let unknown = r#"[{"order": 1, "file": "src/Other.tsx", "changeDescription": "x"}]"#;
        assert!(RefactorPlan::parse(unknown, &paths()).is_err());

        let forward = r#"[
            {"order": 1, "file": "src/App.tsx", "changeDescription": "x", "dependsOn": [2]},
            {"order": 2, "file": "src/App.tsx", "changeDescription": "y"}
        ]"#;
        let err = RefactorPlan::parse(forward, &paths()).unwrap_err();
        assert!(err.to_string().contains("depends on step 2"));

        let duplicate = r#"[
            {"order": 1, "file": "src/App.tsx", "changeDescription": "x"},
            {"order": 1, "file": "src/App.tsx", "changeDescription": "y"}
        ]"#;
        assert!(RefactorPlan::parse(duplicate, &paths()).is_err());
        assert!(RefactorPlan::parse("[]", &paths()).is_err());
    }
}
