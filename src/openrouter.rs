//! A [`CodeModel`] backed by an OpenAI-compatible chat-completion endpoint,
//! reached through the OpenRouter client.

use crate::config::Config;
use crate::model::{CodeModel, PlanRequest, StepRequest};
use anyhow::{Result, bail};
use async_trait::async_trait;
use console::style;
use futures::StreamExt;
use openrouter_api::types::chat::{ChatCompletionRequest, Message};
use openrouter_api::{OpenRouterClient, Ready};
use std::io::{Write, stdout};
use std::time::Duration;
use tracing::debug;

pub fn initialize_client(config: &Config) -> Result<OpenRouterClient<Ready>> {
    let api_key = config.backend.api_key()?;
    let client = OpenRouterClient::new()
        .with_base_url(&config.base_url)?
        .with_timeout(Duration::from_secs(config.timeout_seconds))
        .with_api_key(api_key)?;
    Ok(client)
}

fn message(role: &str, content: String) -> Message {
    Message {
        role: role.to_string(),
        content,
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

/// Streams a completion and returns its text. With `echo`, the text is
/// printed as it arrives.
pub async fn stream_completion(
    client: &OpenRouterClient<Ready>,
    mut request: ChatCompletionRequest,
    echo: bool,
) -> Result<String> {
    request.stream = Some(true);
    let mut stream = client.chat()?.chat_completion_stream(request);

    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(c) = chunk
            .choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
        {
            if echo {
                print!("{}", style(c).dim());
                stdout().flush()?;
            }
            content.push_str(c);
        }
    }
    if echo && !content.is_empty() {
        println!();
    }

    if content.trim().is_empty() {
        bail!("model returned an empty response");
    }
    Ok(content)
}

pub struct OpenRouterModel {
    client: OpenRouterClient<Ready>,
    model: String,
    plan_prompt: String,
    step_prompt: String,
    echo: bool,
}

impl OpenRouterModel {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client: initialize_client(config)?,
            model: config.model.clone(),
            plan_prompt: config.plan_prompt.clone(),
            step_prompt: config.step_prompt.clone(),
            echo: false,
        })
    }

    /// Prints streamed responses to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    async fn complete(&self, system: &str, user: String) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![message("system", system.to_string()), message("user", user)],
            tools: None,
            stream: Some(true),
            response_format: None,
            provider: None,
            models: None,
            transforms: None,
        };
        debug!(model = %self.model, "sending completion request");
        stream_completion(&self.client, request, self.echo).await
    }
}

pub fn plan_prompt(request: &PlanRequest) -> String {
    let files = request
        .file_paths
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Goal: {}\n\nFiles:\n{files}", request.goal)
}

pub fn step_prompt(request: &StepRequest) -> String {
    format!(
        "File: {}\n\nChange to make:\n{}\n\nAlready completed:\n{}\n\nCurrent content:\n```tsx\n{}\n```\n\nReply with the complete new content of {}.",
        request.file_path,
        request.change_description,
        request.prior_steps_summary,
        request.current_content.trim_end(),
        request.file_path
    )
}

#[async_trait]
impl CodeModel for OpenRouterModel {
    async fn generate_plan(&self, request: &PlanRequest) -> Result<String> {
        self.complete(&self.plan_prompt, plan_prompt(request)).await
    }

    async fn modify_file(&self, request: &StepRequest) -> Result<String> {
        self.complete(&self.step_prompt, step_prompt(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prompt_lists_files() {
        let prompt = plan_prompt(&PlanRequest {
            goal: "extract a Button".to_string(),
            file_paths: vec!["src/App.tsx".to_string(), "src/Button.tsx".to_string()],
        });
        assert_eq!(
            prompt,
            "Goal: extract a Button\n\nFiles:\n- src/App.tsx\n- src/Button.tsx"
        );
    }

    #[test]
    fn test_step_prompt_fences_content() {
        let prompt = step_prompt(&StepRequest {
            file_path: "src/App.tsx".to_string(),
            current_content: "const a = 1;\n".to_string(),
            change_description: "rename a to b".to_string(),
            prior_steps_summary: "No steps completed yet.".to_string(),
        });
        assert!(prompt.contains("```tsx\nconst a = 1;\n```"));
        assert!(prompt.starts_with("File: src/App.tsx\n"));
    }
}
