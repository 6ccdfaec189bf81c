use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Placeholder key for backends that do not authenticate; the client
/// requires one to be set.
const UNAUTHENTICATED_KEY: &str =
    "sk-or-v1-0000000000000000000000000000000000000000000000000000000000000000";

pub struct BackendConfig {
    pub base_url: String,
    pub api_key_env_var: Option<&'static str>,
}

/// An OpenAI-compatible chat-completion endpoint the code model can talk to.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Openrouter,
    Ollama,
    Openai,
}

impl Backend {
    pub fn config(&self) -> BackendConfig {
        match self {
            Backend::Openrouter => BackendConfig {
                base_url: "https://openrouter.ai/api/v1/".to_string(),
                api_key_env_var: Some("OPENROUTER_API_KEY"),
            },
            Backend::Ollama => BackendConfig {
                base_url: "http://localhost:11434/v1/".to_string(),
                api_key_env_var: None,
            },
            Backend::Openai => BackendConfig {
                base_url: "https://api.openai.com/v1/".to_string(),
                api_key_env_var: Some("OPENAI_API_KEY"),
            },
        }
    }

    /// Reads the API key from the backend's environment variable.
    pub fn api_key(&self) -> Result<String> {
        match self.config().api_key_env_var {
            Some(env_var) => match std::env::var(env_var) {
                Ok(key) if !key.trim().is_empty() => Ok(key),
                _ => bail!("environment variable {env_var} not set"),
            },
            None => Ok(UNAUTHENTICATED_KEY.to_string()),
        }
    }
}
