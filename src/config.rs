use crate::analyzer::AnalyzerThresholds;
use crate::backend::Backend;
use crate::diff_apply::DiffSettings;
use crate::orchestrator::OrchestratorSettings;
use crate::validation::{BRACE_TOLERANCE, ValidationSettings};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const DEFAULT_PLAN_PROMPT: &str = "You plan multi-file refactors of React + TypeScript components.
Given a goal and a list of file paths, reply with JSON only, in the form
{\"steps\": [{\"order\": 1, \"file\": \"<path from the list>\", \"changeDescription\": \"<what to change in this file>\", \"dependsOn\": []}]}.
Use one step per file change, order steps so that a step only depends on earlier ones,
and only reference files from the list.";

const DEFAULT_STEP_PROMPT: &str = "You edit a single React + TypeScript file.
Apply exactly the requested change, keep everything else as it is,
and reply with the complete new file content and nothing else.";

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub model: String,
    /// Empty means the backend's default endpoint.
    #[serde(default)]
    pub base_url: String,
    /// Wall-clock limit for one model call during a refactor step.
    pub timeout_seconds: u64,
    pub brace_tolerance: usize,
    /// File extensions picked up when a directory is given on the command line.
    pub extensions: Vec<String>,
    pub plan_prompt: String,
    pub step_prompt: String,
    pub analyzer: AnalyzerThresholds,
}

impl Default for Config {
    fn default() -> Self {
        let backend = Backend::default();
        Self {
            base_url: backend.config().base_url,
            backend,
            model: "google/gemini-2.5-flash-preview".to_string(),
            timeout_seconds: 120,
            brace_tolerance: BRACE_TOLERANCE,
            analyzer: AnalyzerThresholds::default(),
            extensions: ["tsx", "jsx", "ts", "js"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            plan_prompt: DEFAULT_PLAN_PROMPT.to_string(),
            step_prompt: DEFAULT_STEP_PROMPT.to_string(),
        }
    }
}

/// The settings the pure engine needs, derived from the config file.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub validation: ValidationSettings,
    pub analyzer: AnalyzerThresholds,
    pub step_timeout: Option<Duration>,
}

impl EngineSettings {
    pub fn diff(&self) -> DiffSettings {
        DiffSettings {
            validation: self.validation,
            analyzer: self.analyzer,
        }
    }

    pub fn orchestrator(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            validation: self.validation,
            step_timeout: self.step_timeout,
        }
    }
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            validation: ValidationSettings {
                brace_tolerance: self.brace_tolerance,
            },
            analyzer: self.analyzer,
            step_timeout: (self.timeout_seconds > 0)
                .then(|| Duration::from_secs(self.timeout_seconds)),
        }
    }

    /// Replaces empty values with defaults.
    fn backfilled(self) -> Self {
        let default_config = Config::default();
        Config {
            model: if self.model.is_empty() {
                default_config.model
            } else {
                self.model
            },
            base_url: if self.base_url.is_empty() {
                self.backend.config().base_url
            } else {
                self.base_url
            },
            timeout_seconds: if self.timeout_seconds == 0 {
                default_config.timeout_seconds
            } else {
                self.timeout_seconds
            },
            extensions: if self.extensions.is_empty() {
                default_config.extensions
            } else {
                self.extensions
            },
            plan_prompt: if self.plan_prompt.trim().is_empty() {
                default_config.plan_prompt
            } else {
                self.plan_prompt
            },
            step_prompt: if self.step_prompt.trim().is_empty() {
                default_config.step_prompt
            } else {
                self.step_prompt
            },
            ..self
        }
    }
}

pub fn load_or_create() -> Result<Config> {
    let xdg_dirs = xdg::BaseDirectories::new();
    let config_path = xdg_dirs.place_config_file("remodel/config.toml")?;
    load_or_create_at(&config_path)
}

pub fn load_or_create_at(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        let default_config = Config::default();
        let toml_string = toml::to_string_pretty(&default_config)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, toml_string)?;

        info!(path = %config_path.display(), "created default config");
        return Ok(default_config);
    }

    let config_string = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&config_string)?;
    let final_config = config.backfilled();

    // Write the complete config back so all available options are visible.
    let final_toml_string = toml::to_string_pretty(&final_config)?;
    if final_toml_string != config_string {
        fs::write(config_path, final_toml_string)?;
    }

    Ok(final_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    #[test]
    fn test_creates_default_config() {
        let tmp_dir = Builder::new().prefix("test-config-").tempdir().unwrap();
        let path = tmp_dir.path().join("remodel/config.toml");
        let config = load_or_create_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.brace_tolerance, 2);
        assert_eq!(config.analyzer.max_lines, 250);
    }

    #[test]
    fn test_backfills_missing_fields() {
        let tmp_dir = Builder::new().prefix("test-config-").tempdir().unwrap();
        let path = tmp_dir.path().join("config.toml");
        fs::write(
            &path,
            "backend = \"ollama\"\nmodel = \"\"\nbrace_tolerance = 0\n\n[analyzer]\nmax_lines = 400\n",
        )
        .unwrap();

        let config = load_or_create_at(&path).unwrap();
        assert_eq!(config.backend, Backend::Ollama);
        assert_eq!(config.base_url, "http://localhost:11434/v1/");
        assert_eq!(config.model, Config::default().model);
        assert_eq!(config.brace_tolerance, 0);
        assert_eq!(config.analyzer.max_lines, 400);
        assert_eq!(config.analyzer.max_jsx_depth, 6);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("plan_prompt"));
    }

    #[test]
    fn test_engine_settings() {
        let config = Config {
            timeout_seconds: 30,
            brace_tolerance: 1,
            ..Config::default()
        };
        let settings = config.engine_settings();
        assert_eq!(settings.validation.brace_tolerance, 1);
        assert_eq!(settings.step_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.orchestrator().step_timeout, settings.step_timeout);
    }
}
