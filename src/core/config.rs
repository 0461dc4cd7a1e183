//! Typed application configuration.
//!
//! Settings are loaded from `config.yml` (path overridable with
//! `POLIZA_CONFIG_PATH`) and validated once at startup. A missing model
//! identifier or backend endpoint is fatal: degrading silently would route
//! every query to an unusable backend.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Filesystem locations derived once at startup.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve() -> Self {
        let data_dir = env::var("POLIZA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let log_dir = data_dir.join("logs");
        Self { data_dir, log_dir }
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir.join("conversations.db")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Model identifier passed to the backend (e.g. "llama3.2:latest").
    pub model: String,
    /// Sampling temperature, 0.0..=1.0. Low by default for grounded answers.
    pub temperature: f32,
    /// Base URL of the Ollama-compatible backend.
    pub base_url: String,
    /// Timeout applied to each outbound completion call.
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "llama3.2:latest".to_string(),
            temperature: 0.1,
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSettings {
    /// Base URL of the similarity-search service.
    pub base_url: String,
    /// Collection holding the indexed policy documents.
    pub collection: String,
    /// Top-k for document lookup.
    pub top_k: usize,
    pub request_timeout_secs: u64,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            collection: "polizas_seguros".to_string(),
            top_k: 3,
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Per-session turn budget; oldest turns are evicted beyond it.
    /// 0 disables eviction.
    pub max_turns: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self { max_turns: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum reasoning/action cycles per query.
    pub max_cycles: usize,
    /// Timeout applied to each tool invocation.
    pub tool_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_cycles: 3,
            tool_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub knowledge: KnowledgeSettings,
    pub memory: MemorySettings,
    pub agent: AgentSettings,
}

impl Settings {
    pub fn config_path() -> PathBuf {
        env::var("POLIZA_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.yml"))
    }

    /// Load settings from disk, apply environment overrides, and validate.
    ///
    /// A missing config file is not an error: defaults cover local
    /// development. Invalid contents are.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        let mut settings = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            Settings::default()
        };

        if let Ok(url) = env::var("OLLAMA_BASE_URL") {
            settings.llm.base_url = url;
        }
        if let Ok(url) = env::var("KNOWLEDGE_BASE_URL") {
            settings.knowledge.base_url = url;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model must not be empty".into()));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "llm.base_url must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature must be within 0.0..=1.0, got {}",
                self.llm.temperature
            )));
        }
        if self.knowledge.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "knowledge.base_url must not be empty".into(),
            ));
        }
        if self.knowledge.top_k == 0 {
            return Err(ConfigError::Invalid(
                "knowledge.top_k must be at least 1".into(),
            ));
        }
        if self.agent.max_cycles == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_cycles must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.agent.max_cycles, 3);
        assert_eq!(settings.knowledge.top_k, 3);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut settings = Settings::default();
        settings.llm.temperature = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_empty_model() {
        let mut settings = Settings::default();
        settings.llm.model = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn parses_partial_yaml() {
        let settings: Settings =
            serde_yaml::from_str("llm:\n  model: mistral\nagent:\n  max_cycles: 5\n").unwrap();
        assert_eq!(settings.llm.model, "mistral");
        assert_eq!(settings.agent.max_cycles, 5);
        // untouched sections fall back to defaults
        assert_eq!(settings.knowledge.collection, "polizas_seguros");
    }
}
