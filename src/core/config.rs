//! Configuration management.
//!
//! Handles loading and saving configuration from TOML files. Environment
//! variables override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::session::{AnswerGate, IkigaiSettings, WHY_TOTAL_EXCHANGES};

const APP_DIR: &str = "ikigai-coach";
const LOCAL_CONFIG: &str = ".ikigai.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Session protocol tunables
    pub session: SessionConfig,

    /// AI settings
    pub ai: AiConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Where profiles and the session snapshot are stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Session protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Meaningful exchanges in a Why Finder session
    pub why_total_exchanges: u32,

    /// Meaningful answers that close an Ikigai phase
    pub answers_per_phase: u32,

    /// Shortest answer that counts as meaningful
    pub min_answer_len: usize,

    /// Why-profile items needed to auto-fill a phase
    pub autofill_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let ikigai = IkigaiSettings::default();
        Self {
            why_total_exchanges: WHY_TOTAL_EXCHANGES,
            answers_per_phase: ikigai.answers_per_phase,
            min_answer_len: ikigai.gate.min_len(),
            autofill_threshold: ikigai.autofill_threshold,
        }
    }
}

impl SessionConfig {
    pub fn answer_gate(&self) -> AnswerGate {
        AnswerGate::new(self.min_answer_len)
    }

    pub fn ikigai_settings(&self) -> IkigaiSettings {
        IkigaiSettings {
            answers_per_phase: self.answers_per_phase.max(1),
            autofill_threshold: self.autofill_threshold,
            gate: self.answer_gate(),
        }
    }
}

/// AI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Preferred provider: "auto", "claude" or "ollama"
    pub provider: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Response length cap
    pub max_tokens: u32,

    /// Ollama-specific settings
    pub ollama: OllamaConfig,

    /// Claude-specific settings
    pub claude: ClaudeConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            ollama: OllamaConfig::default(),
            claude: ClaudeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.ikigai.toml` in current directory
    /// 2. `~/.config/ikigai-coach/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::locate() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// The config file [`Config::load`] would read, if any.
    pub fn locate() -> Option<PathBuf> {
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Some(local_config);
        }

        Self::config_dir().map(|d| d.join("config.toml")).filter(|p| p.exists())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the global config file.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let config_dir =
            Self::config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(config_path)
    }

    /// Apply `IKIGAI_DATA_DIR`, `OLLAMA_HOST` and `OLLAMA_MODEL`.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("IKIGAI_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.general.data_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.ai.ollama.base_url = Some(host);
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.ai.ollama.model = Some(model);
        }
    }

    /// Directory holding saved profiles and the session snapshot.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.general.data_dir.clone().or_else(Self::data_dir)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR))
    }

    /// Get the default data directory path.
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.why_total_exchanges, 12);
        assert_eq!(config.session.answers_per_phase, 3);
        assert_eq!(config.session.min_answer_len, 15);
        assert_eq!(config.ai.provider, "auto");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[ai]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [session]
            answers_per_phase = 4

            [ai]
            provider = "ollama"

            [ai.ollama]
            model = "mistral"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.answers_per_phase, 4);
        assert_eq!(config.session.why_total_exchanges, 12);
        assert_eq!(config.ai.provider, "ollama");
        assert_eq!(config.ai.ollama.model.as_deref(), Some("mistral"));
        assert_eq!(config.session.ikigai_settings().answers_per_phase, 4);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\ndata_dir = \"/tmp/ikigai\"\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.storage_dir(), Some(PathBuf::from("/tmp/ikigai")));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("IKIGAI_DATA_DIR", "/tmp/ikigai-env");
        std::env::set_var("OLLAMA_MODEL", "phi3");

        let mut config = Config::default();
        config.apply_env();

        std::env::remove_var("IKIGAI_DATA_DIR");
        std::env::remove_var("OLLAMA_MODEL");

        assert_eq!(config.general.data_dir, Some(PathBuf::from("/tmp/ikigai-env")));
        assert_eq!(config.ai.ollama.model.as_deref(), Some("phi3"));
    }
}
