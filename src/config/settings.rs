//! TOML-based configuration for costlens.
//!
//! Supports a config file (`costlens.toml`) with environment variable
//! expansion in paths and secrets.
//!
//! Example configuration:
//! ```toml
//! [catalog]
//! mode = "introspected"
//! cache_enabled = true
//! low_cardinality = 50
//!
//! [llm]
//! enabled = true
//! base_url = "http://localhost:11434/v1"
//! model = "llama3.2"
//! api_key = "${OPENAI_API_KEY}"
//! timeout_secs = 30
//!
//! [clarification]
//! enabled = true
//! max_region_options = 15
//!
//! [storage]
//! database = "${HOME}/billing/cloud_cost.db"
//! row_limit = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{CatalogMode, ClassifyOptions};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub catalog: CatalogSettings,
    pub llm: LlmSettings,
    pub clarification: ClarificationSettings,
    pub storage: StorageSettings,
}

/// How the metadata catalog is built.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CatalogSettings {
    pub mode: CatalogMode,

    /// Saved catalog document to load instead of the built-in one.
    pub document: Option<String>,

    /// Cache introspected catalogs keyed by schema hash.
    pub cache_enabled: bool,

    /// Distinct sample values kept per column.
    pub sample_size: usize,

    /// String columns with fewer distinct values are groupable.
    pub low_cardinality: u64,

    /// Columns with more distinct values are filter-only.
    pub high_cardinality: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        let classify = ClassifyOptions::default();
        Self {
            mode: CatalogMode::Predefined,
            document: None,
            cache_enabled: true,
            sample_size: classify.sample_size,
            low_cardinality: classify.low_cardinality,
            high_cardinality: classify.high_cardinality,
        }
    }
}

impl CatalogSettings {
    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            sample_size: self.sample_size,
            low_cardinality: self.low_cardinality,
            high_cardinality: self.high_cardinality,
        }
    }

    pub fn resolved_document(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.document
            .as_deref()
            .map(|d| expand_env_vars(d).map(PathBuf::from))
            .transpose()
    }
}

/// Language model endpoint. Disabled by default; the rule-based generator
/// is always available.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub enabled: bool,

    /// OpenAI-compatible API root, without `/chat/completions`.
    pub base_url: String,

    pub model: String,

    /// Supports `${ENV_VAR}` expansion. A missing variable means no key.
    pub api_key: Option<String>,

    pub timeout_secs: u64,

    pub temperature: f32,

    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.2".to_string(),
            api_key: Some("${OPENAI_API_KEY}".to_string()),
            timeout_secs: 30,
            temperature: 0.1,
            max_tokens: 500,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The API key with variables expanded, or `None` if unset or empty.
    pub fn resolved_api_key(&self) -> Option<String> {
        let raw = self.api_key.as_deref()?;
        match expand_env_vars(raw) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "no API key configured");
                None
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.enabled && self.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "llm.base_url must be set when llm.enabled = true".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(SettingsError::InvalidConfig(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Clarification behaviour.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClarificationSettings {
    /// When false, questions go straight to generation.
    pub enabled: bool,

    /// Cap on region options offered to the user.
    pub max_region_options: usize,
}

impl Default for ClarificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_region_options: 15,
        }
    }
}

/// Billing database.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database path (supports `${ENV_VAR}` expansion).
    pub database: String,

    /// Maximum rows returned by one query.
    pub row_limit: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: "cloud_cost.db".to_string(),
            row_limit: 1000,
        }
    }
}

impl StorageSettings {
    pub fn resolved_database(&self) -> Result<PathBuf, SettingsError> {
        expand_env_vars(&self.database).map(PathBuf::from)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.llm.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `COSTLENS_CONFIG`
    /// 2. `./costlens.toml`
    /// 3. `<config_dir>/costlens/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("COSTLENS_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("costlens.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("costlens").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A lone `$` is kept.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            if name.is_empty() {
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
