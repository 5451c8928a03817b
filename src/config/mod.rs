//! Configuration module for costlens.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CatalogSettings, ClarificationSettings, LlmSettings, Settings, SettingsError,
    StorageSettings,
};
