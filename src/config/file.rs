//! File-based configuration loading
//!
//! Loads client settings from a JSON file

use super::Settings;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name looked up in the current directory
pub const LOCAL_CONFIG_FILE: &str = "chatgpt-client.json";

impl Settings {
    /// Load configuration from JSON file
    ///
    /// Every field is optional. An empty API key falls back to the
    /// `OPENAI_API_KEY` environment variable.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut settings: Settings =
            serde_json::from_str(&content).with_context(|| "Failed to parse config JSON")?;

        if settings.api.api_key.is_empty() {
            settings.api.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        }

        settings.validate()?;

        debug!(
            base_url = %settings.api.base_url,
            model = %settings.defaults.default_model,
            "Configuration file loaded"
        );
        Ok(settings)
    }

    /// Load configuration from default locations
    /// Searches in order:
    /// 1. ~/.config/chatgpt-client/config.json
    /// 2. ./chatgpt-client.json
    ///
    /// Returns error if no configuration file is found.
    pub fn load_default() -> Result<Self> {
        for path in default_config_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        anyhow::bail!(
            "Configuration file not found. Please create one at:\n\
             - ~/.config/chatgpt-client/config.json (recommended)\n\
             - ./chatgpt-client.json (current directory)\n\
             \n\
             or set OPENAI_API_KEY and related environment variables."
        )
    }
}

/// Candidate configuration file locations, in lookup order
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("chatgpt-client").join("config.json"));
    }
    paths.push(PathBuf::from(LOCAL_CONFIG_FILE));
    paths
}
