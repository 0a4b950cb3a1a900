use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_NAME: &str = "scribe.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeConfig {
    /// Characters of context sent on each side of a rewritten span
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// How long the rewrite affordance survives a blur
    #[serde(default = "default_blur_grace_ms")]
    pub blur_grace_ms: u64,

    /// Vertical gap between the selection and the affordance
    #[serde(default = "default_affordance_offset")]
    pub affordance_offset: f32,

    /// Literal substrings that mark a failed stream
    #[serde(default = "default_error_sentinels")]
    pub error_sentinels: Vec<String>,

    /// Also scan the accumulated text, catching sentinels split across chunks
    #[serde(default = "default_true")]
    pub scan_accumulated: bool,

    /// Re-render completed generations that arrived as markup
    #[serde(default = "default_true")]
    pub render_markup_on_complete: bool,
}

fn default_context_window() -> usize {
    500
}

fn default_blur_grace_ms() -> u64 {
    200
}

fn default_affordance_offset() -> f32 {
    40.0
}

fn default_error_sentinels() -> Vec<String> {
    vec![
        "[API Error".to_string(),
        "[Network Error".to_string(),
        "[Config Error".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

impl ComposeConfig {
    /// Load config from a directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn blur_grace(&self) -> Duration {
        Duration::from_millis(self.blur_grace_ms)
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            blur_grace_ms: default_blur_grace_ms(),
            affordance_offset: default_affordance_offset(),
            error_sentinels: default_error_sentinels(),
            scan_accumulated: true,
            render_markup_on_complete: true,
        }
    }
}
