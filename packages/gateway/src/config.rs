use clap::Args;
use std::time::Duration;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.deepseek.com/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant specialized in writing corporate publicity articles.";

/// Upstream chat-completions settings
#[derive(Debug, Clone, Args)]
pub struct GatewayConfig {
    /// Chat-completions endpoint
    #[arg(long, env = "SCRIBE_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    /// Bearer key for the upstream API
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model requested from the upstream API
    #[arg(long, env = "SCRIBE_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// System message sent with every request
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Seconds to wait for the connection, the response headers, and
    /// each body read
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Key, if one is set and not blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout_secs: 60,
        }
    }
}
