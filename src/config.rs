use crate::error::CloneError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Configuration for a cloning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClonerConfig {
    /// User-Agent header sent with every resource fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for a single resource fetch, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum number of stylesheet fetches in flight per run
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// URL for the WebDriver instance used by the heavy path
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Whether to ask the browser to run headless
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Timeout for opening a browser session on one WebDriver server, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Navigation timeout for the heavy path, in seconds
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// How long to wait for the document to finish loading, in seconds
    #[serde(default = "default_load_state_timeout_secs")]
    pub load_state_timeout_secs: u64,

    /// Maximum number of browser renders running at once across all runs
    #[serde(default = "default_max_concurrent_renders")]
    pub max_concurrent_renders: usize,

    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_generator_endpoint")]
    pub generator_endpoint: String,

    /// Model name sent to the generator
    #[serde(default = "default_generator_model")]
    pub generator_model: String,

    /// Environment variable holding the generator API key
    #[serde(default = "default_generator_api_key_env")]
    pub generator_api_key_env: String,

    /// Timeout for one generator call, in seconds
    #[serde(default = "default_generator_timeout_secs")]
    pub generator_timeout_secs: u64,

    /// How long artifacts stay retrievable; `None` keeps them forever
    #[serde(default = "default_artifact_ttl_secs")]
    pub artifact_ttl_secs: Option<u64>,

    /// Maximum number of artifacts held in the store
    #[serde(default = "default_max_artifacts")]
    pub max_artifacts: usize,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_fetches() -> usize {
    5
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

fn default_load_state_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_renders() -> usize {
    2
}

fn default_generator_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_generator_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generator_api_key_env() -> String {
    "GENERATOR_API_KEY".to_string()
}

fn default_generator_timeout_secs() -> u64 {
    120
}

fn default_artifact_ttl_secs() -> Option<u64> {
    Some(24 * 60 * 60)
}

fn default_max_artifacts() -> usize {
    1000
}

impl Default for ClonerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            webdriver_url: default_webdriver_url(),
            headless: default_headless(),
            connect_timeout_secs: default_connect_timeout_secs(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            load_state_timeout_secs: default_load_state_timeout_secs(),
            max_concurrent_renders: default_max_concurrent_renders(),
            generator_endpoint: default_generator_endpoint(),
            generator_model: default_generator_model(),
            generator_api_key_env: default_generator_api_key_env(),
            generator_timeout_secs: default_generator_timeout_secs(),
            artifact_ttl_secs: default_artifact_ttl_secs(),
            max_artifacts: default_max_artifacts(),
        }
    }
}

impl ClonerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CloneError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, CloneError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Apply overrides from the environment
    pub fn apply_env(&mut self) {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver_url = webdriver_url;
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn load_state_timeout(&self) -> Duration {
        Duration::from_secs(self.load_state_timeout_secs)
    }

    pub fn artifact_ttl(&self) -> Option<Duration> {
        self.artifact_ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = ClonerConfig::default();
        assert_eq!(config.max_concurrent_fetches, 5);
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.navigation_timeout(), Duration::from_secs(60));
        assert_eq!(config.load_state_timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = ClonerConfig::from_json(
            r#"{"max_concurrent_renders": 1, "artifact_ttl_secs": null, "webdriver_url": "http://127.0.0.1:9515"}"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_renders, 1);
        assert_eq!(config.artifact_ttl(), None);
        assert_eq!(config.webdriver_url, "http://127.0.0.1:9515");
        assert_eq!(config.max_artifacts, 1000);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ClonerConfig::from_json("{not json").unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
