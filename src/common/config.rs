//! Configuration file handling

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Engine connection settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Debug session settings
    #[serde(default)]
    pub debug: DebugConfig,

    /// Editor buffer persistence settings
    #[serde(default)]
    pub editor: EditorConfig,
}

/// Engine connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Base URL of the execution engine
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

/// Timeout settings in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Hard limit for one-shot runs
    #[serde(default = "default_run")]
    pub run_ms: u64,

    /// Limit for REPL and debug requests
    #[serde(default = "default_request")]
    pub request_ms: u64,

    /// TCP connect timeout
    #[serde(default = "default_connect")]
    pub connect_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            run_ms: default_run(),
            request_ms: default_request(),
            connect_ms: default_connect(),
        }
    }
}

fn default_run() -> u64 {
    15_000
}
fn default_request() -> u64 {
    8_000
}
fn default_connect() -> u64 {
    3_000
}

impl Timeouts {
    pub fn run(&self) -> Duration {
        Duration::from_millis(self.run_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

/// Debug session configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Interval between background state polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1_500
}

impl DebugConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Editor buffer persistence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EditorConfig {
    /// Quiet period before a changed buffer is written
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Where the buffer is stored (defaults to the platform data dir)
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
            storage_dir: None,
        }
    }
}

fn default_debounce() -> u64 {
    300
}

impl EditorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| super::Error::file_read(&path, &e))?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Override the engine URL (from the command line)
    pub fn with_engine_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.engine.base_url = url;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.timeouts.run(), Duration::from_secs(15));
        assert_eq!(config.timeouts.request(), Duration::from_secs(8));
        assert_eq!(config.debug.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.editor.debounce(), Duration::from_millis(300));
        assert!(config.editor.storage_dir.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [engine]
            base_url = "http://engine.local:8080"

            [debug]
            poll_interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.base_url, "http://engine.local:8080");
        assert_eq!(config.debug.poll_interval_ms, 250);
        assert_eq!(config.timeouts.run_ms, 15_000);
        assert_eq!(config.editor.debounce_ms, 300);
    }

    #[test]
    fn test_invalid_file() {
        let err = Config::parse("[timeouts]\nrun_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));
    }

    #[test]
    fn test_engine_override() {
        let config = Config::default().with_engine_url(Some("http://10.0.0.2:5000".into()));
        assert_eq!(config.engine.base_url, "http://10.0.0.2:5000");
        let config = config.with_engine_url(None);
        assert_eq!(config.engine.base_url, "http://10.0.0.2:5000");
    }
}
