//! Runner configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};

/// Runner configuration. Every field has a default, so a config file
/// only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base URL of the todo REST endpoint
    pub api_base_url: String,

    /// Base URL of the web page under test
    pub app_base_url: String,

    /// Directory holding scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Directory holding named fixture JSON files
    pub fixtures_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Bound on each `wait_for` network wait
    pub network_timeout_ms: u64,

    /// How long DOM assertions are retried before failing
    pub assertion_timeout_ms: u64,

    /// Bound on each browser command
    pub command_timeout_ms: u64,

    /// Bound on each HTTP request issued by the runner
    pub request_timeout_ms: u64,

    /// Bound on waiting for the endpoint (and spawned server) to come up
    pub startup_timeout_ms: u64,

    pub browser: BrowserConfig,

    /// App-under-test process to spawn, if the runner should own it
    pub server: Option<ServerConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            app_base_url: "http://localhost:8080".to_string(),
            scenarios_dir: PathBuf::from("crates/e2e/scenarios"),
            fixtures_dir: PathBuf::from("crates/e2e/fixtures"),
            output_dir: PathBuf::from("test-results"),
            network_timeout_ms: 5_000,
            assertion_timeout_ms: 4_000,
            command_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
            startup_timeout_ms: 30_000,
            browser: BrowserConfig::default(),
            server: None,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when the
    /// file does not exist. Not validated here: command-line overrides
    /// are applied first, then [`RunnerConfig::validate`].
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        for (key, url) in [("api_base_url", &self.api_base_url), ("app_base_url", &self.app_base_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(E2eError::Config(format!("{} must be an http(s) URL: {}", key, url)));
            }
        }
        if self.network_timeout_ms == 0 {
            return Err(E2eError::Config("network_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn assertion_timeout(&self) -> Duration {
        Duration::from_millis(self.assertion_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = E2eError;

    fn from_str(s: &str) -> E2eResult<Self> {
        match s {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" => Ok(BrowserKind::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub kind: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Command used to run the bridge script
    pub node_binary: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
        }
    }
}

/// App-under-test process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Program to run
    pub command: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory, defaults to the current one
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}
