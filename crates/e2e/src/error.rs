//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// Resetting or seeding the remote store failed. Fatal for the run.
    #[error("Setup failed: {0}")]
    SetupFailure(String),

    /// An awaited network call never happened.
    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Assertion failed: {description} (expected {expected}, got {actual})")]
    AssertionFailed {
        description: String,
        expected: String,
        actual: String,
    },

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Fixture not found: {0}")]
    FixtureNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(#[from] todo_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl E2eError {
    /// Short machine-readable name used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            E2eError::SetupFailure(_) => "setup_failure",
            E2eError::Timeout(_) => "timeout",
            E2eError::AssertionFailed { .. } => "assertion_failed",
            E2eError::ServerStartup(_) => "server_startup",
            E2eError::PlaywrightNotFound | E2eError::Driver(_) => "driver",
            E2eError::SpecParse(_) | E2eError::Yaml(_) => "spec_parse",
            E2eError::FixtureNotFound(_) => "fixture_not_found",
            E2eError::Config(_) | E2eError::Toml(_) | E2eError::Pattern(_) => "config",
            E2eError::Api(_) => "api",
            E2eError::Io(_) | E2eError::Json(_) => "io",
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
