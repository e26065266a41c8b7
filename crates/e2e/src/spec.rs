//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::network::PathPattern;

/// A scenario file: top-level scenarios plus context groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub scenarios: Vec<Scenario>,

    /// Groups of scenarios sharing extra setup
    #[serde(default)]
    pub contexts: Vec<Context>,
}

/// Scenarios sharing setup that runs after the store reset and before
/// each scenario's own setup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub name: String,

    #[serde(default)]
    pub setup: Vec<Action>,

    pub scenarios: Vec<Scenario>,
}

/// One independent test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Focus this scenario; unfocused ones in the same run are skipped
    #[serde(default)]
    pub only: bool,

    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub setup: Vec<Action>,

    #[serde(default)]
    pub steps: Vec<Action>,

    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Case-insensitive comparison against a method name seen on the wire
    pub fn matches(&self, method: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(method)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single step of setup or of the scenario body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Issue an HTTP request against the todo endpoint
    Request {
        method: HttpMethod,
        path: String,
        #[serde(default)]
        body: Option<serde_json::Value>,
        #[serde(default)]
        expect_status: Option<u16>,
    },

    /// POST every record of a named fixture, in file order
    SeedFixture { fixture: String },

    /// Load a page (relative to the app base URL)
    Visit { path: String },

    Click {
        selector: String,
        #[serde(default)]
        nth: Option<usize>,
    },

    /// Type text; `{sentence}` / `{sentence:N}` expand to random words
    Type {
        selector: String,
        #[serde(default)]
        nth: Option<usize>,
        text: String,
    },

    /// Press a key on an element
    Press {
        selector: String,
        #[serde(default)]
        nth: Option<usize>,
        key: String,
    },

    /// Clear an input
    Clear {
        selector: String,
        #[serde(default)]
        nth: Option<usize>,
    },

    /// Block until a matching request made by the page has completed
    WaitFor { method: HttpMethod, path: String },

    /// Inline checkpoint
    Expect { assert: Assertion },
}

/// A browser command derived from a UI action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum UiCommand {
    Visit { path: String },
    Click { selector: String, nth: Option<usize> },
    Type { selector: String, nth: Option<usize>, text: String },
    Press { selector: String, nth: Option<usize>, key: String },
    Clear { selector: String, nth: Option<usize> },
}

impl UiCommand {
    pub fn describe(&self) -> String {
        match self {
            UiCommand::Visit { path } => format!("visit:{}", path),
            UiCommand::Click { selector, nth } => format!("click:{}", element(selector, *nth)),
            UiCommand::Type { selector, nth, .. } => format!("type:{}", element(selector, *nth)),
            UiCommand::Press { selector, nth, key } => {
                format!("press:{}:{}", element(selector, *nth), key)
            }
            UiCommand::Clear { selector, nth } => format!("clear:{}", element(selector, *nth)),
        }
    }
}

fn element(selector: &str, nth: Option<usize>) -> String {
    match nth {
        Some(n) => format!("{}[{}]", selector, n),
        None => selector.to_string(),
    }
}

impl Action {
    /// The browser command for a UI action, with typed text as given
    pub fn ui_command(&self) -> Option<UiCommand> {
        let command = match self.clone() {
            Action::Visit { path } => UiCommand::Visit { path },
            Action::Click { selector, nth } => UiCommand::Click { selector, nth },
            Action::Type { selector, nth, text } => UiCommand::Type { selector, nth, text },
            Action::Press { selector, nth, key } => UiCommand::Press { selector, nth, key },
            Action::Clear { selector, nth } => UiCommand::Clear { selector, nth },
            _ => return None,
        };
        Some(command)
    }

    /// Short label for logs and reports
    pub fn describe(&self) -> String {
        match self {
            Action::Request { method, path, .. } => format!("request:{} {}", method, path),
            Action::SeedFixture { fixture } => format!("seed:{}", fixture),
            Action::WaitFor { method, path } => format!("wait_for:{} {}", method, path),
            Action::Expect { assert } => format!("expect:{}", assert.describe()),
            ui => ui
                .ui_command()
                .map(|c| c.describe())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
}

/// A predicate over observable state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Assertion {
    /// Number of elements matching the selector
    Count { selector: String, equals: usize },

    /// Text of one element
    Text {
        selector: String,
        #[serde(default)]
        nth: Option<usize>,
        value: String,
        #[serde(default)]
        mode: MatchMode,
    },

    /// Text of every match, in document order
    Texts { selector: String, equals: Vec<String> },

    /// No match contains the value
    AbsentText { selector: String, value: String },

    /// Presence or absence of at least one match
    Exists {
        selector: String,
        #[serde(default = "default_present")]
        present: bool,
    },

    /// Body of the last `request` response, optionally at a JSON pointer
    Response {
        #[serde(default)]
        pointer: Option<String>,
        value: serde_json::Value,
        #[serde(default)]
        mode: MatchMode,
    },

    /// Number of todos in the remote store
    RemoteCount { equals: usize },
}

fn default_present() -> bool {
    true
}

impl Assertion {
    /// Whether the assertion reads the page (and so is worth retrying)
    pub fn reads_dom(&self) -> bool {
        !matches!(self, Assertion::Response { .. } | Assertion::RemoteCount { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Assertion::Count { selector, equals } => format!("count of '{}' == {}", selector, equals),
            Assertion::Text { selector, nth, mode, value } => {
                let op = match mode {
                    MatchMode::Exact => "==",
                    MatchMode::Contains => "contains",
                };
                format!("text of '{}' {} '{}'", element(selector, *nth), op, value)
            }
            Assertion::Texts { selector, .. } => format!("texts of '{}'", selector),
            Assertion::AbsentText { selector, value } => {
                format!("no '{}' contains '{}'", selector, value)
            }
            Assertion::Exists { selector, present } => {
                if *present {
                    format!("'{}' is present", selector)
                } else {
                    format!("'{}' is absent", selector)
                }
            }
            Assertion::Response { pointer, .. } => {
                format!("response body at '{}'", pointer.as_deref().unwrap_or(""))
            }
            Assertion::RemoteCount { equals } => format!("remote todo count == {}", equals),
        }
    }
}

impl Suite {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::SpecParse(msg) => E2eError::SpecParse(format!("{}: {}", path.display(), msg)),
            E2eError::Yaml(err) => E2eError::SpecParse(format!("{}: {}", path.display(), err)),
            other => other,
        })
    }

    /// Load all suites from a directory, in file name order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::SpecParse(format!(
                "scenario directory not found: {}",
                dir.display()
            )));
        }

        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Flatten contexts into standalone scenarios, preserving file order:
    /// top-level scenarios first, then each context's.
    pub fn scenarios(&self) -> Vec<Scenario> {
        let mut out = self.scenarios.clone();
        for context in &self.contexts {
            for scenario in &context.scenarios {
                let mut setup = context.setup.clone();
                setup.extend(scenario.setup.iter().cloned());
                out.push(Scenario {
                    name: format!("{} > {}", context.name, scenario.name),
                    setup,
                    ..scenario.clone()
                });
            }
        }
        out
    }

    fn validate(&self) -> E2eResult<()> {
        let mut seen = HashSet::new();
        for scenario in self.scenarios() {
            if scenario.name.trim().is_empty() {
                return Err(E2eError::SpecParse(format!("unnamed scenario in '{}'", self.name)));
            }
            if !seen.insert(scenario.name.clone()) {
                return Err(E2eError::SpecParse(format!(
                    "duplicate scenario name: {}",
                    scenario.name
                )));
            }
            for action in scenario.setup.iter().chain(&scenario.steps) {
                if let Action::WaitFor { path, .. } = action {
                    PathPattern::new(path)?;
                }
            }
        }
        Ok(())
    }
}

/// Filter scenarios by tag
pub fn filter_by_tag(scenarios: Vec<Scenario>, tag: &str) -> Vec<Scenario> {
    scenarios
        .into_iter()
        .filter(|s| s.tags.iter().any(|t| t == tag))
        .collect()
}
