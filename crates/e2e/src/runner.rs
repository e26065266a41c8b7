//! Scenario runner: state reset, action execution, network waits and
//! assertions, one scenario at a time

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use todo_common::{ApiResponse, TodoClient};
use tracing::{debug, error, info};

use crate::config::RunnerConfig;
use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};
use crate::fixture::{expand_text, FixtureSet};
use crate::network::{NetworkLog, RequestMatcher};
use crate::playwright::PlaywrightPage;
use crate::server::ServerHandle;
use crate::spec::{self, Action, Assertion, MatchMode, Scenario, Suite, UiCommand};

const ASSERTION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where a scenario is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    NotStarted,
    Setup,
    Steps,
    Assertions,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
    /// Never started because an earlier setup failure aborted the run
    NotRun,
}

/// Failure detail for the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl From<&E2eError> for Failure {
    fn from(e: &E2eError) -> Self {
        let (expected, actual) = match e {
            E2eError::AssertionFailed { expected, actual, .. } => {
                (Some(expected.clone()), Some(actual.clone()))
            }
            _ => (None, None),
        };
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            expected,
            actual,
        }
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub status: ScenarioStatus,
    /// Phase the scenario ended in; for failures, the phase that failed
    pub phase: ScenarioPhase,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl ScenarioResult {
    fn unstarted(name: &str, status: ScenarioStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            phase: ScenarioPhase::NotStarted,
            duration_ms: 0,
            failure: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_run: usize,
    pub duration_ms: u64,
    /// The setup failure that stopped the run early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<Failure>,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.aborted.is_none()
    }

    /// Name and status of every scenario, for comparing runs
    pub fn outcomes(&self) -> Vec<(String, ScenarioStatus)> {
        self.results
            .iter()
            .map(|r| (r.name.clone(), r.status))
            .collect()
    }

    /// Write the report as `test-results.json` under `output_dir`
    pub fn write(&self, output_dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Per-scenario mutable state
#[derive(Default)]
struct ScenarioState {
    last_response: Option<ApiResponse>,
}

/// Executes scenarios strictly one after another against a shared
/// remote store, resetting it before each
pub struct ScenarioRunner<D: PageDriver> {
    config: RunnerConfig,
    client: TodoClient,
    fixtures: FixtureSet,
    driver: D,
    network: NetworkLog,
    rng: StdRng,
    server: Option<ServerHandle>,
}

impl ScenarioRunner<PlaywrightPage> {
    /// Spawn the app under test if configured, wait for the endpoint and
    /// open a browser page
    pub async fn launch(config: RunnerConfig) -> E2eResult<Self> {
        config.validate()?;

        let client = TodoClient::new(&config.api_base_url, config.request_timeout())?;
        let server = match &config.server {
            Some(server_config) => Some(
                ServerHandle::spawn(server_config, &client, config.startup_timeout()).await?,
            ),
            None => {
                client.wait_until_ready(config.startup_timeout()).await?;
                None
            }
        };

        let fixtures = FixtureSet::load(&config.fixtures_dir)?;
        let page = PlaywrightPage::launch(
            &config.browser,
            &config.app_base_url,
            config.command_timeout(),
            config.startup_timeout(),
        )
        .await?;

        let mut runner = Self::new(config, fixtures, page)?;
        runner.server = server;
        Ok(runner)
    }
}

impl<D: PageDriver> ScenarioRunner<D> {
    pub fn new(config: RunnerConfig, fixtures: FixtureSet, driver: D) -> E2eResult<Self> {
        let client = TodoClient::new(&config.api_base_url, config.request_timeout())?;
        let network = driver.network();
        Ok(Self {
            config,
            client,
            fixtures,
            driver,
            network,
            rng: StdRng::from_entropy(),
            server: None,
        })
    }

    /// Use a fixed seed for generated text
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn client(&self) -> &TodoClient {
        &self.client
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Delete every todo in the remote store and verify it is empty.
    ///
    /// Any failure is a [`E2eError::SetupFailure`].
    pub async fn reset_state(&self) -> E2eResult<()> {
        let todos = self
            .client
            .list()
            .await
            .map_err(|e| E2eError::SetupFailure(format!("listing todos: {}", e)))?;

        for todo in &todos {
            self.client.delete(&todo.id).await.map_err(|e| {
                E2eError::SetupFailure(format!("deleting todo {}: {}", todo.id, e))
            })?;
        }

        let remaining = self
            .client
            .list()
            .await
            .map_err(|e| E2eError::SetupFailure(format!("listing todos: {}", e)))?;
        if !remaining.is_empty() {
            return Err(E2eError::SetupFailure(format!(
                "{} todo(s) remain after reset",
                remaining.len()
            )));
        }

        debug!("Reset removed {} todo(s)", todos.len());
        Ok(())
    }

    /// Run one scenario.
    ///
    /// Failures in steps or assertions are folded into the result. A
    /// setup failure is returned as `Err` so the caller can abort the run.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> E2eResult<ScenarioResult> {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        self.network.clear();
        let mut state = ScenarioState::default();

        self.reset_state().await?;
        for action in &scenario.setup {
            self.execute(action, &mut state).await.map_err(|e| match e {
                E2eError::SetupFailure(_) => e,
                other => E2eError::SetupFailure(format!(
                    "{}: {}: {}",
                    scenario.name,
                    action.describe(),
                    other
                )),
            })?;
        }

        let mut phase = ScenarioPhase::Steps;
        let outcome = self.run_body(scenario, &mut state, &mut phase).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let unawaited = self.network.pending();
        if !unawaited.is_empty() {
            debug!(
                "{} network call(s) not awaited in '{}': {}",
                unawaited.len(),
                scenario.name,
                unawaited.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }

        Ok(match outcome {
            Ok(()) => ScenarioResult {
                name: scenario.name.clone(),
                status: ScenarioStatus::Passed,
                phase: ScenarioPhase::Passed,
                duration_ms,
                failure: None,
            },
            Err(e) => ScenarioResult {
                name: scenario.name.clone(),
                status: ScenarioStatus::Failed,
                phase,
                duration_ms,
                failure: Some(Failure::from(&e)),
            },
        })
    }

    async fn run_body(
        &mut self,
        scenario: &Scenario,
        state: &mut ScenarioState,
        phase: &mut ScenarioPhase,
    ) -> E2eResult<()> {
        for action in &scenario.steps {
            self.execute(action, state).await?;
        }

        *phase = ScenarioPhase::Assertions;
        for assertion in &scenario.assertions {
            self.check(assertion, state).await?;
        }
        Ok(())
    }

    /// Run scenarios in order.
    ///
    /// A setup failure stops the run: the scenario is reported as failed
    /// in its setup phase, every later scenario as not run, and the
    /// failure is kept in [`SuiteReport::aborted`].
    pub async fn run_suite(&mut self, scenarios: &[Scenario]) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();
        let (mut passed, mut failed, mut skipped, mut not_run) = (0, 0, 0, 0);
        let mut aborted = None;

        let focused = scenarios.iter().any(|s| s.only);
        info!("Running {} scenario(s)...", scenarios.len());

        for (index, scenario) in scenarios.iter().enumerate() {
            if scenario.skip || (focused && !scenario.only) {
                skipped += 1;
                info!("- {} (skipped)", scenario.name);
                results.push(ScenarioResult::unstarted(&scenario.name, ScenarioStatus::Skipped));
                continue;
            }

            let scenario_start = Instant::now();
            let result = match self.run_scenario(scenario).await {
                Ok(result) => result,
                Err(e) => {
                    error!("✗ {} - {}", scenario.name, e);
                    error!("Aborting run: setup must succeed for results to mean anything");

                    let failure = Failure::from(&e);
                    failed += 1;
                    results.push(ScenarioResult {
                        name: scenario.name.clone(),
                        status: ScenarioStatus::Failed,
                        phase: ScenarioPhase::Setup,
                        duration_ms: scenario_start.elapsed().as_millis() as u64,
                        failure: Some(failure.clone()),
                    });
                    for rest in &scenarios[index + 1..] {
                        not_run += 1;
                        results.push(ScenarioResult::unstarted(&rest.name, ScenarioStatus::NotRun));
                    }
                    aborted = Some(failure);
                    break;
                }
            };

            if result.passed() {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                let message = result
                    .failure
                    .as_ref()
                    .map(|f| f.message.as_str())
                    .unwrap_or("unknown error");
                error!("✗ {} - {}", result.name, message);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Scenario Results: {} passed, {} failed, {} skipped, {} not run ({} ms)",
            passed, failed, skipped, not_run, duration_ms
        );

        SuiteReport {
            started_at,
            total: scenarios.len(),
            passed,
            failed,
            skipped,
            not_run,
            duration_ms,
            aborted,
            results,
        }
    }

    /// Close the page and stop the app under test
    pub async fn shutdown(mut self) -> E2eResult<()> {
        self.driver.close().await?;
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    async fn execute(&mut self, action: &Action, state: &mut ScenarioState) -> E2eResult<()> {
        debug!("Executing {}", action.describe());

        match action {
            Action::Request { method, path, body, expect_status } => {
                let response = self
                    .client
                    .request((*method).into(), path, body.as_ref())
                    .await?;

                match expect_status {
                    Some(expected) if response.status != *expected => {
                        return Err(E2eError::AssertionFailed {
                            description: format!("status of {} {}", method, path),
                            expected: expected.to_string(),
                            actual: response.status.to_string(),
                        });
                    }
                    None if !response.is_success() => {
                        return Err(todo_common::Error::UnexpectedStatus {
                            method: method.to_string(),
                            path: path.clone(),
                            status: response.status,
                            body: response.body.to_string(),
                        }
                        .into());
                    }
                    _ => {}
                }
                state.last_response = Some(response);
            }
            Action::SeedFixture { fixture } => {
                let records = self.fixtures.get(fixture)?.to_vec();
                for record in &records {
                    self.client.create(record).await?;
                }
                debug!("Seeded {} record(s) from '{}'", records.len(), fixture);
            }
            Action::WaitFor { method, path } => {
                let matcher = RequestMatcher::new(*method, path)?;
                let event = self
                    .network
                    .wait_for(&matcher, self.config.network_timeout())
                    .await?;
                debug!("Observed {}", event);
            }
            Action::Expect { assert } => {
                self.check(assert, state).await?;
            }
            ui => {
                let command = match ui.ui_command() {
                    Some(UiCommand::Type { selector, nth, text }) => UiCommand::Type {
                        selector,
                        nth,
                        text: expand_text(&text, &mut self.rng),
                    },
                    Some(command) => command,
                    None => {
                        return Err(E2eError::SpecParse(format!(
                            "not a UI action: {}",
                            ui.describe()
                        )))
                    }
                };
                self.driver.perform(&command).await?;
            }
        }

        Ok(())
    }

    /// Evaluate an assertion, polling DOM-backed ones until they pass or
    /// the assertion timeout elapses
    async fn check(&mut self, assertion: &Assertion, state: &ScenarioState) -> E2eResult<()> {
        if !assertion.reads_dom() {
            return self.evaluate(assertion, state).await;
        }

        let deadline = Instant::now() + self.config.assertion_timeout();
        loop {
            match self.evaluate(assertion, state).await {
                Err(e @ E2eError::AssertionFailed { .. }) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(e);
                    }
                    tokio::time::sleep(ASSERTION_POLL_INTERVAL.min(deadline - now)).await;
                }
                other => return other,
            }
        }
    }

    async fn evaluate(&mut self, assertion: &Assertion, state: &ScenarioState) -> E2eResult<()> {
        let fail = |expected: String, actual: String| E2eError::AssertionFailed {
            description: assertion.describe(),
            expected,
            actual,
        };

        match assertion {
            Assertion::Count { selector, equals } => {
                let texts = self.driver.query(selector).await?;
                if texts.len() != *equals {
                    return Err(fail(equals.to_string(), texts.len().to_string()));
                }
            }
            Assertion::Text { selector, nth, value, mode } => {
                let texts = self.driver.query(selector).await?;
                let index = nth.unwrap_or(0);
                let actual = texts
                    .get(index)
                    .ok_or_else(|| fail(value.clone(), format!("no element at index {}", index)))?;
                let ok = match mode {
                    MatchMode::Exact => actual.trim() == value,
                    MatchMode::Contains => actual.contains(value.as_str()),
                };
                if !ok {
                    return Err(fail(value.clone(), actual.clone()));
                }
            }
            Assertion::Texts { selector, equals } => {
                let texts = self.driver.query(selector).await?;
                let actual: Vec<&str> = texts.iter().map(|t| t.trim()).collect();
                if actual != *equals {
                    return Err(fail(format!("{:?}", equals), format!("{:?}", actual)));
                }
            }
            Assertion::AbsentText { selector, value } => {
                let texts = self.driver.query(selector).await?;
                if let Some(hit) = texts.iter().find(|t| t.contains(value.as_str())) {
                    return Err(fail(format!("no element containing '{}'", value), hit.clone()));
                }
            }
            Assertion::Exists { selector, present } => {
                let found = !self.driver.query(selector).await?.is_empty();
                if found != *present {
                    let describe = |p: bool| if p { "present" } else { "absent" };
                    return Err(fail(describe(*present).to_string(), describe(found).to_string()));
                }
            }
            Assertion::Response { pointer, value, mode } => {
                let response = state
                    .last_response
                    .as_ref()
                    .ok_or_else(|| fail(value.to_string(), "no request issued".to_string()))?;
                let actual = match pointer.as_deref() {
                    Some(p) if !p.is_empty() => response.body.pointer(p),
                    _ => Some(&response.body),
                }
                .ok_or_else(|| fail(value.to_string(), "nothing at pointer".to_string()))?;

                let ok = match mode {
                    MatchMode::Exact => actual == value,
                    MatchMode::Contains => json_contains(actual, value),
                };
                if !ok {
                    return Err(fail(value.to_string(), actual.to_string()));
                }
            }
            Assertion::RemoteCount { equals } => {
                let count = self.client.list().await?.len();
                if count != *equals {
                    return Err(fail(equals.to_string(), count.to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Containment over JSON: substrings for strings, element membership for
/// arrays, key-wise subset for objects, equality otherwise
pub fn json_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => a.contains(e.as_str()),
        (Value::Array(a), Value::Array(e)) => e
            .iter()
            .all(|item| a.iter().any(|candidate| json_contains(candidate, item))),
        (Value::Array(a), e) => a.iter().any(|candidate| json_contains(candidate, e)),
        (Value::Object(a), Value::Object(e)) => e
            .iter()
            .all(|(k, v)| a.get(k).map(|av| json_contains(av, v)).unwrap_or(false)),
        (a, e) => a == e,
    }
}

/// Load scenarios from a directory, optionally narrowed by tag or by
/// exact name
pub fn load_scenarios(
    dir: &Path,
    tag: Option<&str>,
    name: Option<&str>,
) -> E2eResult<Vec<Scenario>> {
    let mut scenarios: Vec<Scenario> = Suite::load_all(dir)?
        .iter()
        .flat_map(Suite::scenarios)
        .collect();

    if let Some(tag) = tag {
        scenarios = spec::filter_by_tag(scenarios, tag);
    }

    if let Some(name) = name {
        scenarios.retain(|s| s.name == name);
        if scenarios.is_empty() {
            return Err(E2eError::SpecParse(format!("Scenario not found: {}", name)));
        }
    }

    Ok(scenarios)
}
