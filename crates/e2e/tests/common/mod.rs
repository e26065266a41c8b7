//! Shared helpers: an in-process page that behaves like the todo UI,
//! backed by the stub endpoint.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use todo_common::stub::StubServer;
use todo_common::{item_path, NewTodo, Todo, TodoClient, TodoId, TodoUpdate};

use todo_e2e::fixture::FixtureSet;
use todo_e2e::spec::{Scenario, Suite, UiCommand};
use todo_e2e::{E2eError, E2eResult, NetworkEvent, NetworkLog, PageDriver, RunnerConfig, ScenarioRunner};

#[derive(Default)]
struct PageState {
    items: Vec<Todo>,
    input: String,
    editing: Option<(usize, String)>,
}

enum Write {
    Create(String),
    Delete(TodoId),
    Update(TodoId, String),
}

/// Renders `.todos li` from the endpoint and issues the same calls the
/// real page does. With a latency set, writes complete in the
/// background like an async UI: the list changes first, then the
/// request is reported as finished.
pub struct SimulatedPage {
    client: TodoClient,
    network: NetworkLog,
    state: Arc<Mutex<PageState>>,
    latency: Option<Duration>,
}

impl SimulatedPage {
    pub fn new(server: &StubServer) -> Self {
        Self {
            client: TodoClient::new(&server.base_url(), Duration::from_secs(5)).unwrap(),
            network: NetworkLog::new(),
            state: Arc::new(Mutex::new(PageState::default())),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn unknown(selector: &str, what: &str) -> E2eError {
        E2eError::Driver(format!("cannot {} '{}' on the todo page", what, selector))
    }

    fn item_id(&self, nth: Option<usize>) -> E2eResult<(usize, TodoId)> {
        let index = nth.unwrap_or(0);
        let state = self.state.lock();
        state
            .items
            .get(index)
            .map(|t| (index, t.id.clone()))
            .ok_or_else(|| E2eError::Driver(format!("no todo at index {}", index)))
    }

    async fn commit(&self, write: Write) {
        let client = self.client.clone();
        let state = self.state.clone();
        let network = self.network.clone();
        let latency = self.latency;

        let task = async move {
            if let Some(delay) = latency {
                tokio::time::sleep(delay).await;
            }
            let event = apply(&client, &state, write).await;
            network.record(event);
        };

        if latency.is_some() {
            tokio::spawn(task);
        } else {
            task.await;
        }
    }
}

async fn apply(client: &TodoClient, state: &Mutex<PageState>, write: Write) -> NetworkEvent {
    let (method, path, result) = match write {
        Write::Create(content) => {
            let result = client.create(&NewTodo::new(content)).await.map(|todo| {
                state.lock().items.push(todo);
                201
            });
            ("POST", "/todos".to_string(), result)
        }
        Write::Delete(id) => {
            let result = client.delete(&id).await.map(|_| {
                state.lock().items.retain(|t| t.id != id);
                200
            });
            ("DELETE", item_path(&id), result)
        }
        Write::Update(id, content) => {
            let result = client
                .update(&id, &TodoUpdate::content(content))
                .await
                .map(|updated| {
                    let mut state = state.lock();
                    if let Some(item) = state.items.iter_mut().find(|t| t.id == id) {
                        *item = updated;
                    }
                    200
                });
            ("PUT", item_path(&id), result)
        }
    };

    let (status, failure) = match result {
        Ok(status) => (Some(status), None),
        Err(e) => (e.status(), Some(e.to_string())),
    };
    NetworkEvent {
        method: method.to_string(),
        url: client.url(&path),
        status,
        failure,
    }
}

#[async_trait]
impl PageDriver for SimulatedPage {
    async fn perform(&mut self, command: &UiCommand) -> E2eResult<()> {
        match command {
            UiCommand::Visit { .. } => {
                let items = self.client.list().await?;
                self.state.lock().items = items;
                self.network.record(NetworkEvent {
                    method: "GET".to_string(),
                    url: self.client.url("/todos"),
                    status: Some(200),
                    failure: None,
                });
            }
            UiCommand::Type { selector, text, .. } => {
                let mut state = self.state.lock();
                match selector.as_str() {
                    "form input" => state.input.push_str(text),
                    "input[name=update]" => match state.editing.as_mut() {
                        Some((_, buffer)) => buffer.push_str(text),
                        None => return Err(Self::unknown(selector, "type into")),
                    },
                    _ => return Err(Self::unknown(selector, "type into")),
                }
            }
            UiCommand::Clear { selector, .. } => {
                let mut state = self.state.lock();
                match selector.as_str() {
                    "form input" => state.input.clear(),
                    "input[name=update]" => match state.editing.as_mut() {
                        Some((_, buffer)) => buffer.clear(),
                        None => return Err(Self::unknown(selector, "clear")),
                    },
                    _ => return Err(Self::unknown(selector, "clear")),
                }
            }
            UiCommand::Press { selector, key, .. } => {
                if selector != "form input" || key != "Enter" {
                    return Err(Self::unknown(selector, "press keys on"));
                }
                let content = std::mem::take(&mut self.state.lock().input);
                if !content.is_empty() {
                    self.commit(Write::Create(content)).await;
                }
            }
            UiCommand::Click { selector, nth } => match selector.as_str() {
                "button.destroy" => {
                    let (_, id) = self.item_id(*nth)?;
                    self.commit(Write::Delete(id)).await;
                }
                ".edit-btn" => {
                    let (index, _) = self.item_id(*nth)?;
                    let mut state = self.state.lock();
                    let content = state.items[index].content.clone();
                    state.editing = Some((index, content));
                }
                "button.save" => {
                    let editing = self.state.lock().editing.take();
                    let (index, content) =
                        editing.ok_or_else(|| Self::unknown(selector, "click"))?;
                    let (_, id) = self.item_id(Some(index))?;
                    self.commit(Write::Update(id, content)).await;
                }
                _ => return Err(Self::unknown(selector, "click")),
            },
        }
        Ok(())
    }

    async fn query(&mut self, selector: &str) -> E2eResult<Vec<String>> {
        let state = self.state.lock();
        Ok(match selector {
            ".todos li" => state.items.iter().map(|t| t.content.clone()).collect(),
            "button.destroy" | ".edit-btn" => state.items.iter().map(|_| String::new()).collect(),
            "form input" => vec![state.input.clone()],
            "input[name=update]" => state.editing.iter().map(|(_, b)| b.clone()).collect(),
            _ => Vec::new(),
        })
    }

    fn network(&self) -> NetworkLog {
        self.network.clone()
    }

    async fn close(&mut self) -> E2eResult<()> {
        Ok(())
    }
}

pub fn crate_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn fixtures() -> FixtureSet {
    FixtureSet::load(&crate_dir().join("fixtures")).unwrap()
}

pub fn fixture_contents() -> Vec<String> {
    fixtures()
        .get("todos")
        .unwrap()
        .iter()
        .map(|t| t.content.clone())
        .collect()
}

/// Config pointing at the stub, with short timeouts
pub fn config_for(server: &StubServer) -> RunnerConfig {
    RunnerConfig {
        api_base_url: server.base_url(),
        app_base_url: server.base_url(),
        network_timeout_ms: 300,
        assertion_timeout_ms: 200,
        request_timeout_ms: 5_000,
        ..RunnerConfig::default()
    }
}

pub fn runner(server: &StubServer, page: SimulatedPage) -> ScenarioRunner<SimulatedPage> {
    ScenarioRunner::new(config_for(server), fixtures(), page)
        .unwrap()
        .with_seed(42)
}

pub fn runner_with(
    config: RunnerConfig,
    page: SimulatedPage,
) -> ScenarioRunner<SimulatedPage> {
    ScenarioRunner::new(config, fixtures(), page).unwrap().with_seed(42)
}

/// Parse a suite and flatten it
pub fn scenarios(yaml: &str) -> Vec<Scenario> {
    Suite::from_yaml(yaml).unwrap().scenarios()
}

pub fn scenario(yaml: &str) -> Scenario {
    scenarios(yaml).remove(0)
}
