//! HTTP client for the todo REST endpoint

use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{ApiResponse, NewTodo, Todo, TodoId, TodoUpdate};

/// Path of a single todo; the id is percent-encoded as one segment
pub fn item_path(id: &TodoId) -> String {
    format!("/todos/{}", urlencoding::encode(&id.to_string()))
}

/// Client wrapper for the `/todos` resource
#[derive(Debug, Clone)]
pub struct TodoClient {
    http: reqwest::Client,
    base_url: String,
}

impl TodoClient {
    /// Create a client for the endpoint at `base_url`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "API base URL must be http(s): {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path on the endpoint
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// List all todos
    pub async fn list(&self) -> Result<Vec<Todo>> {
        self.send_json(Method::GET, "/todos", None).await
    }

    /// Create a todo
    pub async fn create(&self, todo: &NewTodo) -> Result<Todo> {
        let body = serde_json::to_value(todo)?;
        self.send_json(Method::POST, "/todos", Some(&body)).await
    }

    /// Update a todo
    pub async fn update(&self, id: &TodoId, update: &TodoUpdate) -> Result<Todo> {
        let body = serde_json::to_value(update)?;
        self.send_json(Method::PUT, &item_path(id), Some(&body)).await
    }

    /// Delete a todo
    pub async fn delete(&self, id: &TodoId) -> Result<()> {
        let path = item_path(id);
        let response = self.request(Method::DELETE, &path, None).await?;
        if !response.is_success() {
            return Err(Error::UnexpectedStatus {
                method: Method::DELETE.to_string(),
                path,
                status: response.status,
                body: response.body.to_string(),
            });
        }
        Ok(())
    }

    /// Send an arbitrary request and capture status and body without
    /// judging the status code.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        debug!("{} {}", method, path);

        let mut builder = self.http.request(method, self.url(path));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let response = self.request(method.clone(), path, body).await?;
        if !response.is_success() {
            return Err(Error::UnexpectedStatus {
                method: method.to_string(),
                path: path.to_string(),
                status: response.status,
                body: response.body.to_string(),
            });
        }
        Ok(serde_json::from_value(response.body)?)
    }

    /// Poll `GET /todos` until the endpoint answers successfully
    pub async fn wait_until_ready(&self, timeout_duration: Duration) -> Result<()> {
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match self.http.get(self.url("/todos")).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    warn!("{} has no /todos route", self.base_url);
                }
                Ok(resp) => {
                    warn!("Readiness check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {} to accept requests...", self.base_url);
                    }
                    if !e.is_connect() {
                        warn!("Readiness check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(Error::NotReady {
            attempts,
            seconds: timeout_duration.as_secs(),
        })
    }
}
