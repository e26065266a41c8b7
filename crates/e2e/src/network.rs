//! Intercepted network traffic and waiting on it
//!
//! The page driver records every request the page completes. A wait
//! consumes the oldest unconsumed event that matches, so a response that
//! lands before the wait is issued is still observed, and consecutive
//! waits for the same route need distinct calls.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::spec::HttpMethod;

/// A request observed by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub method: String,
    pub url: String,
    /// Response status; absent when the request failed outright
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub failure: Option<String>,
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.failure) {
            (Some(status), _) => write!(f, "{} {} -> {}", self.method, self.url, status),
            (None, Some(failure)) => write!(f, "{} {} failed: {}", self.method, self.url, failure),
            (None, None) => write!(f, "{} {}", self.method, self.url),
        }
    }
}

/// Glob over a URL path.
///
/// `*` matches within one segment and `**` across segments. A pattern
/// starting with `http` is matched against the full URL instead of the
/// path. Query strings never take part.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    full_url: bool,
    regex: Regex,
}

impl PathPattern {
    pub fn new(pattern: &str) -> E2eResult<Self> {
        let mut expr = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '*' {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    expr.push_str(".*");
                } else {
                    expr.push_str("[^/]*");
                }
            } else {
                expr.push_str(&regex::escape(&c.to_string()));
            }
        }
        expr.push('$');

        Ok(Self {
            source: pattern.to_string(),
            full_url: pattern.starts_with("http://") || pattern.starts_with("https://"),
            regex: Regex::new(&expr)?,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        if self.full_url {
            self.regex.is_match(without_query)
        } else {
            self.regex.is_match(url_path(without_query))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Path component of an absolute URL; relative input is returned as is
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "/",
            }
        }
        None => url,
    }
}

/// Method plus path pattern identifying an awaited call
#[derive(Debug, Clone)]
pub struct RequestMatcher {
    pub method: HttpMethod,
    pub pattern: PathPattern,
}

impl RequestMatcher {
    pub fn new(method: HttpMethod, path: &str) -> E2eResult<Self> {
        Ok(Self {
            method,
            pattern: PathPattern::new(path)?,
        })
    }

    pub fn matches(&self, event: &NetworkEvent) -> bool {
        self.method.matches(&event.method) && self.pattern.matches(&event.url)
    }
}

impl fmt::Display for RequestMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern.as_str())
    }
}

#[derive(Default)]
struct LogState {
    pending: VecDeque<NetworkEvent>,
}

#[derive(Default)]
struct LogInner {
    state: Mutex<LogState>,
    notify: Notify,
}

/// Shared buffer of intercepted events. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct NetworkLog {
    inner: Arc<LogInner>,
}

impl NetworkLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request and wake any waiter
    pub fn record(&self, event: NetworkEvent) {
        debug!("network: {}", event);
        self.inner.state.lock().pending.push_back(event);
        self.inner.notify.notify_waiters();
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        self.inner.state.lock().pending.clear();
    }

    /// Events not yet consumed by a wait
    pub fn pending(&self) -> Vec<NetworkEvent> {
        self.inner.state.lock().pending.iter().cloned().collect()
    }

    fn take_match(&self, matcher: &RequestMatcher) -> Option<NetworkEvent> {
        let mut state = self.inner.state.lock();
        let index = state.pending.iter().position(|e| matcher.matches(e))?;
        state.pending.remove(index)
    }

    /// Wait for the oldest unconsumed event matching `matcher`.
    ///
    /// Fails with [`E2eError::Timeout`] naming the call if none arrives
    /// within `timeout`.
    pub async fn wait_for(
        &self,
        matcher: &RequestMatcher,
        timeout: Duration,
    ) -> E2eResult<NetworkEvent> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a record() in between is not lost.
            notified.as_mut().enable();

            if let Some(event) = self.take_match(matcher) {
                return Ok(event);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(E2eError::Timeout(matcher.to_string()));
            }
        }
    }
}
