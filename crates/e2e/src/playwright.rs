//! Playwright browser automation
//!
//! A single long-lived `node` process runs [`BRIDGE_SCRIPT`], which owns
//! one browser page. Commands go in on stdin and replies come back on
//! stdout as newline-delimited JSON. The bridge also reports every
//! finished or failed request as an unsolicited `network` message; those
//! are fed straight into the [`NetworkLog`].

use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};
use crate::network::{NetworkEvent, NetworkLog};
use crate::spec::UiCommand;

/// Node script driving the page
pub const BRIDGE_SCRIPT: &str = r#"
const playwright = require('playwright');
const readline = require('readline');

const emit = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const browserType = playwright[process.env.TODO_E2E_BROWSER || 'chromium'];
  const browser = await browserType.launch({ headless: process.env.TODO_E2E_HEADLESS !== '0' });
  const context = await browser.newContext({
    baseURL: process.env.TODO_E2E_BASE_URL,
    viewport: {
      width: parseInt(process.env.TODO_E2E_VIEWPORT_WIDTH || '1280', 10),
      height: parseInt(process.env.TODO_E2E_VIEWPORT_HEIGHT || '720', 10),
    },
  });
  const page = await context.newPage();

  page.on('requestfinished', async (req) => {
    const res = await req.response();
    emit({ type: 'network', method: req.method(), url: req.url(), status: res ? res.status() : null });
  });
  page.on('requestfailed', (req) => {
    const failure = req.failure();
    emit({ type: 'network', method: req.method(), url: req.url(), status: null,
           failure: failure ? failure.errorText : 'failed' });
  });

  const locate = (selector, nth) => {
    const all = page.locator(selector);
    return nth === null || nth === undefined ? all : all.nth(nth);
  };

  const perform = async (c) => {
    switch (c.cmd) {
      case 'visit': await page.goto(c.path, { waitUntil: 'load' }); break;
      case 'click': await locate(c.selector, c.nth).click(); break;
      case 'type': {
        const target = locate(c.selector, c.nth);
        if (target.pressSequentially) { await target.pressSequentially(c.text); }
        else { await target.type(c.text); }
        break;
      }
      case 'press': await locate(c.selector, c.nth).press(c.key); break;
      case 'clear': await locate(c.selector, c.nth).clear(); break;
      default: throw new Error('unknown command: ' + c.cmd);
    }
  };

  emit({ type: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const req = JSON.parse(line);
    try {
      if (req.op === 'perform') {
        await perform(req.command);
        emit({ type: 'reply', id: req.id, ok: true });
      } else if (req.op === 'query') {
        const texts = await page.locator(req.selector).allTextContents();
        emit({ type: 'reply', id: req.id, ok: true, texts: texts.map((t) => t.trim()) });
      } else if (req.op === 'close') {
        emit({ type: 'reply', id: req.id, ok: true });
        break;
      }
    } catch (error) {
      emit({ type: 'reply', id: req.id, ok: false, error: error.message });
    }
  }

  await browser.close();
})().catch((error) => {
  emit({ type: 'fatal', error: error.message });
  process.exit(1);
});
"#;

/// Request sent to the bridge
#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    #[serde(flatten)]
    op: BridgeOp<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeOp<'a> {
    Perform { command: &'a UiCommand },
    Query { selector: &'a str },
    Close,
}

/// Message emitted by the bridge
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    Ready,
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        texts: Option<Vec<String>>,
        #[serde(default)]
        error: Option<String>,
    },
    Network(NetworkEvent),
    Fatal { error: String },
}

/// Parse one line of bridge output; anything that is not a bridge
/// message (stray `console.log` output) yields `None`.
pub fn parse_line(line: &str) -> Option<BridgeMessage> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Playwright-backed page
pub struct PlaywrightPage {
    child: Child,
    stdin: ChildStdin,
    replies: mpsc::UnboundedReceiver<BridgeMessage>,
    network: NetworkLog,
    next_id: u64,
    command_timeout: Duration,
    // Holds the bridge script on disk for the life of the process.
    _script_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    /// Launch the bridge and wait until the browser page is open
    pub async fn launch(
        config: &BrowserConfig,
        base_url: &str,
        command_timeout: Duration,
        startup_timeout: Duration,
    ) -> E2eResult<Self> {
        Self::check_playwright_installed(config)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        info!(
            "Launching {} ({}) against {}",
            config.kind.as_str(),
            if config.headless { "headless" } else { "headed" },
            base_url
        );

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .env("TODO_E2E_BROWSER", config.kind.as_str())
            .env("TODO_E2E_HEADLESS", if config.headless { "1" } else { "0" })
            .env("TODO_E2E_BASE_URL", base_url)
            .env("TODO_E2E_VIEWPORT_WIDTH", config.viewport_width.to_string())
            .env("TODO_E2E_VIEWPORT_HEIGHT", config.viewport_height.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Driver(format!(
                    "failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[bridge] {}", line);
                }
            });
        }

        let network = NetworkLog::new();
        let (tx, replies) = mpsc::unbounded_channel();
        let recorder = network.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_line(&line) {
                    Some(BridgeMessage::Network(event)) => recorder.record(event),
                    Some(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    None => debug!("[bridge stdout] {}", line),
                }
            }
        });

        let mut page = Self {
            child,
            stdin,
            replies,
            network,
            next_id: 0,
            command_timeout,
            _script_dir: script_dir,
        };

        match timeout(startup_timeout, page.replies.recv()).await {
            Ok(Some(BridgeMessage::Ready)) => Ok(page),
            Ok(Some(BridgeMessage::Fatal { error })) => Err(E2eError::Driver(error)),
            Ok(Some(other)) => Err(E2eError::Driver(format!(
                "unexpected bridge message before ready: {:?}",
                other
            ))),
            Ok(None) => Err(E2eError::Driver("bridge exited during startup".to_string())),
            Err(_) => Err(E2eError::Driver(format!(
                "browser not ready after {}ms",
                startup_timeout.as_millis()
            ))),
        }
    }

    /// Check if Playwright is installed
    fn check_playwright_installed(config: &BrowserConfig) -> E2eResult<()> {
        let status = Command::new(&config.node_binary)
            .args(["-e", "require.resolve('playwright')"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn call(&mut self, op: BridgeOp<'_>, label: &str) -> E2eResult<Option<Vec<String>>> {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&BridgeRequest { id, op })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let deadline = tokio::time::Instant::now() + self.command_timeout;
        loop {
            let message = tokio::time::timeout_at(deadline, self.replies.recv())
                .await
                .map_err(|_| {
                    E2eError::Driver(format!(
                        "{} timed out after {}ms",
                        label,
                        self.command_timeout.as_millis()
                    ))
                })?;

            match message {
                Some(BridgeMessage::Reply { id: reply_id, ok, texts, error }) if reply_id == id => {
                    return if ok {
                        Ok(texts)
                    } else {
                        Err(E2eError::Driver(format!(
                            "{}: {}",
                            label,
                            error.unwrap_or_else(|| "unknown error".to_string())
                        )))
                    };
                }
                Some(BridgeMessage::Fatal { error }) => return Err(E2eError::Driver(error)),
                Some(stale) => debug!("Ignoring bridge message {:?}", stale),
                None => return Err(E2eError::Driver("bridge exited".to_string())),
            }
        }
    }
}

#[async_trait]
impl PageDriver for PlaywrightPage {
    async fn perform(&mut self, command: &UiCommand) -> E2eResult<()> {
        let label = command.describe();
        debug!("Executing {}", label);
        self.call(BridgeOp::Perform { command }, &label).await?;
        Ok(())
    }

    async fn query(&mut self, selector: &str) -> E2eResult<Vec<String>> {
        let label = format!("query:{}", selector);
        Ok(self
            .call(BridgeOp::Query { selector }, &label)
            .await?
            .unwrap_or_default())
    }

    fn network(&self) -> NetworkLog {
        self.network.clone()
    }

    async fn close(&mut self) -> E2eResult<()> {
        if let Err(e) = self.call(BridgeOp::Close, "close").await {
            warn!("Bridge did not close cleanly: {}", e);
        }
        let _ = timeout(Duration::from_secs(5), self.child.wait()).await;
        let _ = self.child.kill().await;
        Ok(())
    }
}
