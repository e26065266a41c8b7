//! Todo E2E - command-line entry point
//!
//! Runs the YAML scenarios against a live todo endpoint and web page.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use todo_e2e::config::BrowserKind;
use todo_e2e::playwright::PlaywrightPage;
use todo_e2e::runner::{load_scenarios, SuiteReport};
use todo_e2e::{RunnerConfig, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "todo-e2e")]
#[command(author, version, about = "E2E scenario runner for the todo app", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "e2e.toml")]
    config: PathBuf,

    /// Base URL of the todo REST endpoint
    #[arg(long, env = "TODO_E2E_API")]
    api: Option<String>,

    /// Base URL of the web page under test
    #[arg(long, env = "TODO_E2E_APP")]
    app: Option<String>,

    /// Path to scenario directory
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Path to fixture directory
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only the scenario with this exact name
    #[arg(short, long)]
    name: Option<String>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

impl Args {
    fn apply(self, mut config: RunnerConfig) -> RunnerConfig {
        if let Some(api) = self.api {
            config.api_base_url = api;
        }
        if let Some(app) = self.app {
            config.app_base_url = app;
        }
        if let Some(dir) = self.scenarios {
            config.scenarios_dir = dir;
        }
        if let Some(dir) = self.fixtures {
            config.fixtures_dir = dir;
        }
        if let Some(dir) = self.output {
            config.output_dir = dir;
        }
        if let Some(kind) = self.browser {
            config.browser.kind = kind;
        }
        if self.headed {
            config.browser.headless = false;
        }
        config
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(report) => {
            if let Some(aborted) = &report.aborted {
                eprintln!("Error: run aborted: {}", aborted.message);
                std::process::exit(2);
            }
            std::process::exit(if report.success() { 0 } else { 1 });
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<SuiteReport> {
    let config = RunnerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let tag = args.tag.clone();
    let name = args.name.clone();
    let config = args.apply(config);
    config.validate()?;

    let scenarios = load_scenarios(&config.scenarios_dir, tag.as_deref(), name.as_deref())
        .with_context(|| format!("loading scenarios from {}", config.scenarios_dir.display()))?;

    let output_dir = config.output_dir.clone();
    let mut runner = ScenarioRunner::<PlaywrightPage>::launch(config).await?;

    let report = runner.run_suite(&scenarios).await;
    let written = report.write(&output_dir);
    runner.shutdown().await?;
    written?;

    Ok(report)
}
