//! Todo E2E Scenario Runner
//!
//! This crate provides a Rust-controlled end-to-end runner for the todo
//! web application that:
//! - Resets the remote todo store before every scenario
//! - Drives a browser page through Playwright over a JSON-lines bridge
//! - Parses declarative YAML scenarios and named JSON fixtures
//! - Waits for intercepted network calls before asserting on the page
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Scenario Runner (Rust)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner<D: PageDriver>                              │
//! │    ├── reset_state()          GET /todos + DELETE each      │
//! │    ├── run_scenario(s) -> ScenarioResult                    │
//! │    │     setup -> steps -> assertions                       │
//! │    └── run_suite(&[Scenario]) -> SuiteReport                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── setup / steps: [Action]                              │
//! │    │     ├── request { method, path, body? }                │
//! │    │     ├── seed_fixture { fixture }                       │
//! │    │     ├── visit | click | type | press | clear           │
//! │    │     ├── wait_for { method, path }                      │
//! │    │     └── expect { assert }                              │
//! │    └── assertions: [Assertion]                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver ── PlaywrightPage (node bridge)                 │
//! │       └── NetworkLog: recorded calls, consumed by wait_for  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod network;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod spec;

pub use config::RunnerConfig;
pub use driver::PageDriver;
pub use error::{E2eError, E2eResult};
pub use network::{NetworkEvent, NetworkLog};
pub use runner::{ScenarioRunner, ScenarioStatus, SuiteReport};
pub use spec::{Action, Assertion, Scenario, Suite};
