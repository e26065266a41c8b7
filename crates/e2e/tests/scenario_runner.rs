//! Runner behaviour against the stub endpoint and a simulated page

mod common;

use std::time::Duration;

use test_case::test_case;
use todo_common::stub::StubServer;

use common::{fixture_contents, runner, runner_with, scenario, scenarios, SimulatedPage};
use todo_e2e::runner::{ScenarioPhase, ScenarioStatus};
use todo_e2e::E2eError;

fn create_steps(contents: &[String]) -> String {
    let mut yaml = String::new();
    for (i, content) in contents.iter().enumerate() {
        yaml.push_str(&format!(
            r#"
      - action: type
        selector: form input
        text: "{content}"
      - action: press
        selector: form input
        key: Enter
      - action: wait_for
        method: POST
        path: /todos
      - action: expect
        assert: {{ check: count, selector: .todos li, equals: {n} }}
"#,
            content = content,
            n = i + 1
        ));
    }
    yaml
}

#[tokio::test]
async fn reset_leaves_store_empty() {
    let server = StubServer::start().await.unwrap();
    for content in ["left", "over", "state"] {
        server.insert(content);
    }

    let runner = runner(&server, SimulatedPage::new(&server));
    runner.reset_state().await.unwrap();
    assert!(server.todos().is_empty());
}

#[tokio::test]
async fn store_is_empty_before_first_action() {
    let server = StubServer::start().await.unwrap();
    server.insert("from an earlier run");

    let mut runner = runner(&server, SimulatedPage::new(&server));
    let result = runner
        .run_scenario(&scenario(
            r#"
name: empty
scenarios:
  - name: sees nothing
    steps:
      - action: expect
        assert: { check: remote_count, equals: 0 }
      - action: visit
        path: /
    assertions:
      - check: count
        selector: .todos li
        equals: 0
"#,
        ))
        .await
        .unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);
}

#[test_case(1 ; "one todo")]
#[test_case(2 ; "two todos")]
#[test_case(3 ; "three todos")]
#[test_case(4 ; "four todos")]
#[test_case(5 ; "five todos")]
#[tokio::test]
async fn creating_n_todos_lists_them_in_order(n: usize) {
    let server = StubServer::start().await.unwrap();
    let contents: Vec<String> = (1..=n).map(|i| format!("Todo number {}", i)).collect();

    let expected = contents
        .iter()
        .map(|c| format!("          - \"{}\"\n", c))
        .collect::<String>();
    let yaml = format!(
        r#"
name: create
scenarios:
  - name: creates {n}
    setup:
      - action: visit
        path: /
    steps:{steps}
    assertions:
      - check: count
        selector: .todos li
        equals: {n}
      - check: texts
        selector: .todos li
        equals:
{expected}"#,
        n = n,
        steps = create_steps(&contents),
        expected = expected
    );

    let mut runner = runner(&server, SimulatedPage::new(&server));
    let result = runner.run_scenario(&scenario(&yaml)).await.unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);

    let stored: Vec<String> = server.todos().into_iter().map(|t| t.content).collect();
    assert_eq!(stored, contents);
}

#[test_case(0 ; "first")]
#[test_case(1 ; "second")]
#[test_case(2 ; "third")]
#[test_case(3 ; "fourth")]
#[test_case(4 ; "fifth")]
#[tokio::test]
async fn deleting_one_of_five_leaves_four(index: usize) {
    let server = StubServer::start().await.unwrap();
    let deleted = &fixture_contents()[index];

    let yaml = format!(
        r#"
name: delete
scenarios:
  - name: deletes {index}
    setup:
      - action: seed_fixture
        fixture: todos
      - action: visit
        path: /
    steps:
      - action: click
        selector: button.destroy
        nth: {index}
      - action: wait_for
        method: DELETE
        path: /todos/*
    assertions:
      - check: count
        selector: .todos li
        equals: 4
      - check: absent_text
        selector: .todos li
        value: "{deleted}"
"#,
        index = index,
        deleted = deleted
    );

    let mut runner = runner(&server, SimulatedPage::new(&server));
    let result = runner.run_scenario(&scenario(&yaml)).await.unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);
    assert!(server.todos().iter().all(|t| &t.content != deleted));
}

#[tokio::test]
async fn editing_first_todo_changes_only_that_item() {
    let server = StubServer::start().await.unwrap();
    let mut expected = fixture_contents();
    expected[0] = "Updated todo".to_string();

    let mut runner = runner(&server, SimulatedPage::new(&server));
    let result = runner
        .run_scenario(&scenario(
            r#"
name: update
scenarios:
  - name: edits first
    setup:
      - action: seed_fixture
        fixture: todos
      - action: visit
        path: /
    steps:
      - action: click
        selector: .edit-btn
        nth: 0
      - action: clear
        selector: input[name=update]
      - action: type
        selector: input[name=update]
        text: Updated todo
      - action: click
        selector: button.save
      - action: wait_for
        method: PUT
        path: /todos/*
    assertions:
      - check: text
        selector: .todos li
        nth: 0
        value: Updated todo
"#,
        ))
        .await
        .unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);

    let stored: Vec<String> = server.todos().into_iter().map(|t| t.content).collect();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn fixture_loads_five_items_in_order() {
    let server = StubServer::start().await.unwrap();
    let contents = fixture_contents();
    assert_eq!(contents.len(), 5);

    let expected = contents
        .iter()
        .map(|c| format!("          - \"{}\"\n", c))
        .collect::<String>();
    let yaml = format!(
        r#"
name: load
scenarios:
  - name: loads
    setup:
      - action: seed_fixture
        fixture: todos
      - action: visit
        path: /
    assertions:
      - check: count
        selector: .todos li
        equals: 5
      - check: texts
        selector: .todos li
        equals:
{expected}"#,
        expected = expected
    );

    let mut runner = runner(&server, SimulatedPage::new(&server));
    let result = runner.run_scenario(&scenario(&yaml)).await.unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);
}

const SLOW_CREATE: &str = r#"
name: ordering
scenarios:
  - name: waits for the create
    setup:
      - action: visit
        path: /
    steps:
      - action: type
        selector: form input
        text: slow todo
      - action: press
        selector: form input
        key: Enter
      - action: wait_for
        method: POST
        path: /todos
    assertions:
      - check: count
        selector: .todos li
        equals: 1
"#;

#[tokio::test]
async fn assertions_run_after_awaited_call_completes() {
    let server = StubServer::start().await.unwrap();
    let page = SimulatedPage::new(&server).with_latency(Duration::from_millis(150));

    let mut config = common::config_for(&server);
    config.assertion_timeout_ms = 0;
    config.network_timeout_ms = 2_000;
    let mut runner = runner_with(config, page);

    let result = runner.run_scenario(&scenario(SLOW_CREATE)).await.unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);
}

#[tokio::test]
async fn asserting_without_the_wait_races_the_page() {
    let server = StubServer::start().await.unwrap();
    let page = SimulatedPage::new(&server).with_latency(Duration::from_millis(150));

    let mut config = common::config_for(&server);
    config.assertion_timeout_ms = 0;
    let mut runner = runner_with(config, page);

    let mut unsynchronised = scenario(SLOW_CREATE);
    unsynchronised.steps.pop();

    let result = runner.run_scenario(&unsynchronised).await.unwrap();
    assert_eq!(result.status, ScenarioStatus::Failed);
    let failure = result.failure.unwrap();
    assert_eq!(failure.expected.as_deref(), Some("1"));
    assert_eq!(failure.actual.as_deref(), Some("0"));
}

#[tokio::test]
async fn list_assertion_retries_until_the_page_renders() {
    let server = StubServer::start().await.unwrap();
    let page = SimulatedPage::new(&server).with_latency(Duration::from_millis(150));

    let mut config = common::config_for(&server);
    config.assertion_timeout_ms = 2_000;
    let mut runner = runner_with(config, page);

    let mut polled = scenario(SLOW_CREATE);
    polled.steps.pop();

    let result = runner.run_scenario(&polled).await.unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);
    assert_eq!(server.todos().len(), 1);
}

const EDIT_FORM: &str = r#"
name: exists
scenarios:
  - name: edit form
    setup:
      - action: seed_fixture
        fixture: todos
      - action: visit
        path: /
    assertions:
      - check: exists
        selector: .edit-btn
      - check: exists
        selector: input[name=update]
        present: false
"#;

#[tokio::test]
async fn exists_checks_presence_and_absence() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let result = runner.run_scenario(&scenario(EDIT_FORM)).await.unwrap();
    assert_eq!(result.status, ScenarioStatus::Passed, "{:?}", result.failure);
}

#[test_case(".edit-btn", false, "absent", "present" ; "expected absent but present")]
#[test_case("input[name=update]", true, "present", "absent" ; "expected present but absent")]
#[tokio::test]
async fn exists_mismatch_reports_presence(selector: &str, present: bool, expected: &str, actual: &str) {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let yaml = format!(
        r#"
name: exists
scenarios:
  - name: wrong presence
    setup:
      - action: seed_fixture
        fixture: todos
      - action: visit
        path: /
    assertions:
      - check: exists
        selector: "{selector}"
        present: {present}
"#
    );
    let result = runner.run_scenario(&scenario(&yaml)).await.unwrap();

    assert_eq!(result.status, ScenarioStatus::Failed);
    let failure = result.failure.unwrap();
    assert_eq!(failure.expected.as_deref(), Some(expected));
    assert_eq!(failure.actual.as_deref(), Some(actual));
}

#[tokio::test]
async fn missing_network_call_times_out_and_names_it() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let result = runner
        .run_scenario(&scenario(
            r#"
name: timeout
scenarios:
  - name: nobody saves
    setup:
      - action: seed_fixture
        fixture: todos
      - action: visit
        path: /
    steps:
      - action: wait_for
        method: PUT
        path: /todos/*
"#,
        ))
        .await
        .unwrap();

    assert_eq!(result.status, ScenarioStatus::Failed);
    assert_eq!(result.phase, ScenarioPhase::Steps);
    let failure = result.failure.unwrap();
    assert_eq!(failure.kind, "timeout");
    assert!(failure.message.contains("PUT /todos/*"), "{}", failure.message);
}

#[tokio::test]
async fn assertion_mismatch_reports_expected_and_actual() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let result = runner
        .run_scenario(&scenario(
            r#"
name: mismatch
scenarios:
  - name: wrong count
    setup:
      - action: seed_fixture
        fixture: todos
      - action: visit
        path: /
    assertions:
      - check: count
        selector: .todos li
        equals: 3
"#,
        ))
        .await
        .unwrap();

    assert_eq!(result.status, ScenarioStatus::Failed);
    assert_eq!(result.phase, ScenarioPhase::Assertions);
    let failure = result.failure.unwrap();
    assert_eq!(failure.kind, "assertion_failed");
    assert_eq!(failure.expected.as_deref(), Some("3"));
    assert_eq!(failure.actual.as_deref(), Some("5"));
}

#[tokio::test]
async fn scenario_failure_does_not_stop_the_suite() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let report = runner
        .run_suite(&scenarios(
            r#"
name: mixed
scenarios:
  - name: fails
    setup:
      - action: seed_fixture
        fixture: todos
    steps:
      - action: wait_for
        method: DELETE
        path: /todos/*
  - name: passes on a clean store
    assertions:
      - check: remote_count
        equals: 0
"#,
        ))
        .await;

    assert_eq!(report.total, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.passed, 1);
    assert!(!report.success());
}

#[tokio::test]
async fn failed_reset_aborts_the_run() {
    let server = StubServer::start().await.unwrap();
    server.insert("cannot be removed");
    server.fail_deletes(true);

    let mut runner = runner(&server, SimulatedPage::new(&server));
    let report = runner
        .run_suite(&scenarios(
            r#"
name: doomed
scenarios:
  - name: first
  - name: second
"#,
        ))
        .await;

    let aborted = report.aborted.as_ref().unwrap();
    assert_eq!(aborted.kind, "setup_failure");
    assert!(aborted.message.contains("deleting todo"), "{}", aborted.message);
    assert!(!report.success());
    assert_eq!(
        report.outcomes(),
        vec![
            ("first".to_string(), ScenarioStatus::Failed),
            ("second".to_string(), ScenarioStatus::NotRun),
        ]
    );
    assert_eq!(report.results[0].phase, ScenarioPhase::Setup);
    assert_eq!(report.not_run, 1);
}

#[tokio::test]
async fn results_before_a_setup_failure_are_kept() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let report = runner
        .run_suite(&scenarios(
            r#"
name: partial
scenarios:
  - name: passes first
    assertions:
      - check: remote_count
        equals: 0
  - name: broken setup
    setup:
      - action: seed_fixture
        fixture: users
  - name: never runs
"#,
        ))
        .await;

    assert_eq!(
        report.outcomes(),
        vec![
            ("passes first".to_string(), ScenarioStatus::Passed),
            ("broken setup".to_string(), ScenarioStatus::Failed),
            ("never runs".to_string(), ScenarioStatus::NotRun),
        ]
    );
    assert_eq!((report.passed, report.failed, report.not_run), (1, 1, 1));

    let broken = &report.results[1];
    assert_eq!(broken.phase, ScenarioPhase::Setup);
    let failure = broken.failure.as_ref().unwrap();
    assert_eq!(failure.kind, "setup_failure");
    assert!(failure.message.contains("users"), "{}", failure.message);
    assert_eq!(report.aborted.as_ref(), Some(failure));

    let never = &report.results[2];
    assert_eq!(never.phase, ScenarioPhase::NotStarted);
    assert!(never.failure.is_none());

    let dir = tempfile::tempdir().unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report.write(dir.path()).unwrap()).unwrap())
            .unwrap();
    assert_eq!(written["results"][0]["status"], "passed");
    assert_eq!(written["results"][2]["status"], "not_run");
    assert_eq!(written["aborted"]["kind"], "setup_failure");
}

#[tokio::test]
async fn unknown_fixture_is_a_setup_failure() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let err = runner
        .run_scenario(&scenario(
            r#"
name: missing
scenarios:
  - name: seeds nothing
    setup:
      - action: seed_fixture
        fixture: users
"#,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::SetupFailure(ref msg) if msg.contains("users")));
}

#[tokio::test]
async fn focused_scenarios_skip_the_rest() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let report = runner
        .run_suite(&scenarios(
            r#"
name: focus
scenarios:
  - name: unfocused
  - name: focused
    only: true
  - name: focused but skipped
    only: true
    skip: true
"#,
        ))
        .await;

    assert_eq!(
        report.outcomes(),
        vec![
            ("unfocused".to_string(), ScenarioStatus::Skipped),
            ("focused".to_string(), ScenarioStatus::Passed),
            ("focused but skipped".to_string(), ScenarioStatus::Skipped),
        ]
    );
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn request_action_checks_status_and_body() {
    let server = StubServer::start().await.unwrap();
    let mut runner = runner(&server, SimulatedPage::new(&server));

    let result = runner
        .run_scenario(&scenario(
            r#"
name: http
scenarios:
  - name: wrong status
    steps:
      - action: request
        method: POST
        path: /todos
        body: { content: "x" }
        expect_status: 200
"#,
        ))
        .await
        .unwrap();

    let failure = result.failure.unwrap();
    assert_eq!(failure.expected.as_deref(), Some("200"));
    assert_eq!(failure.actual.as_deref(), Some("201"));
}
