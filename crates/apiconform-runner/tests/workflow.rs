//! End-to-end suite runs against a scripted transport
//!
//! Run with: cargo test -p apiconform-runner --test workflow

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use apiconform_core::report::{FileStatus, ReportSink, Status, StepReport, SuiteReport};
use apiconform_core::{Config, ErrorKind, ModelRegistry, Operation};
use apiconform_runner::{HttpRequest, HttpResponse, SuiteRunner, Transport, TransportError};
use serde_json::json;

// ── Scripted server ──

/// Answers requests from a per-route queue; records every request.
#[derive(Default)]
struct ScriptedServer {
    routes: RefCell<BTreeMap<String, VecDeque<Result<HttpResponse, TransportError>>>>,
    seen: RefCell<Vec<HttpRequest>>,
}

impl ScriptedServer {
    fn route(self, key: &str, responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
        self.routes
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .extend(responses);
        self
    }

    fn ok(self, key: &str, status: u16, body: &str) -> Self {
        self.route(key, vec![Ok(HttpResponse::new(status, body))])
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.seen.borrow().clone()
    }
}

impl Transport for ScriptedServer {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.borrow_mut().push(request.clone());
        let key = format!("{} {}", request.operation, request.url);
        let mut routes = self.routes.borrow_mut();
        let queue = routes
            .get_mut(&key)
            .ok_or_else(|| TransportError::Connect(format!("no route for {key}")))?;
        // The last response repeats once the queue drains
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Ok(HttpResponse::new(500, "")))
        } else {
            queue.front().cloned().unwrap_or_else(|| Ok(HttpResponse::new(500, "")))
        }
    }
}

// ── Fixtures ──

const SERVER: &str = "http://tes.test/ga4gh/tes/";

fn config(dir: &Path) -> Config {
    Config {
        server: SERVER.into(),
        version: "1.1.0".into(),
        base_dir: dir.to_path_buf(),
        ..Config::default()
    }
}

fn tes_document() -> serde_json::Value {
    json!({
        "$defs": {
            "TesServiceInfo": {
                "type": "object",
                "required": ["id", "name"],
                "properties": {"id": {"type": "string"}, "name": {"type": "string"}}
            },
            "TesCreateTaskResponse": {
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "string"}}
            },
            "TesTask": {
                "type": "object",
                "required": ["executors"],
                "properties": {
                    "id": {"type": "string"},
                    "name": {"type": "string"},
                    "state": {"$ref": "#/$defs/TesState"},
                    "executors": {"type": "array", "minItems": 1}
                }
            },
            "TesTaskMinimal": {
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "string"}, "state": {"$ref": "#/$defs/TesState"}}
            },
            "TesListTasksResponse": {
                "type": "object",
                "required": ["tasks"],
                "properties": {"tasks": {"type": "array"}}
            },
            "TesCancelTaskResponse": {"type": "object"},
            "TesState": {
                "type": "string",
                "enum": ["QUEUED", "INITIALIZING", "RUNNING", "COMPLETE", "CANCELING", "CANCELED",
                         "EXECUTOR_ERROR", "SYSTEM_ERROR", "PREEMPTED"]
            }
        }
    })
}

fn registries() -> BTreeMap<String, ModelRegistry> {
    let endpoints: BTreeMap<String, String> = [
        ("service_info", "TesServiceInfo"),
        ("create_task", "TesCreateTaskResponse"),
        ("create_task_request_body", "TesTask"),
        ("get_task_MINIMAL", "TesTaskMinimal"),
        ("get_task_BASIC", "TesTask"),
        ("get_task_FULL", "TesTask"),
        ("list_tasks_MINIMAL", "TesListTasksResponse"),
        ("cancel_task", "TesCancelTaskResponse"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut registry = ModelRegistry::new();
    registry
        .register_document("1.1.0", &endpoints, &tes_document())
        .unwrap();
    BTreeMap::from([("TES".to_string(), registry)])
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn run(server: &ScriptedServer, dir: &Path, files: &[PathBuf]) -> SuiteReport {
    let runner = SuiteRunner::with_registries(server, config(dir), registries());
    let mut report = SuiteReport::new(SERVER, "1.1.0");
    runner.run(files, &mut report);
    report
}

const CREATE_AND_POLL: &str = r#"
service: TES
versions: ["1.1.0"]
tags: [all, task]
description: Create a task and wait for it to finish
jobs:
  - name: create_task
    description: Create a task
    operation: POST
    endpoint: /tasks
    request_body: |
      {"name": "{task_name}", "executors": [{"image": "alpine", "command": ["echo", "hi"]}]}
    expected_status: 200
    storage_vars:
      id: $response.id
  - name: get_task
    description: Poll until terminal
    operation: GET
    endpoint: /tasks/{id}
    path_parameters:
      id: "{id}"
    query_parameters:
      - view: FULL
    expected_status: 200
    polling:
      interval: 0.001
      timeout: 2
    filter:
      - path: $response.name
        type: string
        value: "^hello"
        regex: true
      - path: $response.executors
        type: array
        size: 1
    storage_vars:
      echoed_name: $response.name
"#;

// ── Tests ──

#[test]
fn create_then_poll_threads_variables() {
    let dir = tempfile::tempdir().unwrap();
    // task_name comes from a first step that stores it from service-info
    let file = write(
        dir.path(),
        "create.yml",
        &CREATE_AND_POLL.replace(
            "jobs:\n",
            "jobs:\n  - name: service_info\n    operation: GET\n    endpoint: /service-info\n    expected_status: 200\n    storage_vars:\n      task_name: $response.name\n",
        ),
    );

    let task = r#"{"id": "task-1", "name": "hello-tes", "executors": [{"image": "alpine"}], "state": "%s"}"#;
    let server = ScriptedServer::default()
        .ok("GET http://tes.test/ga4gh/tes/v1/service-info", 200, r#"{"id": "org.test", "name": "hello-tes"}"#)
        .ok("POST http://tes.test/ga4gh/tes/v1/tasks", 200, r#"{"id": "task-1"}"#)
        .route(
            "GET http://tes.test/ga4gh/tes/v1/tasks/task-1",
            ["QUEUED", "RUNNING", "COMPLETE"]
                .iter()
                .map(|s| Ok(HttpResponse::new(200, task.replace("%s", s))))
                .collect(),
        );

    let report = run(&server, dir.path(), &[file]);
    let file = &report.files[0];
    assert_eq!(file.status, FileStatus::Passed, "{:?}", file.error);
    assert_eq!(report.summary.exit_code(), 0);

    let requests = server.requests();
    // 1 service-info + 1 create + 3 polls
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[1].operation, Operation::Post);
    assert_eq!(requests[1].body.as_ref().unwrap()["name"], "hello-tes");
    assert_eq!(requests[2].query, vec![("view".to_string(), "FULL".to_string())]);

    let poll_step = &file.steps[2];
    let cases: Vec<&str> = poll_step.cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        cases,
        vec!["status_code", "response_schema_validation", "filter-1", "filter-2"]
    );
    assert!(poll_step.cases.iter().all(|c| c.status == Status::Pass));
}

#[test]
fn unresolved_variable_fails_without_http() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "get.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: get_task
    operation: GET
    endpoint: /tasks/{id}
    path_parameters:
      id: "{id}"
    expected_status: 200
"#,
    );
    let server = ScriptedServer::default();
    let report = run(&server, dir.path(), &[file]);

    assert_eq!(report.files[0].status, FileStatus::Failed);
    assert_eq!(report.files[0].failure_kind, Some(ErrorKind::Validation));
    assert!(server.requests().is_empty());
    assert_eq!(report.summary.exit_code(), 1);
}

#[test]
fn status_mismatch_is_assertion_regardless_of_body() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "info.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: service_info
    operation: GET
    endpoint: /service-info
    expected_status: 200
"#,
    );
    let server = ScriptedServer::default().ok(
        "GET http://tes.test/ga4gh/tes/v1/service-info",
        201,
        r#"{"id": "org.test", "name": "fine"}"#,
    );
    let report = run(&server, dir.path(), &[file]);

    let file = &report.files[0];
    assert_eq!(file.failure_kind, Some(ErrorKind::Assertion));
    assert_eq!(file.error.as_ref().unwrap().name, "Incorrect HTTP Response Status");
}

#[test]
fn empty_cancel_body_decodes_to_empty_object() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "cancel.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all, cancel]
jobs:
  - name: cancel_task
    operation: POST
    endpoint: /tasks/task-9:cancel
    response:
      200: ""
  - name: get_task
    operation: GET
    endpoint: /tasks/task-9
    expected_status: 200
    polling:
      interval: 0.001
      timeout: 2
    env_vars:
      check_cancel: true
"#,
    );
    let server = ScriptedServer::default()
        .ok("POST http://tes.test/ga4gh/tes/v1/tasks/task-9:cancel", 200, "")
        .route(
            "GET http://tes.test/ga4gh/tes/v1/tasks/task-9",
            vec![
                Ok(HttpResponse::new(200, r#"{"id": "task-9", "state": "RUNNING"}"#)),
                Ok(HttpResponse::new(200, r#"{"id": "task-9", "state": "CANCELING"}"#)),
            ],
        );
    let report = run(&server, dir.path(), &[file]);
    assert_eq!(report.files[0].status, FileStatus::Passed, "{:?}", report.files[0].error);
}

#[test]
fn cancel_mode_times_out_on_complete_states() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "poll.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: get_task
    operation: GET
    endpoint: /tasks/task-2
    expected_status: 200
    polling:
      interval: 0.005
      timeout: 0.05
    check_cancel: true
"#,
    );
    let server = ScriptedServer::default().route(
        "GET http://tes.test/ga4gh/tes/v1/tasks/task-2",
        ["QUEUED", "RUNNING", "COMPLETE"]
            .iter()
            .map(|s| Ok(HttpResponse::new(200, format!(r#"{{"id": "task-2", "state": "{s}"}}"#))))
            .collect(),
    );
    let report = run(&server, dir.path(), &[file]);

    let file = &report.files[0];
    assert_eq!(file.failure_kind, Some(ErrorKind::Assertion));
    assert_eq!(file.error.as_ref().unwrap().name, "Polling Timeout Error");
}

#[test]
fn infrastructure_failure_does_not_stop_the_suite() {
    let dir = tempfile::tempdir().unwrap();
    let info = r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: service_info
    operation: GET
    endpoint: /service-info
    expected_status: 200
"#;
    let down = write(dir.path(), "a_down.yml", &info.replace("/service-info", "/down"));
    let up = write(dir.path(), "b_up.yml", info);
    let skipped = write(
        dir.path(),
        "c_old.yml",
        &info.replace(r#"["1.1.0"]"#, r#"["1.0.0"]"#),
    );
    let excluded = write(dir.path(), "d_tagged.yml", &info.replace("[all]", "[All, Slow]"));

    let server = ScriptedServer::default()
        .route(
            "GET http://tes.test/ga4gh/tes/v1/down",
            vec![Err(TransportError::Connect("connection refused".into()))],
        )
        .ok(
            "GET http://tes.test/ga4gh/tes/v1/service-info",
            200,
            r#"{"id": "org.test", "name": "TES"}"#,
        );

    let runner = SuiteRunner::with_registries(
        &server,
        Config {
            exclude_tags: vec!["slow".into()],
            ..config(dir.path())
        },
        registries(),
    );
    let mut report = SuiteReport::new(SERVER, "1.1.0");
    let summary = runner.run(&[down, up, skipped, excluded], &mut report);

    assert_eq!(summary.total, 4);
    assert_eq!(summary.passed.len(), 1);
    assert_eq!(summary.skipped.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].kind, ErrorKind::Infrastructure);
    // Infrastructure-only failures map to the tool-error exit code
    assert_eq!(summary.exit_code(), 3);
    assert_eq!(report.summary, summary);
}

#[test]
fn request_body_schema_failure_is_assertion_before_sending() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "bad_body.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: create_task
    operation: POST
    endpoint: /tasks
    request_body: '{"name": "no executors"}'
    expected_status: 200
"#,
    );
    let server = ScriptedServer::default();
    let report = run(&server, dir.path(), &[file]);

    let file = &report.files[0];
    assert_eq!(file.failure_kind, Some(ErrorKind::Assertion));
    assert_eq!(file.error.as_ref().unwrap().name, "Schema Validation Error");
    assert!(server.requests().is_empty());
}

#[test]
fn failing_step_ends_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "two.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: list_tasks
    operation: GET
    endpoint: /tasks
    expected_status: 200
    filter:
      - path: $response.tasks
        type: array
        size: 2
  - name: service_info
    operation: GET
    endpoint: /service-info
    expected_status: 200
"#,
    );
    let server = ScriptedServer::default().ok(
        "GET http://tes.test/ga4gh/tes/v1/tasks",
        200,
        r#"{"tasks": [{"id": "a"}]}"#,
    );

    #[derive(Default)]
    struct Steps(Vec<StepReport>);
    impl ReportSink for Steps {
        fn step_finished(&mut self, _file: &str, step: &StepReport) {
            self.0.push(step.clone());
        }
        fn file_finished(&mut self, _file: &apiconform_core::FileReport) {}
    }

    let runner = SuiteRunner::with_registries(&server, config(dir.path()), registries());
    let mut sink = Steps::default();
    let summary = runner.run(&[file], &mut sink);

    assert_eq!(summary.failed[0].kind, ErrorKind::Assertion);
    assert_eq!(sink.0.len(), 1);
    assert_eq!(sink.0[0].error.as_ref().unwrap().name, "Failed filtering");
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn unselected_file_is_skipped_before_templates_load() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "old.yml",
        r#"
service: TES
versions: ["1.0.0"]
tags: [all]
jobs:
  - $ref: templates/absent.yml
"#,
    );
    let server = ScriptedServer::default();
    let report = run(&server, dir.path(), &[file]);

    let file = &report.files[0];
    assert_eq!(file.status, FileStatus::Skipped, "{:?}", file.error);
    assert!(file.error.is_none());
    assert_eq!(report.summary.skipped.len(), 1);
    assert!(report.summary.failed.is_empty());
    assert!(server.requests().is_empty());
}

#[test]
fn selected_file_with_missing_template_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "current.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - $ref: templates/absent.yml
"#,
    );
    let server = ScriptedServer::default();
    let report = run(&server, dir.path(), &[file]);

    let file = &report.files[0];
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(file.failure_kind, Some(ErrorKind::Validation));
}

#[test]
fn post_without_request_body_sends_empty_object() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "cancel.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: cancel_task
    operation: POST
    endpoint: /tasks/task-3:cancel
    expected_status: 200
  - name: service_info
    operation: GET
    endpoint: /service-info
    expected_status: 200
"#,
    );
    let server = ScriptedServer::default()
        .ok("POST http://tes.test/ga4gh/tes/v1/tasks/task-3:cancel", 200, "{}")
        .ok(
            "GET http://tes.test/ga4gh/tes/v1/service-info",
            200,
            r#"{"id": "org.test", "name": "TES"}"#,
        );
    let report = run(&server, dir.path(), &[file]);
    assert_eq!(report.files[0].status, FileStatus::Passed, "{:?}", report.files[0].error);

    let requests = server.requests();
    assert_eq!(requests[0].operation, Operation::Post);
    assert_eq!(requests[0].body, Some(json!({})));
    assert_eq!(requests[1].operation, Operation::Get);
    assert_eq!(requests[1].body, None);
}

#[test]
fn unrepresentable_polling_values_fail_the_file_only() {
    let dir = tempfile::tempdir().unwrap();
    let poll = |timeout: &str| {
        format!(
            r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: get_task
    operation: GET
    endpoint: /tasks/task-4
    expected_status: 200
    polling:
      interval: 1
      timeout: {timeout}
"#
        )
    };
    let huge = write(dir.path(), "a_huge.yml", &poll("1e300"));
    let negative = write(dir.path(), "b_negative.yml", &poll("-5"));
    let up = write(
        dir.path(),
        "c_up.yml",
        r#"
service: TES
versions: ["1.1.0"]
tags: [all]
jobs:
  - name: service_info
    operation: GET
    endpoint: /service-info
    expected_status: 200
"#,
    );
    let server = ScriptedServer::default().ok(
        "GET http://tes.test/ga4gh/tes/v1/service-info",
        200,
        r#"{"id": "org.test", "name": "TES"}"#,
    );
    let report = run(&server, dir.path(), &[huge, negative, up]);

    for file in &report.files[..2] {
        assert_eq!(file.failure_kind, Some(ErrorKind::Validation));
        assert_eq!(file.error.as_ref().unwrap().name, "Invalid polling spec");
    }
    assert_eq!(report.files[2].status, FileStatus::Passed);
    // Invalid polling is rejected before anything is sent
    assert_eq!(server.requests().len(), 1);
}
