//! 端到端流程测试：WorkflowLauncher + ScriptedLlmClient + 临时项目目录

use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskpilot::config::AppConfig;
use taskpilot::core::{ConfirmationPort, ErrorKind, PilotError, PilotEvent, StaticConfirmer};
use taskpilot::llm::ScriptedLlmClient;
use taskpilot::memory::Role;
use taskpilot::{RunSummary, WorkflowLauncher};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SUCCESS: &str = r#"{"result": "success", "message": ""}"#;

struct Fixture {
    _root: TempDir,
    program: PathBuf,
    project: PathBuf,
}

/// 程序目录：system 指令 + 两个任务（01-setup 两个子任务，02-port 一个子任务）
fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let program = root.path().join("pilot");
    let project = root.path().join("shop-api");
    std::fs::create_dir_all(&project).unwrap();

    write(&program, "prompts/system/coding.md", "You port {{ projectname }} to Rust.");
    write(&program, "prompts/tasks/01-setup/1-manifest.md", "Create a manifest in {{ projectdir }}.");
    write(&program, "prompts/tasks/01-setup/2-layout.md", "Create the module layout.");
    write(&program, "prompts/tasks/02-port/1-models.md", "Port the models.");

    Fixture {
        _root: root,
        program,
        project,
    }
}

fn write(base: &Path, relative: &str, content: &str) {
    let path = base.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn drain(events: &mut mpsc::UnboundedReceiver<PilotEvent>) -> Vec<PilotEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = events.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn test_full_run_with_tool_use() {
    let fx = fixture();
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"Writing the manifest. {"tool": "write_file", "args": {"path": "Cargo.toml", "content": "[package]\nname = \"shop-api\"\n"}}"#,
        SUCCESS,
        SUCCESS,
        SUCCESS,
    ]));
    let (tx, mut events) = mpsc::unbounded_channel();
    let launcher = WorkflowLauncher::new(AppConfig::default(), Arc::new(StaticConfirmer::deny_all()))
        .with_llm(llm.clone())
        .with_event_tx(tx);

    let summary = launcher
        .run(&fx.project, &fx.program, 0, 0, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary::Completed {
            task_count: 2,
            message: "2 tasks completed successfully.".into()
        }
    );
    let manifest = std::fs::read_to_string(fx.project.join("Cargo.toml")).unwrap();
    assert!(manifest.contains("shop-api"));

    let calls = llm.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0][0].role, Role::System);
    assert!(calls[0][0].content().starts_with("You port shop-api to Rust."));
    assert!(calls[0][1].content().starts_with("Create a manifest in "));
    assert!(calls[0][1].content().contains("shop-api"));

    let dispatched: Vec<(usize, usize)> = drain(&mut events)
        .into_iter()
        .filter_map(|ev| match ev {
            PilotEvent::RunSubtask {
                task_index,
                subtask_index,
                ..
            } => Some((task_index, subtask_index)),
            _ => None,
        })
        .collect();
    assert_eq!(dispatched, vec![(0, 0), (0, 1), (1, 0)]);
}

#[tokio::test]
async fn test_resume_from_offset() {
    let fx = fixture();
    let llm = Arc::new(ScriptedLlmClient::default());
    let launcher = WorkflowLauncher::new(AppConfig::default(), Arc::new(StaticConfirmer::deny_all()))
        .with_llm(llm.clone());

    let summary = launcher
        .run(&fx.project, &fx.program, 1, 0, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(summary, RunSummary::Completed { task_count: 2, .. }));
    let calls = llm.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][1].content(), "Port the models.");
}

#[tokio::test]
async fn test_confirmation_answer_feeds_next_turn() {
    let fx = fixture();
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"{"result": "confirm", "message": "Use edition 2021?"}"#,
        SUCCESS,
    ]));
    let (port, mut pending) = ConfirmationPort::new();
    let answerer = tokio::spawn(async move {
        let request = pending.recv().await.unwrap();
        assert_eq!(request.request.text, "Use edition 2021?");
        request.approve(Some("Yes, 2021.".into()));
    });

    let launcher =
        WorkflowLauncher::new(AppConfig::default(), Arc::new(port)).with_llm(llm.clone());
    let summary = launcher
        .run(&fx.project, &fx.program, 0, 0, CancellationToken::new())
        .await
        .unwrap();
    answerer.await.unwrap();

    assert!(matches!(summary, RunSummary::Completed { .. }));
    let calls = llm.calls();
    let second = &calls[1];
    assert_eq!(second.last().unwrap().content(), "Yes, 2021.");
    assert!(second
        .iter()
        .any(|m| m.content().contains("Use edition 2021?")));
}

#[tokio::test]
async fn test_denied_confirmation_parks_run() {
    let fx = fixture();
    let llm = Arc::new(ScriptedLlmClient::new([
        SUCCESS,
        r#"{"result": "confirm", "message": "Delete src/legacy?"}"#,
    ]));
    let launcher = WorkflowLauncher::new(AppConfig::default(), Arc::new(StaticConfirmer::deny_all()))
        .with_llm(llm.clone());

    let summary = launcher
        .run(&fx.project, &fx.program, 0, 0, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary::Parked {
            task_index: 0,
            subtask_index: 1,
            task: "01-setup".into(),
            subtask: "2-layout".into(),
        }
    );
    assert_eq!(llm.calls().len(), 2);
}

#[tokio::test]
async fn test_failure_stops_everything() {
    let fx = fixture();
    let llm = Arc::new(ScriptedLlmClient::new([
        r#"{"result": "failure", "message": "cargo build fails"}"#,
    ]));
    let launcher = WorkflowLauncher::new(AppConfig::default(), Arc::new(StaticConfirmer::approve_all()))
        .with_llm(llm.clone());

    let err = launcher
        .run(&fx.project, &fx.program, 0, 0, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TaskFailure);
    assert_eq!(
        err.to_string(),
        "Task \"1-manifest\" failed with message: cargo build fails"
    );
    assert_eq!(llm.calls().len(), 1);
}

#[tokio::test]
async fn test_malformed_result_goes_through_confirmation() {
    let fx = fixture();
    let llm = Arc::new(ScriptedLlmClient::new(["I think I am done?"]));
    let (tx, mut events) = mpsc::unbounded_channel();
    let launcher = WorkflowLauncher::new(AppConfig::default(), Arc::new(StaticConfirmer::approve_all()))
        .with_llm(llm.clone())
        .with_event_tx(tx);

    let summary = launcher
        .run(&fx.project, &fx.program, 0, 0, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(summary, RunSummary::Completed { .. }));
    let events = drain(&mut events);
    let malformed = events
        .iter()
        .filter(|e| matches!(e, PilotEvent::MalformedResult { .. }))
        .count();
    assert_eq!(malformed, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        PilotEvent::ConfirmationRequested { text, .. } if text.starts_with("The task was stopped unexpectedly.")
    )));
}

#[tokio::test]
async fn test_missing_task_root_is_setup_error() {
    let fx = fixture();
    std::fs::remove_dir_all(fx.program.join("prompts/tasks")).unwrap();
    let launcher = WorkflowLauncher::new(AppConfig::default(), Arc::new(StaticConfirmer::approve_all()))
        .with_llm(Arc::new(ScriptedLlmClient::default()));

    let err = launcher
        .run(&fx.project, &fx.program, 0, 0, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PilotError::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::Setup);
}
