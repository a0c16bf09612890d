//! TaskPilot - Rust 编码智能体编排器
//!
//! 入口：解析命令行、初始化日志与配置，按任务/子任务顺序驱动编码智能体，并把结局映射为退出码。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use taskpilot::config::load_config;
use taskpilot::core::{Confirmer, ConsoleConfirmer, ErrorKind, PilotError, StaticConfirmer};
use taskpilot::{exit_codes, observability, RunSummary, WorkflowLauncher};

#[derive(Parser, Debug)]
#[command(
    name = "taskpilot",
    version,
    about = "Drive a coding agent through ordered tasks and subtasks"
)]
struct Cli {
    /// Project directory the agent works on
    project_dir: PathBuf,

    /// Start offset as task[:subtask], zero-based (e.g. 2:1)
    range: Option<String>,

    /// Extra configuration file layered over <program>/taskpilot.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding prompts/ and references/ (default: the executable's directory)
    #[arg(long)]
    program_dir: Option<PathBuf>,

    /// Approve every confirmation request automatically
    #[arg(short, long)]
    yes: bool,
}

/// 解析 `task[:subtask]`；无法解析的部分按 0 处理
fn parse_range(range: Option<&str>) -> (usize, usize) {
    let Some(range) = range else {
        return (0, 0);
    };
    let mut parts = range.splitn(2, ':');
    let mut next = || {
        parts
            .next()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .unwrap_or(0)
    };
    let task = next();
    let subtask = next();
    (task, subtask)
}

fn default_program_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("locate the taskpilot executable")?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<RunSummary> {
    if !cli.project_dir.is_dir() {
        return Err(anyhow::Error::new(PilotError::NotFound(cli.project_dir.clone()))
            .context("project directory is required"));
    }

    let program_dir = match cli.program_dir {
        Some(dir) => dir,
        None => default_program_dir()?,
    };
    let config = load_config(&program_dir, cli.config.as_deref()).context("load configuration")?;

    let confirmer: Arc<dyn Confirmer> = if cli.yes {
        Arc::new(StaticConfirmer::approve_all())
    } else {
        let project = cli
            .project_dir
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Arc::new(ConsoleConfirmer::new(project))
    };

    let (start_task, start_subtask) = parse_range(cli.range.as_deref());
    let launcher = WorkflowLauncher::new(config, confirmer);
    let summary = launcher
        .run(&cli.project_dir, &program_dir, start_task, start_subtask, cancel)
        .await
        .context("run failed")?;
    Ok(summary)
}

fn exit_code(result: &anyhow::Result<RunSummary>) -> i32 {
    match result {
        Ok(RunSummary::Completed { .. }) => exit_codes::OK,
        Ok(RunSummary::Parked { .. }) => exit_codes::PARKED,
        Err(err) => match err.downcast_ref::<PilotError>().map(PilotError::kind) {
            Some(ErrorKind::TaskFailure) => exit_codes::TASK_FAILED,
            Some(ErrorKind::Cancelled) => exit_codes::CANCELLED,
            _ => exit_codes::ERROR,
        },
    }
}

#[tokio::main]
async fn main() {
    observability::init();
    let cli = Cli::parse();
    let project_dir = cli.project_dir.clone();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the run...");
            ctrl_c.cancel();
        }
    });

    let result = run(cli, cancel).await;
    match &result {
        Ok(RunSummary::Completed { message, .. }) => println!("{}", message),
        Ok(RunSummary::Parked {
            task_index,
            subtask_index,
            task,
            subtask,
        }) => println!(
            "Stopped at {}/{}. Resume with: taskpilot {} {}:{}",
            task,
            subtask,
            project_dir.display(),
            task_index,
            subtask_index
        ),
        Err(err) => eprintln!("{:#}", err),
    }
    std::process::exit(exit_code(&result));
}
