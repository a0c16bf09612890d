//! 一次项目运行的装配：配置 -> LLM -> 工具 -> ReactAgent -> AgentStep -> Orchestrator
//!
//! 任务根目录为 `<prompts>/tasks`，系统指令为 `<prompts>/system/coding.md`；工具限定在项目目录内，
//! 不修改进程的工作目录。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentStep, ReactAgent};
use crate::config::{AgentSection, AppConfig};
use crate::core::{Confirmer, Orchestrator, PilotError, PilotEvent, RunSummary};
use crate::llm::{LlmClient, OpenAiClient, ScriptedLlmClient};
use crate::prompt::{render_prompt, PromptContext};
use crate::tools::{project_tools, ToolExecutor};

/// prompts 目录下的任务根
pub const TASKS_DIR: &str = "tasks";

/// prompts 目录下的系统指令文件
pub const SYSTEM_PROMPT_FILE: &str = "system/coding.md";

/// 根据 [agent] 段创建 LLM 客户端：mock 用 ScriptedLlmClient，否则走 OpenAI 兼容端点
pub fn create_llm_from_config(agent: &AgentSection) -> Result<Arc<dyn LlmClient>, PilotError> {
    if agent.mock {
        tracing::info!("Using scripted mock LLM client");
        return Ok(Arc::new(ScriptedLlmClient::default()));
    }
    let api_key = agent.resolve_api_key()?;
    tracing::info!("Using model {} at {}", agent.model, agent.endpoint);
    Ok(Arc::new(OpenAiClient::new(
        Some(&agent.endpoint),
        &agent.model,
        &api_key,
    )))
}

/// 工作流启动器
pub struct WorkflowLauncher {
    config: AppConfig,
    confirmer: Arc<dyn Confirmer>,
    llm: Option<Arc<dyn LlmClient>>,
    event_tx: Option<UnboundedSender<PilotEvent>>,
}

impl WorkflowLauncher {
    pub fn new(config: AppConfig, confirmer: Arc<dyn Confirmer>) -> Self {
        Self {
            config,
            confirmer,
            llm: None,
            event_tx: None,
        }
    }

    /// 使用指定的 LLM 客户端，而不是按配置创建
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<PilotEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub async fn run(
        &self,
        project_dir: &Path,
        program_dir: &Path,
        start_task: usize,
        start_subtask: usize,
        cancel: CancellationToken,
    ) -> Result<RunSummary, PilotError> {
        let project_dir = absolute(project_dir)?;
        let prompts_dir = self.config.paths.prompts_dir(program_dir);
        let references_dir = self.config.paths.references_dir(program_dir);
        let context = PromptContext::new(&project_dir, &references_dir);

        tracing::info!("Project name: {}", context.projectname);
        tracing::info!("Project directory: {}", project_dir.display());
        tracing::info!("Program directory: {}", program_dir.display());
        tracing::info!("Starting at task {} subtask {}", start_task, start_subtask);

        let instructions = render_prompt(&prompts_dir.join(SYSTEM_PROMPT_FILE), &context)?;

        let llm = match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(&self.config.agent)?,
        };
        let registry = project_tools(
            &project_dir,
            self.config.tools.shell.allowed_commands.clone(),
            self.config.tools.timeout_secs,
        );
        tracing::debug!("Registered tools: {:?}", registry.tool_names());
        let executor = Arc::new(ToolExecutor::new(registry, self.config.tools.timeout_secs));

        let agent = ReactAgent::new(llm.clone(), executor)
            .with_window(self.config.history)
            .with_max_steps(self.config.agent.max_steps);

        let mut step = AgentStep::new(Arc::new(agent), self.confirmer.clone(), instructions)
            .with_prompt_context(context)
            .with_window(self.config.history);
        let mut orchestrator_tx = None;
        if let Some(tx) = &self.event_tx {
            step = step.with_event_tx(tx.clone());
            orchestrator_tx = Some(tx.clone());
        }

        let mut orchestrator = Orchestrator::new(step);
        if let Some(tx) = orchestrator_tx {
            orchestrator = orchestrator.with_event_tx(tx);
        }

        let result = orchestrator
            .start(&prompts_dir.join(TASKS_DIR), start_task, start_subtask, &cancel)
            .await;

        let (prompt, completion, total) = llm.token_usage();
        tracing::info!(prompt, completion, total, "token usage");

        let summary = result?;
        match &summary {
            RunSummary::Completed { message, .. } => tracing::info!("{}", message),
            RunSummary::Parked {
                task_index,
                subtask_index,
                task,
                subtask,
            } => tracing::info!(
                "Parked at {}/{}; resume with range {}:{}",
                task,
                subtask,
                task_index,
                subtask_index
            ),
        }
        Ok(summary)
    }
}

fn absolute(dir: &Path) -> Result<PathBuf, PilotError> {
    if !dir.is_dir() {
        return Err(PilotError::NotFound(dir.to_path_buf()));
    }
    dir.canonicalize().map_err(|e| PilotError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StaticConfirmer;

    #[test]
    fn test_mock_backend_needs_no_key() {
        let agent = AgentSection {
            mock: true,
            ..AgentSection::default()
        };
        assert!(create_llm_from_config(&agent).is_ok());
    }

    #[tokio::test]
    async fn test_missing_project_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let launcher = WorkflowLauncher::new(
            AppConfig::default(),
            Arc::new(StaticConfirmer::approve_all()),
        );
        let err = launcher
            .run(
                &dir.path().join("absent"),
                dir.path(),
                0,
                0,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::NotFound(_)));
    }
}
