//! AgentStep：把一个子任务跑到结论
//!
//! 渲染子任务 prompt -> 运行一轮智能体（历史经 HistoryWindow 截取）-> 完整消费片段流 ->
//! 提取并解析结构化结果：success 结束、failure 致命、confirm 请求外部确认，批准后把回答作为下一轮输入继续同一对话。
//! 结果无法解析时不终止，而是转为一次确认请求（fail-open）。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agent::capability::{AgentCapability, AgentFragment, FragmentStream, TurnRequest};
use crate::agent::result::{extract_json, parse_structured_result, ResultError, StructuredResult};
use crate::core::confirm::{ConfirmRequest, ConfirmResponse, Confirmer};
use crate::core::events::{preview, send_event, PilotEvent};
use crate::core::orchestrator::SubtaskRunner;
use crate::core::workset::Subtask;
use crate::core::PilotError;
use crate::memory::{ConversationHistory, HistoryWindow, Message};
use crate::prompt::{render_prompt, PromptContext};

/// 工具结果预览最大字符数
const TOOL_PREVIEW_CHARS: usize = 200;

/// 子任务结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 智能体报告 success，编排器应前进到下一个子任务
    Completed,
    /// 用户拒绝继续，停在当前子任务
    Declined { text: String },
}

/// 结果无法解析时发给用户的固定提示
pub fn malformed_result_advisory(task: &str) -> String {
    format!(
        "The task was stopped unexpectedly. The result may be incomplete. Current task: {}",
        task
    )
}

/// 编码循环驱动器
pub struct AgentStep {
    capability: Arc<dyn AgentCapability>,
    confirmer: Arc<dyn Confirmer>,
    instructions: String,
    prompt_context: PromptContext,
    window: HistoryWindow,
    event_tx: Option<UnboundedSender<PilotEvent>>,
}

impl AgentStep {
    pub fn new(
        capability: Arc<dyn AgentCapability>,
        confirmer: Arc<dyn Confirmer>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            capability,
            confirmer,
            instructions: instructions.into(),
            prompt_context: PromptContext::default(),
            window: HistoryWindow::default(),
            event_tx: None,
        }
    }

    pub fn with_prompt_context(mut self, context: PromptContext) -> Self {
        self.prompt_context = context;
        self
    }

    pub fn with_window(mut self, window: HistoryWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<PilotEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 运行一个子任务直到 success / failure / 用户拒绝
    pub async fn run(
        &self,
        subtask: &Subtask,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, PilotError> {
        let task = subtask.title.as_str();
        let details = render_prompt(&subtask.path, &self.prompt_context)?;

        tracing::info!("Starting task: {}", task);
        tracing::debug!("Creating a new thread for the agent.");

        // 每个子任务一段新对话；确认后的重试沿用同一段
        let mut history = ConversationHistory::new();
        let mut input = details;

        loop {
            match self.turn(task, &mut history, &input, cancel).await? {
                StructuredResult::Success => {
                    tracing::info!("Task \"{}\" completed successfully.", task);
                    send_event(
                        &self.event_tx,
                        PilotEvent::SubtaskCompleted {
                            subtask: task.to_string(),
                        },
                    );
                    return Ok(StepOutcome::Completed);
                }
                StructuredResult::Failure { message } => {
                    return Err(PilotError::TaskFailed {
                        task: task.to_string(),
                        message,
                    });
                }
                StructuredResult::Confirm { message } => {
                    let response = self.request_confirmation(task, message, cancel).await?;
                    if !response.approved {
                        tracing::info!("User declined to proceed. Cancelling the task: {}", task);
                        return Ok(StepOutcome::Declined {
                            text: response.text,
                        });
                    }
                    tracing::info!("Received a confirmation to proceed: {}", response.text);
                    tracing::debug!("Using existing thread for the agent.");
                    input = response.text;
                }
            }
        }
    }

    /// 运行一轮并得到结论；未知 result 直接报错，无法解析转为 Confirm
    async fn turn(
        &self,
        task: &str,
        history: &mut ConversationHistory,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<StructuredResult, PilotError> {
        let request = TurnRequest {
            instructions: self.instructions.clone(),
            history: self.window.reduce(history.messages()),
            input: input.to_string(),
        };
        history.push(Message::user(input));

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PilotError::Cancelled),
            started = self.capability.run_turn(request, cancel.clone()) => started?,
        };
        let raw = self.drain(task, &mut stream, history, cancel).await?;

        let extracted = extract_json(&raw);
        tracing::trace!("Raw response: {}", extracted);

        match parse_structured_result(extracted) {
            Ok(result) => Ok(result),
            Err(ResultError::UnknownResult(result)) => Err(PilotError::UnknownResult {
                task: task.to_string(),
                result,
            }),
            Err(ResultError::Malformed(reason)) => {
                tracing::warn!(
                    "Failed to deserialize the response ({}): {}",
                    reason,
                    extracted
                );
                send_event(
                    &self.event_tx,
                    PilotEvent::MalformedResult {
                        subtask: task.to_string(),
                        raw: extracted.to_string(),
                    },
                );
                Ok(StructuredResult::Confirm {
                    message: malformed_result_advisory(task),
                })
            }
        }
    }

    /// 完整消费片段流：Text 拼接为原始输出，其余片段记录到历史与日志
    async fn drain(
        &self,
        task: &str,
        stream: &mut FragmentStream,
        history: &mut ConversationHistory,
        cancel: &CancellationToken,
    ) -> Result<String, PilotError> {
        let mut raw = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PilotError::Cancelled),
                next = stream.next() => next,
            };
            let Some(fragment) = next else { break };

            match fragment? {
                AgentFragment::Reasoning(text) => {
                    tracing::info!("{}", text);
                    send_event(
                        &self.event_tx,
                        PilotEvent::Reasoning {
                            subtask: task.to_string(),
                            text: text.clone(),
                        },
                    );
                    history.push(Message::reasoning(text));
                }
                AgentFragment::ToolCall { id, name, args } => {
                    tracing::trace!("[FuncCall][{}] {}({})", id, name, args);
                    send_event(
                        &self.event_tx,
                        PilotEvent::ToolCall {
                            subtask: task.to_string(),
                            id: id.clone(),
                            name: name.clone(),
                            args: args.clone(),
                        },
                    );
                    history.push(Message::tool_call(id, name, args));
                }
                AgentFragment::ToolResult { id, output, failed } => {
                    if failed {
                        tracing::warn!("[FuncResult][{}] The function failed: {}", id, output);
                    } else {
                        tracing::trace!("[FuncResult][{}] The function returned {}", id, output);
                    }
                    send_event(
                        &self.event_tx,
                        PilotEvent::ToolResult {
                            subtask: task.to_string(),
                            id: id.clone(),
                            preview: preview(&output, TOOL_PREVIEW_CHARS),
                            failed,
                        },
                    );
                    history.push(Message::tool_result(id, output, failed));
                }
                AgentFragment::Text(text) => raw.push_str(&text),
            }
        }

        if !raw.is_empty() {
            history.push(Message::assistant(raw.clone()));
        }
        Ok(raw)
    }

    /// 发出确认请求并等待唯一的回答
    async fn request_confirmation(
        &self,
        task: &str,
        message: String,
        cancel: &CancellationToken,
    ) -> Result<ConfirmResponse, PilotError> {
        tracing::debug!("Requesting user confirmation: {}", message);
        send_event(
            &self.event_tx,
            PilotEvent::ConfirmationRequested {
                subtask: task.to_string(),
                text: message.clone(),
            },
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PilotError::Cancelled),
            answer = self.confirmer.confirm(ConfirmRequest::new(message)) => answer?,
        };

        send_event(
            &self.event_tx,
            PilotEvent::ConfirmationAnswered {
                subtask: task.to_string(),
                approved: response.approved,
                text: response.text.clone(),
            },
        );
        Ok(response)
    }
}

#[async_trait]
impl SubtaskRunner for AgentStep {
    async fn run_subtask(
        &self,
        subtask: &Subtask,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, PilotError> {
        self.run(subtask, cancel).await
    }
}
