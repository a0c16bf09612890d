//! ReactAgent：基于 LlmClient + ToolExecutor 的 ReAct 工具循环，实现 AgentCapability
//!
//! 每轮：system（指令 + 工具目录 + 输出格式）+ 截取后的工作上下文 -> LLM。
//! 输出含 `{"tool": .., "args": ..}` 时执行工具并把调用与结果追加到工作上下文后继续；否则作为 Text 交付并结束本轮。
//! 循环在独立任务中运行，片段经 channel 按顺序交付。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::capability::{AgentCapability, AgentFragment, FragmentStream, TurnRequest};
use crate::agent::result::result_schema_json;
use crate::core::PilotError;
use crate::llm::LlmClient;
use crate::memory::{HistoryWindow, Message};
use crate::tools::{tool_call_schema_json, ToolExecutor};

/// 单轮默认最多工具往返次数
pub const DEFAULT_MAX_STEPS: usize = 50;

/// 片段 channel 容量
const FRAGMENT_BUFFER: usize = 32;

/// LLM 返回的 Tool Call（`{"tool": "read_file", "args": {"path": "..."}}`）
#[derive(Debug, Clone, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// 一次 LLM 输出的解读
#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// 工具调用，前面可能带一段推理文字
    Tool {
        reasoning: Option<String>,
        name: String,
        args: serde_json::Value,
    },
    /// 最终输出
    Final(String),
}

/// 有 JSON 且 tool 非空则为工具调用，其余一律视为最终输出
fn interpret(output: &str) -> Step {
    let trimmed = output.trim();
    let Some(start) = trimmed.find('{') else {
        return Step::Final(output.to_string());
    };
    let Some(end) = trimmed.rfind('}').filter(|end| *end > start) else {
        return Step::Final(output.to_string());
    };

    match serde_json::from_str::<ToolCall>(&trimmed[start..=end]) {
        Ok(call) if !call.tool.is_empty() => {
            let prefix = trimmed[..start].trim().trim_end_matches("```json").trim();
            Step::Tool {
                reasoning: (!prefix.is_empty()).then(|| prefix.to_string()),
                name: call.tool,
                args: call.args,
            }
        }
        _ => Step::Final(output.to_string()),
    }
}

/// 内置智能体能力
pub struct ReactAgent {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    window: HistoryWindow,
    max_steps: usize,
}

impl ReactAgent {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            llm,
            executor,
            window: HistoryWindow::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_window(mut self, window: HistoryWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// 拼接 system prompt：指令、可用工具、工具调用格式、最终结果格式
    pub fn system_prompt(&self, instructions: &str) -> String {
        format!(
            "{instructions}\n\n## Available tools\n{}\n\n## Tool call format\nTo call a tool, reply with a single JSON object:\n{}\n\n## Final result format\nWhen the task is done, failed, or needs confirmation, reply with a single JSON object:\n{}",
            self.executor.catalogue(),
            tool_call_schema_json(),
            result_schema_json(),
        )
    }
}

#[async_trait]
impl AgentCapability for ReactAgent {
    async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, PilotError> {
        let (tx, mut rx) = mpsc::channel(FRAGMENT_BUFFER);
        let mut context = request.history;
        context.push(Message::user(request.input));

        let turn = ReactTurn {
            llm: self.llm.clone(),
            executor: self.executor.clone(),
            window: self.window,
            max_steps: self.max_steps,
            system: Message::system(self.system_prompt(&request.instructions)),
            tx,
        };
        tokio::spawn(turn.run(context, cancel));

        Ok(Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx))))
    }
}

/// 一轮循环在 spawn 出去的任务里拥有的状态
struct ReactTurn {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    window: HistoryWindow,
    max_steps: usize,
    system: Message,
    tx: mpsc::Sender<Result<AgentFragment, PilotError>>,
}

impl ReactTurn {
    /// 接收端已关闭时返回 false
    async fn emit(&self, fragment: AgentFragment) -> bool {
        self.tx.send(Ok(fragment)).await.is_ok()
    }

    async fn run(self, mut context: Vec<Message>, cancel: CancellationToken) {
        for step in 0..self.max_steps {
            let mut messages = vec![self.system.clone()];
            messages.extend(self.window.reduce(&context));

            tracing::debug!(step, messages = messages.len(), "calling LLM");
            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                output = self.llm.complete(&messages) => output,
            };
            let output = match output {
                Ok(output) => output,
                Err(e) => {
                    let _ = self.tx.send(Err(PilotError::Llm(e))).await;
                    return;
                }
            };
            tracing::trace!("LLM output: {}", output);

            let (reasoning, name, args) = match interpret(&output) {
                Step::Final(text) => {
                    self.emit(AgentFragment::Text(text)).await;
                    return;
                }
                Step::Tool {
                    reasoning,
                    name,
                    args,
                } => (reasoning, name, args),
            };

            if let Some(text) = reasoning {
                context.push(Message::reasoning(text.clone()));
                if !self.emit(AgentFragment::Reasoning(text)).await {
                    return;
                }
            }

            let id = uuid::Uuid::new_v4().to_string();
            context.push(Message::tool_call(id.clone(), name.clone(), args.clone()));
            if !self
                .emit(AgentFragment::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    args: args.clone(),
                })
                .await
            {
                return;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = self.executor.execute(&name, args) => result,
            };
            let (output, failed) = match result {
                Ok(output) => (output, false),
                Err(e) => (e.to_string(), true),
            };
            context.push(Message::tool_result(id.clone(), output.clone(), failed));
            if !self
                .emit(AgentFragment::ToolResult { id, output, failed })
                .await
            {
                return;
            }
        }

        tracing::warn!("Turn reached the limit of {} tool steps", self.max_steps);
        self.emit(AgentFragment::Text(format!(
            "Stopped after reaching the limit of {} tool steps without a final result.",
            self.max_steps
        )))
        .await;
    }
}
