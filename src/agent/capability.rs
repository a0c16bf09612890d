//! 智能体能力边界
//!
//! AgentStep 通过 AgentCapability 运行一轮：(instructions, 历史, 用户输入) -> 片段流。
//! 片段流必须被完整消费；Text 片段按到达顺序拼接为本轮原始输出，其余片段只用于观测。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use crate::core::PilotError;
use crate::memory::Message;

/// 一轮智能体循环输出的片段
#[derive(Debug, Clone, PartialEq)]
pub enum AgentFragment {
    /// 推理/思考内容
    Reasoning(String),
    /// 工具调用
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    /// 工具返回；failed 为 true 时 output 是错误信息
    ToolResult {
        id: String,
        output: String,
        failed: bool,
    },
    /// 普通文本
    Text(String),
}

/// 片段流
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<AgentFragment, PilotError>> + Send>>;

/// 单轮请求
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// 系统指令（已渲染）
    pub instructions: String,
    /// 已经过 HistoryWindow 截取的历史
    pub history: Vec<Message>,
    /// 本轮用户输入：子任务内容，或确认后的回答文本
    pub input: String,
}

/// 外部智能体能力：运行一轮，返回按顺序交付的片段流
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, PilotError>;
}
