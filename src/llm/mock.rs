//! Scripted LLM 客户端（用于测试与 `agent.mock`，无需 API）
//!
//! 按顺序回放预置输出；脚本耗尽后返回 fallback，并记录每次调用收到的消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::Message;

/// 脚本耗尽后的默认输出：直接报告成功
pub const SCRIPT_FALLBACK: &str = r#"{"result": "success", "message": ""}"#;

#[derive(Debug)]
pub struct ScriptedLlmClient {
    outputs: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl ScriptedLlmClient {
    pub fn new<S: Into<String>>(outputs: impl IntoIterator<Item = S>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(|s| Ok(s.into())).collect()),
            fallback: SCRIPT_FALLBACK.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// 追加一次调用失败
    pub fn push_error(&self, error: impl Into<String>) {
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.push_back(Err(error.into()));
        }
    }

    /// 每次 complete 收到的完整消息列表
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .outputs
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
