//! 对话历史
//!
//! 一个子任务的智能体循环所交换的全部消息：文本、推理、工具调用、工具结果。
//! 由 AgentStep 独占；确认后继续同一线程时保留，新子任务开始时丢弃。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，另加 Tool）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 消息内容
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Reasoning { text: String },
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        id: String,
        output: String,
        failed: bool,
    },
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub body: MessageBody,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: MessageBody::Text {
                text: content.into(),
            },
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::Text {
                text: content.into(),
            },
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            body: MessageBody::Text {
                text: content.into(),
            },
        }
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::Reasoning {
                text: content.into(),
            },
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::ToolCall {
                id: id.into(),
                name: name.into(),
                args,
            },
        }
    }

    pub fn tool_result(id: impl Into<String>, output: impl Into<String>, failed: bool) -> Self {
        Self {
            role: Role::Tool,
            body: MessageBody::ToolResult {
                id: id.into(),
                output: output.into(),
                failed,
            },
        }
    }

    /// 渲染为发给 LLM 的纯文本
    pub fn content(&self) -> String {
        match &self.body {
            MessageBody::Text { text } | MessageBody::Reasoning { text } => text.clone(),
            MessageBody::ToolCall { id, name, args } => {
                format!("Tool call [{}]: {} {}", id, name, args)
            }
            MessageBody::ToolResult { id, output, failed } => {
                if *failed {
                    format!("Tool result [{}] (error): {}", id, output)
                } else {
                    format!("Tool result [{}]: {}", id, output)
                }
            }
        }
    }
}

/// 单个子任务的对话历史（不自行剪枝，发送前由 HistoryWindow 截取）
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_messages_render_as_text() {
        let call = Message::tool_call("c1", "read_file", serde_json::json!({"path": "a.rs"}));
        assert_eq!(call.content(), r#"Tool call [c1]: read_file {"path":"a.rs"}"#);

        let failed = Message::tool_result("c1", "Path not found: a.rs", true);
        assert_eq!(failed.role, Role::Tool);
        assert!(failed.content().contains("(error)"));
    }

    #[test]
    fn test_history_keeps_everything() {
        let mut history = ConversationHistory::new();
        for i in 0..50 {
            history.push(Message::user(format!("m{i}")));
        }
        assert_eq!(history.len(), 50);
        history.clear();
        assert!(history.is_empty());
    }
}
