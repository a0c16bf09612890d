//! 编排过程事件：任务/子任务进度、推理、工具调用、确认与终止，可序列化为 JSON 供前端展示

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// 单个过程事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PilotEvent {
    /// 任务列表已加载
    TasksLoaded { titles: Vec<String> },
    /// 某任务的子任务列表已加载
    SubtasksLoaded { task: String, titles: Vec<String> },
    /// 派发子任务给 AgentStep
    RunSubtask {
        task_index: usize,
        subtask_index: usize,
        task: String,
        subtask: String,
    },
    /// 智能体推理内容
    Reasoning { subtask: String, text: String },
    /// 调用工具
    ToolCall {
        subtask: String,
        id: String,
        name: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    ToolResult {
        subtask: String,
        id: String,
        preview: String,
        failed: bool,
    },
    /// 结构化结果无法解析，转为确认请求
    MalformedResult { subtask: String, raw: String },
    /// 等待外部确认
    ConfirmationRequested { subtask: String, text: String },
    /// 外部确认已回答
    ConfirmationAnswered {
        subtask: String,
        approved: bool,
        text: String,
    },
    /// 子任务成功
    SubtaskCompleted { subtask: String },
    /// 任务下全部子任务完成
    TaskCompleted { task: String, subtasks: usize },
    /// 全部任务完成（终止摘要）
    Completed { task_count: usize, message: String },
    /// 用户拒绝确认，停在当前子任务
    Parked {
        task_index: usize,
        subtask_index: usize,
    },
    /// 运行因错误终止
    Failed { text: String },
}

pub(crate) fn send_event(tx: &Option<UnboundedSender<PilotEvent>>, ev: PilotEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 按字符截断文本，超出 max_chars 时追加 `...`
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
