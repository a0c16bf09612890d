//! 编排错误类型与分类
//!
//! 所有库函数返回 `Result<_, PilotError>`；`kind()` 把错误归入 Setup / TaskFailure / Cancelled / Runtime，
//! 供 CLI 决定退出码。结果解析失败与用户拒绝确认不是错误，由 AgentStep 内部吸收。

use std::path::PathBuf;

use thiserror::Error;

/// 工作集层级：任务目录或子任务文件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorksetLevel {
    Task,
    Subtask,
}

impl std::fmt::Display for WorksetLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorksetLevel::Task => f.write_str("tasks"),
            WorksetLevel::Subtask => f.write_str("subtasks"),
        }
    }
}

/// 编排运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Directory '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("No {level} are found in the directory '{dir}'")]
    EmptyWorkset { level: WorksetLevel, dir: PathBuf },

    #[error("Start offset {index} is out of range: only {len} {level} available")]
    OffsetOutOfRange {
        level: WorksetLevel,
        index: usize,
        len: usize,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Task \"{task}\" failed with message: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Task \"{task}\" returned an unknown result: \"{result}\"")]
    UnknownResult { task: String, result: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Tool execution failed: {0}")]
    ToolFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Confirmation request was dropped without a response")]
    ConfirmationAbandoned,

    #[error("Cancelled")]
    Cancelled,
}

/// 错误大类：决定错误向上传播后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 开始工作前的准备失败（目录缺失、列表为空、偏移越界、配置）
    Setup,
    /// 智能体显式报告失败或返回未知结果，整个运行停止
    TaskFailure,
    /// 协作式取消
    Cancelled,
    /// 其余运行期错误（LLM、模板、I/O、确认通道中断）
    Runtime,
}

impl PilotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PilotError::NotFound(_)
            | PilotError::EmptyWorkset { .. }
            | PilotError::OffsetOutOfRange { .. }
            | PilotError::Config(_) => ErrorKind::Setup,
            PilotError::TaskFailed { .. } | PilotError::UnknownResult { .. } => {
                ErrorKind::TaskFailure
            }
            PilotError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Runtime,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PilotError::Io {
            path: path.into(),
            source,
        }
    }
}
