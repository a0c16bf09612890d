//! TaskPilot - Rust 编码智能体编排器
//!
//! 模块划分：
//! - **agent**: 能力边界、结构化结果协议、子任务驱动器（AgentStep）、内置 ReAct 能力
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、工作集、确认端口、事件、任务/子任务编排器
//! - **launcher**: 一次项目运行的装配
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Scripted）
//! - **memory**: 对话历史与历史窗口
//! - **prompt**: prompt 文件模板渲染
//! - **tools**: 工具箱（读写文件、列目录、shell、进度报告）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod exit_codes;
pub mod launcher;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompt;
pub mod tools;

pub use crate::core::{ErrorKind, PilotError, RunSummary};
pub use launcher::WorkflowLauncher;
