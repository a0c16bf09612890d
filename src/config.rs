//! 应用配置：从程序目录下的 taskpilot.toml、可选的 --config 文件与环境变量加载
//!
//! 加载顺序：内置默认值 -> `<program>/taskpilot.toml` -> `--config` 文件 -> 环境变量 `TASKPILOT__*`
//! （双下划线表示嵌套，如 `TASKPILOT__AGENT__MODEL=openai/gpt-5.1-codex-max`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::agent::react::DEFAULT_MAX_STEPS;
use crate::core::PilotError;
use crate::memory::HistoryWindow;
use crate::tools::default_allowed_commands;

/// 程序目录下的默认配置文件名
pub const CONFIG_FILE_NAME: &str = "taskpilot.toml";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "TASKPILOT";

/// 应用配置根
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub history: HistoryWindow,
    pub tools: ToolsSection,
    pub paths: PathsSection,
}

/// [agent] 段：模型端点与单轮步数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 未设置时回退到环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// 使用 ScriptedLlmClient（不访问网络）
    #[serde(default)]
    pub mock: bool,
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-5.1-codex-max".to_string()
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            max_steps: default_max_steps(),
            mock: false,
        }
    }
}

impl AgentSection {
    /// 配置中的 api_key，或环境变量 OPENAI_API_KEY；mock 模式下不需要
    pub fn resolve_api_key(&self) -> Result<String, PilotError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                PilotError::Config(
                    "agent.api_key is not set (or set OPENAI_API_KEY / TASKPILOT__AGENT__API_KEY)"
                        .to_string(),
                )
            })
    }
}

/// [tools] 段：工具超时与 Shell 白名单
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub shell: ShellSection,
}

fn default_tool_timeout_secs() -> u64 {
    120
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            shell: ShellSection::default(),
        }
    }
}

/// [tools.shell] 段：允许执行的命令名（仅首词）
#[derive(Debug, Clone, Deserialize)]
pub struct ShellSection {
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
        }
    }
}

/// [paths] 段：相对路径以程序目录为基准
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    /// 默认 `<program>/prompts`
    pub prompts_dir: Option<PathBuf>,
    /// 默认 `<program>/references`
    pub references_dir: Option<PathBuf>,
}

impl PathsSection {
    pub fn prompts_dir(&self, program_dir: &Path) -> PathBuf {
        resolve_dir(program_dir, self.prompts_dir.as_deref(), "prompts")
    }

    pub fn references_dir(&self, program_dir: &Path) -> PathBuf {
        resolve_dir(program_dir, self.references_dir.as_deref(), "references")
    }
}

fn resolve_dir(program_dir: &Path, configured: Option<&Path>, default: &str) -> PathBuf {
    match configured {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => program_dir.join(dir),
        None => program_dir.join(default),
    }
}

/// 加载配置
///
/// 1. `<program_dir>/taskpilot.toml` 存在则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 TASKPILOT__*
pub fn load_config(program_dir: &Path, config_path: Option<&Path>) -> Result<AppConfig, PilotError> {
    let mut builder = config::Config::builder();

    let default_file = program_dir.join(CONFIG_FILE_NAME);
    if default_file.exists() {
        builder = builder.add_source(config::File::from(default_file).required(false));
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| PilotError::Config(e.to_string()))
}
