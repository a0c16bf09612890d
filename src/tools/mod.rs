//! 工具箱：读写文件、列目录、白名单 Shell、进度报告，以及带超时与审计的执行器

pub mod executor;
pub mod filesystem;
pub mod progress;
pub mod registry;
pub mod schema;
pub mod shell;

use std::path::Path;

pub use executor::ToolExecutor;
pub use filesystem::{ListDirTool, ReadFileTool, SafeFs, WriteFileTool};
pub use progress::ReportProgressTool;
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use shell::{default_allowed_commands, ShellTool};

/// 注册项目内置工具，全部限定在 project_dir 下
pub fn project_tools(project_dir: &Path, allowed_commands: Vec<String>, timeout_secs: u64) -> ToolRegistry {
    let fs = SafeFs::new(project_dir);
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(fs.clone()));
    registry.register(WriteFileTool::new(fs.clone()));
    registry.register(ListDirTool::new(fs.clone()));
    registry.register(ShellTool::new(allowed_commands, fs.root(), timeout_secs));
    registry.register(ReportProgressTool);
    registry
}
