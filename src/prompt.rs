//! Prompt 渲染：读取 prompt 文件，用项目上下文替换 `{{ projectname }}` 等占位符

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;

use crate::core::PilotError;

/// 模板变量：系统指令与每个子任务文件共用
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub projectname: String,
    pub projectdir: String,
    pub referencesdir: String,
}

impl PromptContext {
    pub fn new(project_dir: &Path, references_dir: &Path) -> Self {
        Self {
            projectname: project_dir
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            projectdir: project_dir.display().to_string(),
            referencesdir: references_dir.display().to_string(),
        }
    }
}

/// 渲染模板文本；未定义的变量渲染为空
pub fn render_template(text: &str, context: &PromptContext) -> Result<String, PilotError> {
    let env = Environment::new();
    env.render_str(text, context)
        .map_err(|e| PilotError::Template(e.to_string()))
}

/// 读取并渲染 prompt 文件
pub fn render_prompt(path: &Path, context: &PromptContext) -> Result<String, PilotError> {
    tracing::debug!("Reading prompt from: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|e| PilotError::io(path, e))?;
    let prompt = render_template(&text, context)?;
    tracing::trace!("Using a prompt: {}", prompt);
    Ok(prompt)
}
