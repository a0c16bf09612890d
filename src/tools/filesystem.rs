//! 沙箱文件系统工具
//!
//! SafeFs 绑定项目根目录，所有路径必须落在根下（禁止绝对路径与 ../ 逃逸）；
//! ReadFileTool / WriteFileTool / ListDirTool 基于 SafeFs 提供读、写、列目录能力。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::PilotError;
use crate::tools::Tool;

/// 沙箱文件系统：绑定根目录，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 词法校验并拼接到根目录下；目标可以尚不存在（供写入使用）
    pub fn join(&self, path: &str) -> Result<PathBuf, PilotError> {
        let relative = Path::new(path.trim_start_matches("./"));
        let escapes = relative.components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if escapes {
            return Err(PilotError::PathEscape(path.to_string()));
        }
        Ok(self.root_dir.join(relative))
    }

    /// 解析已存在的路径，并确认其真实位置（跟随符号链接后）仍在根下
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PilotError> {
        let full = self.join(path)?;
        let canonical = full
            .canonicalize()
            .map_err(|_| PilotError::ToolFailed(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(PilotError::PathEscape(path.to_string()))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, PilotError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| PilotError::ToolFailed(format!("Read failed: {}", e)))
    }

    /// 写入文件（覆盖），按需创建父目录；返回写入字节数
    ///
    /// 创建目录前先校验最近的已存在祖先，目标本身是符号链接时其指向也必须在根下。
    pub fn write_file(&self, path: &str, content: &str) -> Result<usize, PilotError> {
        let target = self.join(path)?;
        if let Some(parent) = target.parent() {
            let existing = parent
                .ancestors()
                .find(|p| p.symlink_metadata().is_ok())
                .unwrap_or(self.root_dir.as_path());
            self.ensure_inside(existing, path)?;
            std::fs::create_dir_all(parent)
                .map_err(|e| PilotError::ToolFailed(format!("Failed to create parent directory: {}", e)))?;
            self.ensure_inside(parent, path)?;
        }
        let is_link = target
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            self.ensure_inside(&target, path)?;
        }
        std::fs::write(&target, content)
            .map_err(|e| PilotError::ToolFailed(format!("Write failed: {}", e)))?;
        Ok(content.len())
    }

    /// 跟随符号链接后仍须落在根下；无法解析（如悬空链接）同样视为逃逸
    fn ensure_inside(&self, full: &Path, path: &str) -> Result<(), PilotError> {
        match full.canonicalize() {
            Ok(canonical) if canonical.starts_with(&self.root_dir) => Ok(()),
            _ => Err(PilotError::PathEscape(path.to_string())),
        }
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, PilotError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| PilotError::ToolFailed(format!("List failed: {}", e)))?
        {
            let e = e.map_err(|e| PilotError::ToolFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn path_schema(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": description }
        },
        "required": ["path"]
    })
}

/// 读取文件内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file in the project. Args: {\"path\": \"file path relative to the project root\"}"
    }

    fn parameters_schema(&self) -> Value {
        path_schema("File path relative to the project root")
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = str_arg(&args, "path").ok_or("Missing argument: path")?;
        tracing::debug!(path = %path, "read_file tool execute");
        self.fs.read_file(path).map_err(|e| e.to_string())
    }
}

/// 写入文件（整体覆盖）
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the project. Args: {\"path\": \"relative path\", \"content\": \"full file content\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the project root" },
                "content": { "type": "string", "description": "Complete new file content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = str_arg(&args, "path").ok_or("Missing argument: path")?;
        let content = str_arg(&args, "content").ok_or("Missing argument: content")?;
        tracing::debug!(path = %path, bytes = content.len(), "write_file tool execute");
        let written = self.fs.write_file(path, content).map_err(|e| e.to_string())?;
        Ok(format!("Wrote {} bytes to {}", written, path))
    }
}

/// 列出目录
pub struct ListDirTool {
    fs: SafeFs,
}

impl ListDirTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List a directory in the project; subdirectories end with '/'. Args: {\"path\": \"directory path, default '.'\"}"
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Directory path relative to the project root, default '.'")
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = str_arg(&args, "path").unwrap_or(".");
        tracing::debug!(path = %path, "list_dir tool execute");
        let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
        Ok(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn project() -> (TempDir, SafeFs) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        let fs = SafeFs::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_read_and_list() {
        let (_dir, fs) = project();
        let read = ReadFileTool::new(fs.clone());
        let list = ListDirTool::new(fs);

        assert_eq!(
            read.execute(json!({"path": "./src/main.rs"})).await.unwrap(),
            "fn main() {}"
        );
        assert_eq!(list.execute(json!({})).await.unwrap(), "src/");
        assert_eq!(list.execute(json!({"path": "src"})).await.unwrap(), "main.rs");
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let (dir, fs) = project();
        let write = WriteFileTool::new(fs);

        let out = write
            .execute(json!({"path": "src/models/user.rs", "content": "pub struct User;"}))
            .await
            .unwrap();
        assert_eq!(out, "Wrote 16 bytes to src/models/user.rs");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/models/user.rs")).unwrap(),
            "pub struct User;"
        );
    }

    #[tokio::test]
    async fn test_escape_is_rejected() {
        let (_dir, fs) = project();
        assert!(matches!(fs.join("../outside.txt"), Err(PilotError::PathEscape(_))));
        assert!(matches!(fs.join("/etc/passwd"), Err(PilotError::PathEscape(_))));

        let write = WriteFileTool::new(fs);
        let err = write
            .execute(json!({"path": "src/../../evil.rs", "content": "x"}))
            .await
            .unwrap_err();
        assert!(err.contains("Path escape"));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_through_symlinked_file_is_rejected() {
        let (dir, fs) = project();
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, "keep").unwrap();
        std::os::unix::fs::symlink(&secret, dir.path().join("link.txt")).unwrap();

        let err = fs.write_file("link.txt", "pwned").unwrap_err();
        assert!(matches!(err, PilotError::PathEscape(_)));
        assert_eq!(std::fs::read_to_string(&secret).unwrap(), "keep");
    }

    #[cfg(unix)]
    #[test]
    fn test_no_directories_created_through_symlinked_dir() {
        let (dir, fs) = project();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("out")).unwrap();

        let err = fs.write_file("out/newdir/x.txt", "x").unwrap_err();
        assert!(matches!(err, PilotError::PathEscape(_)));
        assert!(!outside.path().join("newdir").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_rejected() {
        let (dir, fs) = project();
        std::os::unix::fs::symlink("/nonexistent/taskpilot/target", dir.path().join("ghost.rs"))
            .unwrap();

        let err = fs.write_file("ghost.rs", "x").unwrap_err();
        assert!(matches!(err, PilotError::PathEscape(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_is_allowed() {
        let (dir, fs) = project();
        std::os::unix::fs::symlink(dir.path().join("src/main.rs"), dir.path().join("entry.rs"))
            .unwrap();

        assert_eq!(fs.write_file("entry.rs", "fn main() { }").unwrap(), 13);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/main.rs")).unwrap(),
            "fn main() { }"
        );
    }

    #[tokio::test]
    async fn test_missing_args_and_files() {
        let (_dir, fs) = project();
        let read = ReadFileTool::new(fs);
        assert_eq!(read.execute(json!({})).await.unwrap_err(), "Missing argument: path");
        assert!(read
            .execute(json!({"path": "nope.rs"}))
            .await
            .unwrap_err()
            .contains("Path not found"));
    }
}
