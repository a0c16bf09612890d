//! 工作集：任务目录与子任务文件
//!
//! 任务 = 根目录下的直接子目录；子任务 = 任务目录内扩展名为 `.md` 的文件。两者都按名称字典序排列，
//! 根目录缺失返回 NotFound，列表为空返回 EmptyWorkset。

use std::path::{Path, PathBuf};

use crate::core::error::{PilotError, WorksetLevel};

/// 子任务文件的固定扩展名
pub const SUBTASK_EXTENSION: &str = "md";

/// 单个子任务：标题（文件名去扩展名）+ 内容引用（prompt 文件路径）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub title: String,
    pub path: PathBuf,
}

/// 单个任务：标题（目录名）+ 目录路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub title: String,
    pub dir: PathBuf,
}

impl Task {
    /// 列出该任务下的子任务，按文件名排序
    pub fn load_subtasks(&self) -> Result<Vec<Subtask>, PilotError> {
        let mut files = list_entries(&self.dir, |path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext == SUBTASK_EXTENSION)
                    .unwrap_or(false)
        })?;
        if files.is_empty() {
            return Err(PilotError::EmptyWorkset {
                level: WorksetLevel::Subtask,
                dir: self.dir.clone(),
            });
        }
        files.sort();
        Ok(files
            .into_iter()
            .map(|path| Subtask {
                title: file_title(&path),
                path,
            })
            .collect())
    }
}

/// 有序任务列表，启动时加载一次，之后不可变
#[derive(Debug, Clone)]
pub struct TaskList {
    root: PathBuf,
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PilotError> {
        let root = root.as_ref().to_path_buf();
        let mut dirs = list_entries(&root, Path::is_dir)?;
        if dirs.is_empty() {
            return Err(PilotError::EmptyWorkset {
                level: WorksetLevel::Task,
                dir: root,
            });
        }
        dirs.sort();
        let tasks = dirs
            .into_iter()
            .map(|dir| Task {
                title: file_title(&dir),
                dir,
            })
            .collect();
        Ok(Self { root, tasks })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// 列出目录下满足条件的条目；目录不存在时返回 NotFound
fn list_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, PilotError> {
    if !dir.is_dir() {
        return Err(PilotError::NotFound(dir.to_path_buf()));
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| PilotError::io(dir, e))? {
        let path = entry.map_err(|e| PilotError::io(dir, e))?.path();
        if keep(&path) {
            out.push(path);
        }
    }
    Ok(out)
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
