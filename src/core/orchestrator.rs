//! 任务/子任务编排器：主控状态机
//!
//! Idle -> Running(任务 i, 子任务 j) -> Running(i, j+1) | Running(i+1, 0) | Terminal。
//! 信号：RunSubtask（派发给 AgentStep）、SubtaskAdvance（子任务成功）、TaskAdvance（任务内子任务耗尽）。
//! failure 不重试，直接作为致命错误终止整个运行，游标保留在出错位置供人检查。

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agent::step::StepOutcome;
use crate::core::error::WorksetLevel;
use crate::core::events::{send_event, PilotEvent};
use crate::core::workset::{Subtask, Task, TaskList};
use crate::core::PilotError;

/// 可被编排器派发子任务的执行者（AgentStep 实现）
#[async_trait]
pub trait SubtaskRunner: Send + Sync {
    async fn run_subtask(
        &self,
        subtask: &Subtask,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, PilotError>;
}

/// 编排游标：唯一的可变编排状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub task: usize,
    pub subtask: usize,
}

/// 状态机内部信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    RunSubtask(Subtask),
    SubtaskAdvance,
    TaskAdvance,
}

/// 一次运行的结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSummary {
    /// 全部任务完成；message 为终止摘要
    Completed { task_count: usize, message: String },
    /// 用户拒绝确认，停在该子任务；以 task_index:subtask_index 重新启动即可继续
    Parked {
        task_index: usize,
        subtask_index: usize,
        task: String,
        subtask: String,
    },
}

pub fn completion_message(task_count: usize) -> String {
    format!("{} tasks completed successfully.", task_count)
}

/// 编排器：独占任务列表、当前任务的子任务列表与游标
pub struct Orchestrator<R> {
    runner: R,
    tasks: Option<TaskList>,
    subtasks: Vec<Subtask>,
    cursor: Cursor,
    event_tx: Option<UnboundedSender<PilotEvent>>,
}

impl<R: SubtaskRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            tasks: None,
            subtasks: Vec::new(),
            cursor: Cursor::default(),
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<PilotEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// 是否处于空闲状态（未开始，或已全部完成）
    pub fn is_idle(&self) -> bool {
        self.tasks.is_none()
    }

    /// 枚举 root 下的任务，从给定偏移开始派发，直到全部完成、被拒绝或出错
    pub async fn start(
        &mut self,
        root: &Path,
        start_task: usize,
        start_subtask: usize,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PilotError> {
        let result = self.start_inner(root, start_task, start_subtask, cancel).await;
        if let Err(e) = &result {
            tracing::error!("Run stopped at task {} subtask {}: {}", self.cursor.task, self.cursor.subtask, e);
            send_event(&self.event_tx, PilotEvent::Failed { text: e.to_string() });
        }
        result
    }

    async fn start_inner(
        &mut self,
        root: &Path,
        start_task: usize,
        start_subtask: usize,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PilotError> {
        self.tasks = None;
        self.subtasks.clear();
        self.cursor = Cursor::default();

        tracing::info!("Reading tasks from: {}", root.display());
        let tasks = TaskList::load(root)?;

        tracing::info!("{} tasks found: ", tasks.len());
        for task in tasks.tasks() {
            tracing::info!(" * {}", task.title);
        }
        send_event(
            &self.event_tx,
            PilotEvent::TasksLoaded {
                titles: tasks.tasks().iter().map(|t| t.title.clone()).collect(),
            },
        );

        let task = tasks
            .get(start_task)
            .ok_or_else(|| PilotError::OffsetOutOfRange {
                level: WorksetLevel::Task,
                index: start_task,
                len: tasks.len(),
            })?;
        let subtasks = self.load_subtasks(task, start_subtask)?;

        // 偏移全部有效后才占用状态
        self.tasks = Some(tasks);
        self.subtasks = subtasks;
        self.cursor = Cursor {
            task: start_task,
            subtask: start_subtask,
        };
        let first = self.dispatch();
        self.drive(first, cancel).await
    }

    /// 事件循环：依次处理信号直到终止或停驻
    async fn drive(
        &mut self,
        mut signal: Signal,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PilotError> {
        loop {
            signal = match signal {
                Signal::RunSubtask(subtask) => {
                    if cancel.is_cancelled() {
                        return Err(PilotError::Cancelled);
                    }
                    match self.runner.run_subtask(&subtask, cancel).await? {
                        StepOutcome::Completed => Signal::SubtaskAdvance,
                        StepOutcome::Declined { .. } => return Ok(self.park(&subtask)),
                    }
                }
                Signal::SubtaskAdvance => self.on_subtask_advance(),
                Signal::TaskAdvance => match self.on_task_advance()? {
                    Some(next) => next,
                    None => return Ok(self.finish()),
                },
            };
        }
    }

    /// 加载游标所指任务的子任务列表，并派发 start_subtask 处的子任务
    fn enter_task(&mut self, start_subtask: usize) -> Result<Signal, PilotError> {
        let task = self
            .tasks
            .as_ref()
            .and_then(|t| t.get(self.cursor.task))
            .cloned()
            .ok_or_else(|| PilotError::OffsetOutOfRange {
                level: WorksetLevel::Task,
                index: self.cursor.task,
                len: self.tasks.as_ref().map(TaskList::len).unwrap_or(0),
            })?;

        self.subtasks = self.load_subtasks(&task, start_subtask)?;
        self.cursor.subtask = start_subtask;
        Ok(self.dispatch())
    }

    /// 读取任务的子任务列表并校验起始偏移；不改动编排器状态
    fn load_subtasks(&self, task: &Task, start_subtask: usize) -> Result<Vec<Subtask>, PilotError> {
        tracing::info!("Reading subtasks from: {}", task.dir.display());
        let subtasks = task.load_subtasks()?;

        tracing::info!("{} subtasks found: ", subtasks.len());
        for subtask in &subtasks {
            tracing::info!(" * {}", subtask.title);
        }
        send_event(
            &self.event_tx,
            PilotEvent::SubtasksLoaded {
                task: task.title.clone(),
                titles: subtasks.iter().map(|s| s.title.clone()).collect(),
            },
        );

        if start_subtask >= subtasks.len() {
            return Err(PilotError::OffsetOutOfRange {
                level: WorksetLevel::Subtask,
                index: start_subtask,
                len: subtasks.len(),
            });
        }
        Ok(subtasks)
    }

    /// 生成当前游标处的 RunSubtask
    fn dispatch(&self) -> Signal {
        let subtask = self.subtasks[self.cursor.subtask].clone();
        send_event(
            &self.event_tx,
            PilotEvent::RunSubtask {
                task_index: self.cursor.task,
                subtask_index: self.cursor.subtask,
                task: self.current_task_title(),
                subtask: subtask.title.clone(),
            },
        );
        Signal::RunSubtask(subtask)
    }

    fn on_subtask_advance(&mut self) -> Signal {
        let count = self.subtasks.len();
        if self.cursor.subtask + 1 >= count {
            tracing::info!("All {} subtasks have been completed successfully.", count);
            send_event(
                &self.event_tx,
                PilotEvent::TaskCompleted {
                    task: self.current_task_title(),
                    subtasks: count,
                },
            );
            self.subtasks.clear();
            self.cursor.subtask = 0;
            return Signal::TaskAdvance;
        }

        self.cursor.subtask += 1;
        tracing::info!(
            "Requesting to process the next subtask: {}",
            self.subtasks[self.cursor.subtask].title
        );
        self.dispatch()
    }

    /// 返回 None 表示任务已全部完成
    fn on_task_advance(&mut self) -> Result<Option<Signal>, PilotError> {
        let count = self.tasks.as_ref().map(TaskList::len).unwrap_or(0);
        if self.cursor.task + 1 >= count {
            tracing::info!("No more tasks to process.");
            return Ok(None);
        }

        self.cursor.task += 1;
        self.cursor.subtask = 0;
        tracing::info!(
            "Requesting to process the next task: {}",
            self.current_task_title()
        );
        self.enter_task(0).map(Some)
    }

    fn finish(&mut self) -> RunSummary {
        let task_count = self.tasks.as_ref().map(TaskList::len).unwrap_or(0);
        let message = completion_message(task_count);
        send_event(
            &self.event_tx,
            PilotEvent::Completed {
                task_count,
                message: message.clone(),
            },
        );

        self.tasks = None;
        self.subtasks.clear();
        self.cursor = Cursor::default();

        RunSummary::Completed {
            task_count,
            message,
        }
    }

    fn park(&self, subtask: &Subtask) -> RunSummary {
        tracing::warn!(
            "Run parked at task {} subtask {} ({}); restart with range {}:{} to continue.",
            self.cursor.task,
            self.cursor.subtask,
            subtask.title,
            self.cursor.task,
            self.cursor.subtask
        );
        send_event(
            &self.event_tx,
            PilotEvent::Parked {
                task_index: self.cursor.task,
                subtask_index: self.cursor.subtask,
            },
        );
        RunSummary::Parked {
            task_index: self.cursor.task,
            subtask_index: self.cursor.subtask,
            task: self.current_task_title(),
            subtask: subtask.title.clone(),
        }
    }

    fn current_task_title(&self) -> String {
        self.tasks
            .as_ref()
            .and_then(|t| t.get(self.cursor.task))
            .map(|t| t.title.clone())
            .unwrap_or_default()
    }
}
