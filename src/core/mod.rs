//! 核心编排层：错误、工作集、确认端口、事件、主控状态机

pub mod confirm;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod workset;

pub use confirm::{
    ConfirmRequest, ConfirmResponse, ConfirmationPort, Confirmer, ConsoleConfirmer,
    PendingConfirmation, StaticConfirmer,
};
pub use error::{ErrorKind, PilotError, WorksetLevel};
pub(crate) use events::preview;
pub use events::PilotEvent;
pub use orchestrator::{Cursor, Orchestrator, RunSummary, Signal, SubtaskRunner};
pub use workset::{Subtask, Task, TaskList};
