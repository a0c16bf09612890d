//! 记忆层：单个子任务的对话历史，以及发送前的历史窗口截取

pub mod conversation;
pub mod window;

pub use conversation::{ConversationHistory, Message, MessageBody, Role};
pub use window::HistoryWindow;
