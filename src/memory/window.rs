//! 历史窗口：保留最早 head 条与最近 tail 条消息，丢弃中间部分
//!
//! 最早的消息通常是任务框架（子任务说明），最近的是近期工具交互；每轮发送的消息条数因此与工具往返次数无关。
//! 被丢弃的中间部分不做摘要，只是不再发送。

use serde::Deserialize;

pub const DEFAULT_HEAD: usize = 2;
pub const DEFAULT_TAIL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HistoryWindow {
    pub head: usize,
    pub tail: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self {
            head: DEFAULT_HEAD,
            tail: DEFAULT_TAIL,
        }
    }
}

impl HistoryWindow {
    pub fn new(head: usize, tail: usize) -> Self {
        Self { head, tail }
    }

    /// 长度小于 head + tail 时原样返回；否则返回前 head 条 + 后 tail 条，保持原有顺序
    pub fn reduce<T: Clone>(&self, messages: &[T]) -> Vec<T> {
        let len = messages.len();
        if len < self.head + self.tail {
            return messages.to_vec();
        }
        let mut out = Vec::with_capacity(self.head + self.tail);
        out.extend_from_slice(&messages[..self.head]);
        out.extend_from_slice(&messages[len - self.tail..]);
        out
    }
}
