//! 确认协议：编排器与外部决策者（人或自动审批）之间的请求/响应
//!
//! 每个挂起点只有一个在途请求；请求只携带提示文本，响应携带决定文本与是否批准。
//! 具体呈现方式由 Confirmer 实现决定：控制台、通道（供 UI / API 使用）、固定策略。

use std::io::{BufRead, Write};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::core::PilotError;

/// 未提供文本时的默认批准语
pub const DEFAULT_APPROVED_TEXT: &str = "Request confirmed. Proceed with the task.";
/// 未提供文本时的默认拒绝语
pub const DEFAULT_DENIED_TEXT: &str = "Request denied. Abort the task.";

/// 确认请求：只含提示文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmRequest {
    pub text: String,
}

impl ConfirmRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// 确认响应：决定文本 + 是否批准
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmResponse {
    pub text: String,
    pub approved: bool,
}

impl ConfirmResponse {
    /// 文本为空或全空白时替换为默认批准/拒绝语
    pub fn new(approved: bool, text: Option<String>) -> Self {
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| {
                if approved {
                    DEFAULT_APPROVED_TEXT.to_string()
                } else {
                    DEFAULT_DENIED_TEXT.to_string()
                }
            });
        Self { text, approved }
    }

    pub fn approve(text: Option<String>) -> Self {
        Self::new(true, text)
    }

    pub fn deny(text: Option<String>) -> Self {
        Self::new(false, text)
    }
}

/// 确认边界：发出请求并等待唯一的响应
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmResponse, PilotError>;
}

/// 固定策略：全部批准或全部拒绝（`--yes` 自动审批）
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmer {
    approved: bool,
}

impl StaticConfirmer {
    pub fn approve_all() -> Self {
        Self { approved: true }
    }

    pub fn deny_all() -> Self {
        Self { approved: false }
    }
}

#[async_trait]
impl Confirmer for StaticConfirmer {
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmResponse, PilotError> {
        tracing::info!(approved = self.approved, "Auto-answering confirmation: {}", request.text);
        Ok(ConfirmResponse::new(self.approved, None))
    }
}

/// 一个等待外部回答的确认；respond 消费自身，保证只回答一次
#[derive(Debug)]
pub struct PendingConfirmation {
    pub request: ConfirmRequest,
    responder: oneshot::Sender<ConfirmResponse>,
}

impl PendingConfirmation {
    pub fn respond(self, response: ConfirmResponse) {
        // 请求方已放弃（如被取消）时无人接收，忽略即可
        let _ = self.responder.send(response);
    }

    pub fn approve(self, text: Option<String>) {
        self.respond(ConfirmResponse::approve(text));
    }

    pub fn deny(self, text: Option<String>) {
        self.respond(ConfirmResponse::deny(text));
    }
}

/// 通道式确认端口：confirm 把请求投递到接收端，等待 PendingConfirmation 被回答
#[derive(Debug, Clone)]
pub struct ConfirmationPort {
    tx: mpsc::UnboundedSender<PendingConfirmation>,
}

impl ConfirmationPort {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Confirmer for ConfirmationPort {
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmResponse, PilotError> {
        let (responder, answer) = oneshot::channel();
        self.tx
            .send(PendingConfirmation { request, responder })
            .map_err(|_| PilotError::ConfirmationAbandoned)?;
        answer.await.map_err(|_| PilotError::ConfirmationAbandoned)
    }
}

/// 控制台确认：打印请求，读取 Y/N 与可选留言
#[derive(Debug, Clone)]
pub struct ConsoleConfirmer {
    project: String,
}

impl ConsoleConfirmer {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }
}

#[async_trait]
impl Confirmer for ConsoleConfirmer {
    async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmResponse, PilotError> {
        let project = self.project.clone();
        tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            ask(&mut stdin.lock(), &mut stdout.lock(), &project, &request.text)
        })
        .await
        .map_err(|e| PilotError::Agent(format!("console confirmation task failed: {e}")))?
    }
}

/// 交互问答；输入流结束（EOF）视为请求被放弃
pub(crate) fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    project: &str,
    text: &str,
) -> Result<ConfirmResponse, PilotError> {
    let console = |e: std::io::Error| PilotError::io("<console>", e);

    writeln!(output).map_err(console)?;
    writeln!(output, "[Needs Confirmation][{}]: {}", project, text).map_err(console)?;
    writeln!(output).map_err(console)?;
    writeln!(output, "Do you want to proceed? (Y/N)").map_err(console)?;
    output.flush().map_err(console)?;

    let approved = loop {
        let mut line = String::new();
        if input.read_line(&mut line).map_err(console)? == 0 {
            return Err(PilotError::ConfirmationAbandoned);
        }
        match line.trim().to_uppercase().as_str() {
            "Y" => break true,
            "N" => break false,
            _ => {
                writeln!(output, "Please enter either 'Y' or 'N'.").map_err(console)?;
                output.flush().map_err(console)?;
            }
        }
    };

    writeln!(output).map_err(console)?;
    writeln!(output, "Enter your message (optional):").map_err(console)?;
    output.flush().map_err(console)?;

    let mut message = String::new();
    input.read_line(&mut message).map_err(console)?;

    Ok(ConfirmResponse::new(approved, Some(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_response_defaults_text() {
        let ok = ConfirmResponse::approve(Some("   ".into()));
        assert_eq!(ok.text, DEFAULT_APPROVED_TEXT);
        assert!(ok.approved);

        let no = ConfirmResponse::deny(None);
        assert_eq!(no.text, DEFAULT_DENIED_TEXT);
        assert!(!no.approved);

        let custom = ConfirmResponse::approve(Some(" go ".into()));
        assert_eq!(custom.text, "go");
    }

    #[test]
    fn test_console_reprompts_until_yes_or_no() {
        let mut input = Cursor::new("maybe\n\ny\nfix the imports first\n");
        let mut output = Vec::new();

        let response = ask(&mut input, &mut output, "demo", "Run migrations?").unwrap();
        assert!(response.approved);
        assert_eq!(response.text, "fix the imports first");

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("[Needs Confirmation][demo]: Run migrations?"));
        assert_eq!(printed.matches("Please enter either 'Y' or 'N'.").count(), 2);
    }

    #[test]
    fn test_console_deny_with_default_message() {
        let mut input = Cursor::new("N\n\n");
        let mut output = Vec::new();

        let response = ask(&mut input, &mut output, "demo", "Continue?").unwrap();
        assert!(!response.approved);
        assert_eq!(response.text, DEFAULT_DENIED_TEXT);
    }

    #[test]
    fn test_console_eof_abandons() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        let err = ask(&mut input, &mut output, "demo", "Continue?").unwrap_err();
        assert!(matches!(err, PilotError::ConfirmationAbandoned));
    }

    #[tokio::test]
    async fn test_port_round_trip() {
        let (port, mut pending) = ConfirmationPort::new();

        let answer = tokio::spawn(async move {
            let p = pending.recv().await.unwrap();
            assert_eq!(p.request.text, "deploy?");
            p.approve(Some("go".into()));
        });

        let response = port.confirm(ConfirmRequest::new("deploy?")).await.unwrap();
        answer.await.unwrap();
        assert_eq!(response, ConfirmResponse::approve(Some("go".into())));
    }

    #[tokio::test]
    async fn test_port_dropped_request_is_abandoned() {
        let (port, mut pending) = ConfirmationPort::new();

        tokio::spawn(async move {
            let p = pending.recv().await.unwrap();
            drop(p);
        });

        let err = port.confirm(ConfirmRequest::new("deploy?")).await.unwrap_err();
        assert!(matches!(err, PilotError::ConfirmationAbandoned));
    }
}
