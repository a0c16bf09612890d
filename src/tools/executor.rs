//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 超时或失败时转为 PilotError（ToolTimeout / ToolFailed）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{preview, PilotError};
use crate::tools::ToolRegistry;

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具执行器：对每次调用施加超时，并将结果映射为 PilotError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具并输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, PilotError> {
        let start = Instant::now();
        let args_preview = preview(&args.to_string(), ARGS_PREVIEW_CHARS);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(PilotError::ToolFailed(e)),
            Err(_) => Err(PilotError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 工具目录（供 system prompt 使用）
    pub fn catalogue(&self) -> String {
        self.registry.to_schema_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("disk full".into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Slow);
        registry.register(Broken);
        ToolExecutor::with_timeout(registry, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_timeout() {
        let err = executor().execute("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, PilotError::ToolTimeout(name) if name == "slow"));
    }

    #[tokio::test]
    async fn test_failure_maps_to_tool_failed() {
        let err = executor().execute("broken", json!({})).await.unwrap_err();
        assert!(matches!(err, PilotError::ToolFailed(msg) if msg == "disk full"));

        let err = executor().execute("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, PilotError::ToolFailed(_)));
    }
}
