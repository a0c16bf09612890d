//! report_progress：智能体向操作者报告进度，仅写日志

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

#[derive(Debug, Default)]
pub struct ReportProgressTool;

#[async_trait]
impl Tool for ReportProgressTool {
    fn name(&self) -> &str {
        "report_progress"
    }

    fn description(&self) -> &str {
        "Report a short progress update to the operator. Args: {\"message\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Progress update" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or("Missing argument: message")?;
        tracing::info!("[Agent] {}", message);
        Ok("Progress reported.".to_string())
    }
}
