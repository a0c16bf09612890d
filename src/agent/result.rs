//! 结构化结果：从智能体输出中提取 JSON，并解析为 success / failure / confirm
//!
//! 线格式：`{"result": "success" | "failure" | "confirm", "message": "..."}`。
//! 字段名与取值大小写不敏感，允许 `//` 与 `/* */` 注释。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// 一轮智能体循环的结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredResult {
    Success,
    Failure { message: String },
    Confirm { message: String },
}

/// 结构化结果解析失败的两类情况
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    /// 不是合法 JSON、缺字段或字段类型不对：由 AgentStep 转为确认请求
    Malformed(String),
    /// result 取值不在三种之内：与 failure 同样致命
    UnknownResult(String),
}

/// 结构化结果格式（仅用于生成注入 system prompt 的 Schema）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ResultFormat {
    /// "success"、"failure" 或 "confirm"
    result: String,
    /// failure / confirm 时必填，说明原因或需要确认的内容
    message: String,
}

/// 返回结构化结果的 JSON Schema 字符串，可拼入 system prompt
pub fn result_schema_json() -> String {
    let schema = schema_for!(ResultFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 取第一个 `{` 到最后一个 `}`（含）之间的子串；找不到或顺序不对时原样返回
///
/// 不检查括号配对：多个拼接的 JSON 对象或正文中的零散括号仍可能让后续解析失败。
pub fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// 解析结构化结果（输入应已经过 extract_json）
pub fn parse_structured_result(text: &str) -> Result<StructuredResult, ResultError> {
    let cleaned = strip_json_comments(text);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| ResultError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ResultError::Malformed("expected a JSON object".to_string()))?;

    let result = string_field(object, "result")?
        .ok_or_else(|| ResultError::Malformed("missing field `result`".to_string()))?;

    let message = || -> Result<String, ResultError> {
        string_field(object, "message")?
            .map(str::to_string)
            .ok_or_else(|| ResultError::Malformed("missing field `message`".to_string()))
    };

    match result.to_lowercase().as_str() {
        "success" => Ok(StructuredResult::Success),
        "failure" => Ok(StructuredResult::Failure { message: message()? }),
        "confirm" => Ok(StructuredResult::Confirm { message: message()? }),
        _ => Err(ResultError::UnknownResult(result.to_string())),
    }
}

/// 大小写不敏感地查找字符串字段；存在但不是字符串视为格式错误
fn string_field<'a>(object: &'a Map<String, Value>, name: &str) -> Result<Option<&'a str>, ResultError> {
    match object.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
        None => Ok(None),
        Some((_, Value::String(s))) => Ok(Some(s.as_str())),
        Some((key, _)) => Err(ResultError::Malformed(format!("field `{key}` must be a string"))),
    }
}

/// 去掉字符串字面量之外的 `//` 行注释与 `/* */` 块注释
fn strip_json_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_strips_prose() {
        assert_eq!(extract_json(r#"noise {"a":1} trailing"#), r#"{"a":1}"#);
        assert_eq!(extract_json("no braces here"), "no braces here");
        assert_eq!(extract_json(""), "");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
        assert_eq!(extract_json("   "), "   ");
    }

    #[test]
    fn test_success_tolerates_case_and_comments() {
        let plain = parse_structured_result(r#"{"result":"success","message":""}"#).unwrap();
        let noisy =
            parse_structured_result("{ // note\n \"Result\":\"SUCCESS\", \"MESSAGE\":\"\" }").unwrap();
        assert_eq!(plain, StructuredResult::Success);
        assert_eq!(noisy, plain);
    }

    #[test]
    fn test_success_ignores_missing_message() {
        assert_eq!(
            parse_structured_result(r#"{"result": "success"}"#),
            Ok(StructuredResult::Success)
        );
    }

    #[test]
    fn test_failure_and_confirm_carry_message() {
        assert_eq!(
            parse_structured_result(r#"{"result":"failure","message":"build broke"}"#),
            Ok(StructuredResult::Failure {
                message: "build broke".into()
            })
        );
        assert_eq!(
            parse_structured_result(
                "{\"result\": \"Confirm\", /* block */ \"message\": \"delete // old files?\"}"
            ),
            Ok(StructuredResult::Confirm {
                message: "delete // old files?".into()
            })
        );
    }

    #[test]
    fn test_malformed_inputs() {
        for raw in [
            "",
            "   ",
            "no json at all",
            r#"{"result": "failure"}"#,
            r#"{"message": "hi"}"#,
            r#"{"result": 1, "message": ""}"#,
            r#"["success"]"#,
            r#"{"a":1}{"b":2}"#,
        ] {
            assert!(
                matches!(parse_structured_result(raw), Err(ResultError::Malformed(_))),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_unknown_result_tag() {
        assert_eq!(
            parse_structured_result(r#"{"result":"done","message":""}"#),
            Err(ResultError::UnknownResult("done".into()))
        );
    }

    #[test]
    fn test_extract_then_parse_wrapped_output() {
        let raw = "All edits applied.\n```json\n{\"result\": \"success\", \"message\": \"ok\"}\n```";
        assert_eq!(
            parse_structured_result(extract_json(raw)),
            Ok(StructuredResult::Success)
        );
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = result_schema_json();
        assert!(schema.contains("result"));
        assert!(schema.contains("message"));
    }
}
